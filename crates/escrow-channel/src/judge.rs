//! Outbound filings with the judge.
//!
//! The judge only ever sees fully signed envelopes: the opening envelope
//! once both parties signed it, and the last full update when a channel is
//! disputed.

use escrow_channel_core::{Channel, Envelope, Phase};
use escrow_channel_store::Store;
use escrow_channel_transport::Transport;

use crate::context::Context;
use crate::error::{ClientError, Result};

/// Sends filings to a channel's judge.
pub struct JudgeClient<S: Store, T: Transport> {
    ctx: Context<S, T>,
}

impl<S: Store, T: Transport> JudgeClient<S, T> {
    pub(crate) fn new(ctx: Context<S, T>) -> Self {
        Self { ctx }
    }

    /// File the fully signed opening envelope of an open channel.
    pub async fn file_opening(&self, channel: &Channel) -> Result<()> {
        if !channel.opening_tx_envelope.is_complete() {
            return Err(ClientError::InvalidRequest(format!(
                "opening envelope of channel {} is not fully signed",
                channel.channel_id
            )));
        }
        tracing::info!(channel_id = %channel.channel_id, judge = %channel.judge.name, "filing opening with judge");
        self.file(channel, channel.opening_tx_envelope.clone()).await
    }

    /// File the last full update of a disputed channel.
    pub async fn file_dispute(&self, channel: &Channel, envelope: Envelope) -> Result<()> {
        if channel.phase != Phase::Disputed {
            return Err(ClientError::InvalidRequest(format!(
                "channel {} is {}, not DISPUTED",
                channel.channel_id, channel.phase
            )));
        }
        tracing::warn!(
            channel_id = %channel.channel_id,
            judge = %channel.judge.name,
            sequence = ?channel.sequence(),
            "filing dispute with judge"
        );
        self.file(channel, envelope).await
    }

    async fn file(&self, channel: &Channel, envelope: Envelope) -> Result<()> {
        self.ctx
            .send(
                Some(channel.channel_id),
                &channel.account.address,
                &channel.judge.address,
                envelope,
            )
            .await
    }
}
