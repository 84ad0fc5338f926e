//! Locally initiated channel operations.
//!
//! Every operation is one store transaction followed by at most a couple of
//! sends. The transition commits first; if a send then fails the caller gets
//! [`ClientError::Undelivered`] and can hand the envelope to
//! [`Caller::resend`] later.

use std::future::Future;

use bytes::Bytes;
use escrow_channel_core::{Channel, ChannelId, Envelope, Phase, Pubkey};
use escrow_channel_store::{EntityTx, Store};
use escrow_channel_transport::Transport;

use crate::context::Context;
use crate::error::{ClientError, Result};

/// Driver for the operations a local user starts.
pub struct Caller<S: Store, T: Transport> {
    ctx: Context<S, T>,
}

impl<S: Store, T: Transport> Caller<S, T> {
    pub(crate) fn new(ctx: Context<S, T>) -> Self {
        Self { ctx }
    }

    /// Create a channel between a local account and a known counterparty.
    ///
    /// The opening envelope is signed in slot 0 and stored in PROPOSED.
    /// Nothing is sent until [`confirm_channel`](Self::confirm_channel).
    pub async fn propose_channel(
        &self,
        account: Pubkey,
        counterparty: Pubkey,
        state: Bytes,
        hold_period: Option<u32>,
    ) -> Result<Channel> {
        let channel_id = ChannelId::random();
        let hold_period = hold_period.unwrap_or(self.ctx.config().default_hold_period);

        let channel = self
            .ctx
            .store()
            .update(move |tx| {
                let account = tx.get_account(&account)?;
                let counterparty = tx.get_counterparty(&counterparty)?;
                let channel = Channel::propose(channel_id, account, counterparty, state, hold_period)?;
                tx.put_channel(&channel)?;
                Ok::<_, ClientError>(channel)
            })
            .await?;

        tracing::info!(
            channel_id = %channel.channel_id,
            counterparty = %channel.counterparty.name,
            hold_period,
            "proposed channel"
        );
        Ok(channel)
    }

    /// Confirm the opening from the local side.
    ///
    /// The proposer releases the opening envelope to the counterparty. The
    /// receiver adds its signature, opens the channel, and returns the full
    /// envelope to the proposer and (if configured) the judge.
    pub async fn confirm_channel(&self, channel_id: ChannelId) -> Result<Channel> {
        let (channel, envelope) = self
            .ctx
            .update_channel(channel_id, |channel| Ok(channel.confirm()?))
            .await?;
        tracing::info!(channel_id = %channel_id, phase = %channel.phase, "confirmed channel");

        let to_counterparty = self
            .ctx
            .send(
                Some(channel_id),
                &channel.account.address,
                &channel.counterparty.address,
                envelope,
            )
            .await;

        let to_judge = if channel.phase == Phase::Open && self.ctx.config().notify_judge_on_open {
            self.ctx.judge().file_opening(&channel).await
        } else {
            Ok(())
        };

        to_counterparty?;
        to_judge?;
        Ok(channel)
    }

    /// Propose a new state to the counterparty.
    pub async fn send_update_tx(&self, channel_id: ChannelId, state: Bytes, fast: bool) -> Result<Channel> {
        let (channel, envelope) = self
            .ctx
            .update_channel(channel_id, move |channel| Ok(channel.send_update(state, fast)?))
            .await?;
        tracing::info!(
            channel_id = %channel_id,
            sequence = ?channel.proposed_update_tx.as_ref().map(|u| u.sequence_number),
            fast,
            "proposed update"
        );

        self.ctx
            .send(
                Some(channel_id),
                &channel.account.address,
                &channel.counterparty.address,
                envelope,
            )
            .await?;
        Ok(channel)
    }

    /// Counter-sign the counterparty's outstanding proposal and send the
    /// full envelope back.
    pub async fn confirm_update_tx(&self, channel_id: ChannelId) -> Result<Channel> {
        let (channel, envelope) = self
            .ctx
            .update_channel(channel_id, |channel| Ok(channel.confirm_update()?))
            .await?;
        tracing::info!(channel_id = %channel_id, sequence = ?channel.sequence(), "confirmed update");

        self.ctx
            .send(
                Some(channel_id),
                &channel.account.address,
                &channel.counterparty.address,
                envelope,
            )
            .await?;
        Ok(channel)
    }

    /// Judge the counterparty's latest word, or its absence.
    ///
    /// When the channel ends up DISPUTED the last full update is filed with
    /// the judge.
    pub async fn check_final_update_tx(
        &self,
        channel_id: ChannelId,
        envelope: Option<Envelope>,
    ) -> Result<Channel> {
        let (channel, filing) = self
            .ctx
            .update_channel(channel_id, move |channel| {
                Ok(channel.check_final(envelope.as_ref())?)
            })
            .await?;

        match filing {
            Some(filing) => {
                self.ctx.judge().file_dispute(&channel, filing).await?;
            }
            None => {
                tracing::debug!(channel_id = %channel_id, sequence = ?channel.sequence(), "final update accepted");
            }
        }
        Ok(channel)
    }

    /// Wait up to the configured dispute timeout for the counterparty's
    /// reply, then check it. A reply that never arrives counts as a stall.
    pub async fn check_final_after<F>(&self, channel_id: ChannelId, reply: F) -> Result<Channel>
    where
        F: Future<Output = Option<Envelope>> + Send,
    {
        let timeout = self.ctx.config().dispute_timeout;
        let envelope = match tokio::time::timeout(timeout, reply).await {
            Ok(envelope) => envelope,
            Err(_) => {
                tracing::warn!(channel_id = %channel_id, ?timeout, "counterparty stalled");
                None
            }
        };
        self.check_final_update_tx(channel_id, envelope).await
    }

    /// Attach an opaque fulfillment blob to a channel.
    pub async fn add_fulfillment(&self, channel_id: ChannelId, fulfillment: Bytes) -> Result<Channel> {
        let (channel, ()) = self
            .ctx
            .update_channel(channel_id, move |channel| Ok(channel.add_fulfillment(fulfillment)?))
            .await?;
        tracing::debug!(channel_id = %channel_id, count = channel.fulfillments.len(), "added fulfillment");
        Ok(channel)
    }

    /// Deliver an envelope whose earlier send failed.
    ///
    /// The envelope must belong to a stored channel; it is sent from that
    /// channel's local account.
    pub async fn resend(&self, address: &str, envelope: Envelope) -> Result<()> {
        let channel_id = *envelope.decode_payload()?.channel_id();
        let from = self
            .ctx
            .store()
            .view(move |tx| Ok::<_, ClientError>(tx.get_channel(&channel_id)?.account.address))
            .await?;

        tracing::info!(channel_id = %channel_id, address, "resending envelope");
        self.ctx.send(Some(channel_id), &from, address, envelope).await
    }
}
