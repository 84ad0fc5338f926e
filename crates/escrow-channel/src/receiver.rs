//! Handling of envelopes that arrive from the counterparty or the judge.

use escrow_channel_core::{
    Account, Channel, ChannelError, Counterparty, Envelope, EnvelopeError, Pubkey, Slot, TxKind,
    UpdateOutcome,
};
use escrow_channel_store::{EntityTx, KvTx, Store};
use escrow_channel_transport::{Delivery, Origin, Transport};

use crate::context::Context;
use crate::error::{ClientError, Result};

/// What an inbound delivery did to local state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A counterparty proposed a new channel; it awaits local confirmation.
    Proposed(Channel),
    /// The fully signed opening arrived and the channel is open.
    Opened(Channel),
    /// An update envelope was applied.
    Update(Channel, UpdateOutcome),
    /// The judge relayed a final update; the channel was checked against it.
    Final(Channel),
}

impl Inbound {
    pub fn channel(&self) -> &Channel {
        match self {
            Inbound::Proposed(ch) | Inbound::Opened(ch) | Inbound::Final(ch) => ch,
            Inbound::Update(ch, _) => ch,
        }
    }
}

/// Driver for inbound envelopes.
pub struct Receiver<S: Store, T: Transport> {
    ctx: Context<S, T>,
}

/// Find which opening pubkey is a local account; the other must be a
/// registered counterparty.
fn resolve_parties(tx: &dyn KvTx, pubkeys: &[Pubkey; 2]) -> Result<(Account, Counterparty)> {
    for slot in Slot::BOTH {
        let account = match tx.get_account(&pubkeys[slot.index()]) {
            Ok(account) => account,
            Err(e) if e.is_not_found() => continue,
            Err(e) => return Err(e.into()),
        };
        let counterparty = tx.get_counterparty(&pubkeys[slot.other().index()])?;
        return Ok((account, counterparty));
    }
    Err(ChannelError::NotAParty.into())
}

impl<S: Store, T: Transport> Receiver<S, T> {
    pub(crate) fn new(ctx: Context<S, T>) -> Self {
        Self { ctx }
    }

    /// Store a channel proposed by the counterparty, in PENDING_OPEN.
    ///
    /// Re-delivering the same proposal returns the stored channel. A
    /// different opening under a known channel id is rejected.
    pub async fn add_channel(&self, envelope: Envelope) -> Result<Channel> {
        let opening_tx = envelope.opening_tx()?;
        let channel_id = opening_tx.channel_id;

        let (channel, created) = self
            .ctx
            .store()
            .update(move |tx| -> Result<(Channel, bool)> {
                if let Some(existing) = tx.find_channel(&channel_id)? {
                    if existing.opening_tx == opening_tx {
                        return Ok((existing, false));
                    }
                    return Err(ChannelError::ChannelExists(channel_id).into());
                }

                let (account, counterparty) = resolve_parties(&*tx, &opening_tx.pubkeys)?;
                let channel = Channel::from_opening_envelope(&envelope, account, counterparty)?;
                tx.put_channel(&channel)?;
                Ok((channel, true))
            })
            .await?;

        if created {
            tracing::info!(
                channel_id = %channel_id,
                counterparty = %channel.counterparty.name,
                "received channel proposal"
            );
        } else {
            tracing::debug!(channel_id = %channel_id, "duplicate channel proposal");
        }
        Ok(channel)
    }

    /// Adopt the fully signed opening envelope returned by the counterparty.
    pub async fn open_channel(&self, envelope: Envelope) -> Result<Channel> {
        let channel_id = envelope.opening_tx()?.channel_id;
        let (channel, opened) = self
            .ctx
            .update_channel(channel_id, move |channel| Ok(channel.open(&envelope)?))
            .await?;

        if opened {
            tracing::info!(channel_id = %channel_id, "channel open");
        } else {
            tracing::debug!(channel_id = %channel_id, "duplicate opening envelope");
        }
        Ok(channel)
    }

    /// Apply an update envelope from the counterparty.
    pub async fn add_update_tx(&self, envelope: Envelope) -> Result<(Channel, UpdateOutcome)> {
        let channel_id = envelope.update_tx()?.channel_id;
        let (channel, outcome) = self
            .ctx
            .update_channel(channel_id, move |channel| Ok(channel.receive_update(&envelope)?))
            .await?;

        tracing::info!(
            channel_id = %channel_id,
            ?outcome,
            phase = %channel.phase,
            sequence = ?channel.sequence(),
            "applied update envelope"
        );
        Ok((channel, outcome))
    }

    /// Route one inbound delivery to the operation its kind and origin
    /// call for.
    pub async fn deliver(&self, delivery: Delivery) -> Result<Inbound> {
        let Delivery {
            origin,
            from,
            declared_kind,
            envelope,
            ..
        } = delivery;
        tracing::debug!(%from, ?origin, kind = ?envelope.kind, "inbound delivery");

        if self.ctx.config().verify_inbound {
            if declared_kind != envelope.kind {
                return Err(EnvelopeError::UnexpectedKind {
                    expected: declared_kind,
                }
                .into());
            }
            envelope.verify(None)?;
        }

        match (origin, envelope.kind) {
            (Origin::Counterparty, TxKind::Opening) => {
                let channel_id = envelope.opening_tx()?.channel_id;
                let known = self
                    .ctx
                    .store()
                    .view(move |tx| Ok::<_, ClientError>(tx.has_channel(&channel_id)?))
                    .await?;
                if known && envelope.is_complete() {
                    self.open_channel(envelope).await.map(Inbound::Opened)
                } else {
                    self.add_channel(envelope).await.map(Inbound::Proposed)
                }
            }
            (Origin::Counterparty, TxKind::Update) => {
                let (channel, outcome) = self.add_update_tx(envelope).await?;
                Ok(Inbound::Update(channel, outcome))
            }
            (Origin::Judge, TxKind::Update) => {
                let channel_id = envelope.update_tx()?.channel_id;
                self.ctx
                    .caller()
                    .check_final_update_tx(channel_id, Some(envelope))
                    .await
                    .map(Inbound::Final)
            }
            (Origin::Judge, TxKind::Opening) => Err(ClientError::InvalidRequest(format!(
                "judge at {} sent an opening envelope",
                from
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::error::ErrorKind;
    use crate::testing::{next, open, pair, JUDGE};
    use escrow_channel_core::{ChannelId, Phase, SecretSeed};

    #[tokio::test]
    async fn test_duplicate_proposal_is_a_noop() {
        let pair = pair(ClientConfig::default()).await;
        let caller = pair.alice.ctx.caller();
        let channel = caller
            .propose_channel(pair.alice.account.pubkey, pair.bob.account.pubkey, "s0".into(), None)
            .await
            .unwrap();
        caller.confirm_channel(channel.channel_id).await.unwrap();
        let delivery = pair.bob.next().await;

        let receiver = pair.bob.ctx.receiver();
        let first = receiver.deliver(delivery.clone()).await.unwrap();
        let second = receiver.deliver(delivery).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.channel().phase, Phase::PendingOpen);
        assert_eq!(pair.bob.ctx.registry().list_channels().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_conflicting_opening_is_rejected() {
        let pair = pair(ClientConfig::default()).await;
        let id = ChannelId::from_bytes([4; 32]);
        let bob_view = pair.bob.account.as_counterparty();

        let first = Channel::propose(id, pair.alice.account.clone(), bob_view.clone(), "s0".into(), 5).unwrap();
        let other = Channel::propose(id, pair.alice.account.clone(), bob_view, "other".into(), 5).unwrap();

        let receiver = pair.bob.ctx.receiver();
        receiver.add_channel(first.opening_tx_envelope).await.unwrap();
        let err = receiver.add_channel(other.opening_tx_envelope).await.unwrap_err();
        assert!(matches!(err, ClientError::Channel(ChannelError::ChannelExists(_))));

        let stored = pair.bob.ctx.registry().get_channel(id).await.unwrap();
        assert_eq!(stored.opening_tx.state, bytes::Bytes::from_static(b"s0"));
    }

    #[tokio::test]
    async fn test_unknown_proposer_is_not_found() {
        let pair = pair(ClientConfig::default()).await;
        let carol = Account::new("carol", SecretSeed([3; 32]), "carol:3003", pair.judge.clone());
        let proposal = Channel::propose(
            ChannelId::random(),
            carol,
            pair.bob.account.as_counterparty(),
            "s0".into(),
            5,
        )
        .unwrap();

        let err = pair
            .bob
            .ctx
            .receiver()
            .add_channel(proposal.opening_tx_envelope)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_declared_kind_mismatch() {
        let pair = pair(ClientConfig::default()).await;
        let id = open(&pair).await;
        pair.alice.ctx.caller().send_update_tx(id, "s1".into(), false).await.unwrap();

        let mut delivery = pair.bob.next().await;
        delivery.declared_kind = TxKind::Opening;
        let err = pair.bob.ctx.receiver().deliver(delivery).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let stored = pair.bob.ctx.registry().get_channel(id).await.unwrap();
        assert_eq!(stored.phase, Phase::Open);
    }

    #[tokio::test]
    async fn test_tampered_envelope_rejected() {
        let pair = pair(ClientConfig::default()).await;
        let id = open(&pair).await;
        pair.alice.ctx.caller().send_update_tx(id, "s1".into(), false).await.unwrap();

        let mut delivery = pair.bob.next().await;
        let mut update = delivery.envelope.update_tx().unwrap();
        update.state = "forged".into();
        let signatures = delivery.envelope.signatures.clone();
        delivery.envelope = Envelope::new(&update.into());
        delivery.envelope.signatures = signatures;

        let err = pair.bob.ctx.receiver().deliver(delivery).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Envelope(EnvelopeError::InvalidSignature(Slot::Zero))
        ));
    }

    #[tokio::test]
    async fn test_judge_relays_newer_final_update() {
        let pair = pair(ClientConfig::default()).await;
        let id = open(&pair).await;

        pair.alice.ctx.caller().send_update_tx(id, "s1".into(), false).await.unwrap();
        pair.bob.handle_next().await;
        pair.bob.ctx.caller().confirm_update_tx(id).await.unwrap();

        // The counter-signed envelope reaches alice via the judge instead.
        let lost = pair.alice.next().await;
        let relayed = Delivery::new(Origin::Judge, JUDGE, lost.envelope);
        match pair.alice.ctx.receiver().deliver(relayed).await.unwrap() {
            Inbound::Final(ch) => {
                assert_eq!(ch.phase, Phase::Open);
                assert_eq!(ch.sequence(), Some(1));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_judge_relays_stale_update() {
        let pair = pair(ClientConfig::default()).await;
        let id = open(&pair).await;
        let opening = next(&pair.judge_inbox).await;

        pair.alice.ctx.caller().send_update_tx(id, "s1".into(), false).await.unwrap();
        let half_signed = pair.bob.next().await;

        let relayed = Delivery::new(Origin::Judge, JUDGE, half_signed.envelope);
        let inbound = pair.bob.ctx.receiver().deliver(relayed).await.unwrap();
        assert_eq!(inbound.channel().phase, Phase::Disputed);

        let filing = next(&pair.judge_inbox).await;
        assert_eq!(filing.envelope, opening.envelope);
    }

    #[tokio::test]
    async fn test_judge_opening_is_rejected() {
        let pair = pair(ClientConfig::default()).await;
        let id = open(&pair).await;
        let channel = pair.alice.ctx.registry().get_channel(id).await.unwrap();

        let delivery = Delivery::new(Origin::Judge, JUDGE, channel.opening_tx_envelope);
        let err = pair.alice.ctx.receiver().deliver(delivery).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[tokio::test]
    async fn test_open_redelivery_is_a_noop() {
        let pair = pair(ClientConfig::default()).await;
        let id = open(&pair).await;
        let channel = pair.alice.ctx.registry().get_channel(id).await.unwrap();

        let again = pair
            .alice
            .ctx
            .receiver()
            .open_channel(channel.opening_tx_envelope.clone())
            .await
            .unwrap();
        assert_eq!(again, channel);
    }
}
