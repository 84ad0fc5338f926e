//! The channel aggregate and its state machine.
//!
//! One machine serves both roles. The only role-specific datum is `me`, the
//! signature slot owned by the local account, fixed when the channel is
//! created. Every transition takes `&mut self`, validates fully before
//! touching any field, and returns the envelope (if any) that must be sent
//! once the caller has persisted the new state.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::entity::{Account, Counterparty, Judge};
use crate::envelope::Envelope;
use crate::error::{ChannelError, EnvelopeError, Result};
use crate::tx::{OpeningTx, TxKind, TxPayload, UpdateTx};
use crate::types::{ChannelId, Slot};

/// Channel lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Proposed,
    PendingOpen,
    Open,
    PendingUpdate,
    Disputed,
    Closed,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Proposed => "PROPOSED",
            Phase::PendingOpen => "PENDING_OPEN",
            Phase::Open => "OPEN",
            Phase::PendingUpdate => "PENDING_UPDATE",
            Phase::Disputed => "DISPUTED",
            Phase::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of applying a received update envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Stored as the outstanding proposal, awaiting the local counter-signature.
    Proposed,
    /// The envelope was fully signed and became the last full update.
    Confirmed,
    /// Already applied; nothing changed.
    AlreadyKnown,
}

/// A bilateral escrow channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub channel_id: ChannelId,
    pub phase: Phase,

    pub opening_tx: OpeningTx,
    pub opening_tx_envelope: Envelope,

    pub proposed_update_tx: Option<UpdateTx>,
    pub proposed_update_tx_envelope: Option<Envelope>,

    /// The only state the judge may be asked to enforce.
    pub last_full_update_tx: Option<UpdateTx>,
    pub last_full_update_tx_envelope: Option<Envelope>,

    /// Slot owned by the local account.
    pub me: Slot,
    /// Opaque proof blobs, kept in arrival order.
    pub fulfillments: Vec<Bytes>,

    pub account: Account,
    pub counterparty: Counterparty,
    pub judge: Judge,
}

impl Channel {
    /// Create a channel as proposer. The local account takes slot 0 and
    /// signs the opening envelope.
    pub fn propose(
        channel_id: ChannelId,
        account: Account,
        counterparty: Counterparty,
        state: Bytes,
        hold_period: u32,
    ) -> Result<Self> {
        if account.judge.pubkey != counterparty.judge.pubkey {
            return Err(ChannelError::JudgeMismatch);
        }
        if account.pubkey == counterparty.pubkey {
            return Err(ChannelError::NotAParty);
        }

        let opening_tx = OpeningTx {
            channel_id,
            pubkeys: [account.pubkey, counterparty.pubkey],
            state,
            hold_period,
        };
        let me = Slot::Zero;
        let envelope = Envelope::new(&opening_tx.clone().into()).sign(&account, me)?;

        Ok(Self {
            channel_id,
            phase: Phase::Proposed,
            opening_tx,
            opening_tx_envelope: envelope,
            proposed_update_tx: None,
            proposed_update_tx_envelope: None,
            last_full_update_tx: None,
            last_full_update_tx_envelope: None,
            me,
            fulfillments: Vec::new(),
            judge: account.judge.clone(),
            account,
            counterparty,
        })
    }

    /// Create a channel as receiver from the proposer's opening envelope.
    ///
    /// The envelope must carry exactly one valid signature, the
    /// counterparty's, and name the local account in the other slot.
    pub fn from_opening_envelope(
        envelope: &Envelope,
        account: Account,
        counterparty: Counterparty,
    ) -> Result<Self> {
        let opening_tx = envelope.opening_tx()?;
        envelope.verify(None)?;

        let count = envelope.signature_count();
        if count != 1 {
            return Err(ChannelError::UnexpectedSignatureCount(count));
        }

        let me = TxPayload::from(opening_tx.clone())
            .slot_of(&account.pubkey)
            .ok_or(ChannelError::NotAParty)?;
        if opening_tx.pubkeys[me.other().index()] != counterparty.pubkey {
            return Err(ChannelError::NotAParty);
        }
        envelope.verify_slot(me.other())?;

        if account.judge.pubkey != counterparty.judge.pubkey {
            return Err(ChannelError::JudgeMismatch);
        }

        Ok(Self {
            channel_id: opening_tx.channel_id,
            phase: Phase::PendingOpen,
            opening_tx,
            opening_tx_envelope: envelope.clone(),
            proposed_update_tx: None,
            proposed_update_tx_envelope: None,
            last_full_update_tx: None,
            last_full_update_tx_envelope: None,
            me,
            fulfillments: Vec::new(),
            judge: account.judge.clone(),
            account,
            counterparty,
        })
    }

    /// The counterparty's slot.
    pub fn them(&self) -> Slot {
        self.me.other()
    }

    /// Sequence number of the last full update, if the channel is open.
    pub fn sequence(&self) -> Option<u64> {
        self.last_full_update_tx.as_ref().map(|u| u.sequence_number)
    }

    fn invalid_phase(&self, expected: &'static str) -> ChannelError {
        ChannelError::InvalidPhase {
            channel_id: self.channel_id,
            actual: self.phase,
            expected,
        }
    }

    fn check_channel(&self, received: ChannelId) -> Result<()> {
        if received != self.channel_id {
            return Err(ChannelError::ChannelMismatch {
                expected: self.channel_id,
                received,
            });
        }
        Ok(())
    }

    /// Adopt a fully signed opening envelope and record the opening state
    /// as the sequence-0 full update.
    fn mark_open(&mut self, envelope: Envelope) {
        self.last_full_update_tx = Some(UpdateTx::from_opening(&self.opening_tx));
        self.last_full_update_tx_envelope = Some(envelope.clone());
        self.opening_tx_envelope = envelope;
        self.phase = Phase::Open;
    }

    /// Confirm the opening transaction from the local side.
    ///
    /// On the proposer this releases the one-signature envelope for the
    /// counterparty (PROPOSED to PENDING_OPEN). On the receiver it signs the
    /// local slot, which completes the envelope (PENDING_OPEN to OPEN); the
    /// returned envelope goes back to the proposer and to the judge.
    pub fn confirm(&mut self) -> Result<Envelope> {
        let own_signed = self.opening_tx_envelope.has_signature(self.me);

        match self.phase {
            Phase::Proposed => {
                let count = self.opening_tx_envelope.signature_count();
                if count != 1 || !own_signed {
                    return Err(ChannelError::UnexpectedSignatureCount(count));
                }
                self.phase = Phase::PendingOpen;
                Ok(self.opening_tx_envelope.clone())
            }
            Phase::PendingOpen if !own_signed => {
                let signed = self.opening_tx_envelope.sign(&self.account, self.me)?;
                signed.verify_slot(self.them())?;
                self.mark_open(signed.clone());
                Ok(signed)
            }
            _ => Err(self.invalid_phase("PROPOSED, or PENDING_OPEN awaiting the local signature")),
        }
    }

    /// Accept the counterparty's fully signed opening envelope.
    ///
    /// Returns `false` when the channel is already open with this exact
    /// envelope, so re-deliveries are harmless.
    pub fn open(&mut self, envelope: &Envelope) -> Result<bool> {
        if self.phase != Phase::PendingOpen {
            if self.phase != Phase::Proposed && envelope == &self.opening_tx_envelope {
                return Ok(false);
            }
            return Err(self.invalid_phase("PENDING_OPEN"));
        }
        if envelope.kind != TxKind::Opening {
            return Err(EnvelopeError::UnexpectedKind {
                expected: TxKind::Opening,
            }
            .into());
        }

        envelope.verify(Some(&self.opening_tx_envelope.payload_hash()))?;
        envelope.verify_slot(self.them())?;
        envelope.verify_slot(self.me)?;

        self.mark_open(envelope.clone());
        Ok(true)
    }

    /// Propose the next state. The local slot is signed; the returned
    /// envelope goes to the counterparty.
    pub fn send_update(&mut self, state: Bytes, fast: bool) -> Result<Envelope> {
        match self.phase {
            Phase::Open => {}
            Phase::PendingUpdate => {
                return Err(ChannelError::UpdateAlreadyPending {
                    sequence: self
                        .proposed_update_tx
                        .as_ref()
                        .map_or(0, |u| u.sequence_number),
                })
            }
            _ => return Err(self.invalid_phase("OPEN")),
        }

        let next = self
            .sequence()
            .unwrap_or(0)
            .checked_add(1)
            .ok_or(ChannelError::SequenceExhausted(self.channel_id))?;
        let update_tx = UpdateTx {
            channel_id: self.channel_id,
            pubkeys: self.opening_tx.pubkeys,
            sequence_number: next,
            state,
            fast,
        };
        let envelope = Envelope::new(&update_tx.clone().into()).sign(&self.account, self.me)?;

        self.proposed_update_tx = Some(update_tx);
        self.proposed_update_tx_envelope = Some(envelope.clone());
        self.phase = Phase::PendingUpdate;
        Ok(envelope)
    }

    /// Apply an update envelope received from the counterparty.
    ///
    /// A fresh proposal is stored for local counter-signature. The
    /// counter-signed echo of our own proposal promotes it. Re-deliveries of
    /// the last full update or the outstanding proposal change nothing.
    pub fn receive_update(&mut self, envelope: &Envelope) -> Result<UpdateOutcome> {
        if !matches!(self.phase, Phase::Open | Phase::PendingUpdate) {
            return Err(self.invalid_phase("OPEN or PENDING_UPDATE"));
        }

        let update_tx = envelope.update_tx()?;
        self.check_channel(update_tx.channel_id)?;
        if update_tx.pubkeys != self.opening_tx.pubkeys {
            return Err(ChannelError::NotAParty);
        }
        envelope.verify(None)?;

        if let Some(last) = &self.last_full_update_tx_envelope {
            if last.payload == envelope.payload {
                return Ok(UpdateOutcome::AlreadyKnown);
            }
        }

        if let Some(proposed) = &self.proposed_update_tx_envelope {
            if proposed.payload == envelope.payload {
                if proposed.has_signature(self.me) && envelope.is_complete() {
                    self.promote(update_tx, envelope.clone());
                    return Ok(UpdateOutcome::Confirmed);
                }
                return Ok(UpdateOutcome::AlreadyKnown);
            }
        }

        let current = self.sequence().unwrap_or(0);
        if update_tx.sequence_number <= current {
            return Err(ChannelError::StaleUpdate {
                received: update_tx.sequence_number,
                current,
            });
        }
        // Neither side could ever propose a successor.
        if update_tx.sequence_number == u64::MAX {
            return Err(ChannelError::SequenceExhausted(self.channel_id));
        }
        if let Some(pending) = &self.proposed_update_tx {
            return Err(ChannelError::UpdateAlreadyPending {
                sequence: pending.sequence_number,
            });
        }

        envelope.verify_slot(self.them())?;
        if envelope.is_complete() {
            self.promote(update_tx, envelope.clone());
            return Ok(UpdateOutcome::Confirmed);
        }

        self.proposed_update_tx = Some(update_tx);
        self.proposed_update_tx_envelope = Some(envelope.clone());
        self.phase = Phase::PendingUpdate;
        Ok(UpdateOutcome::Proposed)
    }

    fn promote(&mut self, update_tx: UpdateTx, envelope: Envelope) {
        self.last_full_update_tx = Some(update_tx);
        self.last_full_update_tx_envelope = Some(envelope);
        self.proposed_update_tx = None;
        self.proposed_update_tx_envelope = None;
        self.phase = Phase::Open;
    }

    /// Counter-sign the outstanding proposal and make it the last full
    /// update. Returns the full envelope for the counterparty.
    pub fn confirm_update(&mut self) -> Result<Envelope> {
        if self.phase != Phase::PendingUpdate {
            return Err(self.invalid_phase("PENDING_UPDATE"));
        }
        let (update_tx, envelope) = match (&self.proposed_update_tx, &self.proposed_update_tx_envelope) {
            (Some(tx), Some(ev)) => (tx.clone(), ev.clone()),
            _ => return Err(self.invalid_phase("PENDING_UPDATE with a proposal")),
        };

        match envelope.verify_slot(self.them()) {
            Ok(()) => {}
            Err(EnvelopeError::MissingSignature(_)) => {
                return Err(ChannelError::MissingCounterSignature)
            }
            Err(e) => return Err(e.into()),
        }

        let full = if envelope.has_signature(self.me) {
            envelope
        } else {
            envelope.sign(&self.account, self.me)?
        };

        self.promote(update_tx, full.clone());
        Ok(full)
    }

    /// Decide whether the counterparty's latest word is acceptable.
    ///
    /// `None` means the counterparty stalled past the dispute timeout. A
    /// valid, complete, newer update is adopted. A re-delivery of the last
    /// full update is a no-op. Anything else moves the channel to DISPUTED
    /// and returns the last full envelope to file with the judge.
    pub fn check_final(&mut self, envelope: Option<&Envelope>) -> Result<Option<Envelope>> {
        if !matches!(self.phase, Phase::Open | Phase::PendingUpdate) {
            return Err(self.invalid_phase("OPEN or PENDING_UPDATE"));
        }

        if let Some(envelope) = envelope {
            if let Some(last) = &self.last_full_update_tx_envelope {
                if last.payload == envelope.payload && envelope.is_complete() {
                    return Ok(None);
                }
            }
            if let Some(update_tx) = self.acceptable_final(envelope) {
                self.promote(update_tx, envelope.clone());
                return Ok(None);
            }
        }

        let filing = self
            .last_full_update_tx_envelope
            .clone()
            .ok_or_else(|| self.invalid_phase("a fully signed state"))?;
        self.phase = Phase::Disputed;
        Ok(Some(filing))
    }

    fn acceptable_final(&self, envelope: &Envelope) -> Option<UpdateTx> {
        let update_tx = envelope.update_tx().ok()?;
        let newer = update_tx.sequence_number > self.sequence().unwrap_or(0)
            && update_tx.sequence_number < u64::MAX;
        let ours = update_tx.channel_id == self.channel_id
            && update_tx.pubkeys == self.opening_tx.pubkeys;
        (newer && ours && envelope.is_complete()).then_some(update_tx)
    }

    /// Attach an opaque fulfillment blob.
    pub fn add_fulfillment(&mut self, fulfillment: Bytes) -> Result<()> {
        if self.phase == Phase::Closed {
            return Err(self.invalid_phase("not CLOSED"));
        }
        self.fulfillments.push(fulfillment);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{Keypair, SecretSeed};
    use proptest::prelude::*;

    fn judge() -> Judge {
        Judge {
            name: "joe".into(),
            pubkey: Keypair::from_seed(&SecretSeed([9; 32])).pubkey(),
            address: "judge:3004".into(),
        }
    }

    fn alice() -> Account {
        Account::new("alice", SecretSeed([1; 32]), "alice:3001", judge())
    }

    fn bob() -> Account {
        Account::new("bob", SecretSeed([2; 32]), "bob:3002", judge())
    }

    /// Both sides of a freshly opened channel: (proposer, receiver).
    fn open_pair() -> (Channel, Channel) {
        let mut a = Channel::propose(
            ChannelId::from_bytes([7; 32]),
            alice(),
            bob().as_counterparty(),
            Bytes::from_static(b"s0"),
            3600,
        )
        .unwrap();
        let to_bob = a.confirm().unwrap();

        let mut b = Channel::from_opening_envelope(&to_bob, bob(), alice().as_counterparty()).unwrap();
        let full = b.confirm().unwrap();
        assert!(a.open(&full).unwrap());
        (a, b)
    }

    #[test]
    fn test_propose() {
        let ch = Channel::propose(
            ChannelId::from_bytes([7; 32]),
            alice(),
            bob().as_counterparty(),
            Bytes::from_static(b"s0"),
            3600,
        )
        .unwrap();

        assert_eq!(ch.phase, Phase::Proposed);
        assert_eq!(ch.me, Slot::Zero);
        assert!(ch.opening_tx_envelope.has_signature(Slot::Zero));
        assert!(!ch.opening_tx_envelope.has_signature(Slot::One));
        assert!(ch.proposed_update_tx.is_none());
    }

    #[test]
    fn test_propose_requires_shared_judge() {
        let mut other = bob().as_counterparty();
        other.judge.pubkey = Keypair::from_seed(&SecretSeed([8; 32])).pubkey();
        let err = Channel::propose(ChannelId::random(), alice(), other, Bytes::new(), 1).unwrap_err();
        assert_eq!(err, ChannelError::JudgeMismatch);
    }

    #[test]
    fn test_receiver_takes_other_slot() {
        let mut a =
            Channel::propose(ChannelId::random(), alice(), bob().as_counterparty(), Bytes::new(), 1)
                .unwrap();
        let ev = a.confirm().unwrap();
        assert_eq!(a.phase, Phase::PendingOpen);

        let b = Channel::from_opening_envelope(&ev, bob(), alice().as_counterparty()).unwrap();
        assert_eq!(b.phase, Phase::PendingOpen);
        assert_eq!(b.me, Slot::One);
    }

    #[test]
    fn test_receiver_rejects_stranger() {
        let mut a =
            Channel::propose(ChannelId::random(), alice(), bob().as_counterparty(), Bytes::new(), 1)
                .unwrap();
        let ev = a.confirm().unwrap();
        let carol = Account::new("carol", SecretSeed([3; 32]), "carol:1", judge());

        let err = Channel::from_opening_envelope(&ev, carol, alice().as_counterparty()).unwrap_err();
        assert_eq!(err, ChannelError::NotAParty);
    }

    #[test]
    fn test_open_sets_last_full_to_opening_state() {
        let (a, b) = open_pair();
        for ch in [&a, &b] {
            assert_eq!(ch.phase, Phase::Open);
            assert_eq!(ch.sequence(), Some(0));
            assert_eq!(ch.last_full_update_tx.as_ref().unwrap().state, Bytes::from_static(b"s0"));
            assert!(ch.opening_tx_envelope.is_complete());
        }
    }

    #[test]
    fn test_open_is_idempotent() {
        let (mut a, _) = open_pair();
        let full = a.opening_tx_envelope.clone();
        assert!(!a.open(&full).unwrap());
        assert_eq!(a.phase, Phase::Open);
    }

    #[test]
    fn test_open_rejects_half_signed() {
        let mut a =
            Channel::propose(ChannelId::random(), alice(), bob().as_counterparty(), Bytes::new(), 1)
                .unwrap();
        let ev = a.confirm().unwrap();
        let err = a.open(&ev).unwrap_err();
        assert_eq!(err, ChannelError::Envelope(EnvelopeError::MissingSignature(Slot::One)));
        assert_eq!(a.phase, Phase::PendingOpen);
    }

    #[test]
    fn test_update_roundtrip() {
        let (mut a, mut b) = open_pair();

        let proposal = a.send_update(Bytes::from_static(b"s1"), false).unwrap();
        assert_eq!(a.phase, Phase::PendingUpdate);
        assert_eq!(a.proposed_update_tx.as_ref().unwrap().sequence_number, 1);

        assert_eq!(b.receive_update(&proposal).unwrap(), UpdateOutcome::Proposed);
        let full = b.confirm_update().unwrap();
        assert_eq!(b.phase, Phase::Open);
        assert_eq!(b.sequence(), Some(1));
        assert!(b.proposed_update_tx.is_none());

        assert_eq!(a.receive_update(&full).unwrap(), UpdateOutcome::Confirmed);
        assert_eq!(a.phase, Phase::Open);
        assert_eq!(a.sequence(), Some(1));
        assert!(a.proposed_update_tx.is_none());
        assert_eq!(a.last_full_update_tx, b.last_full_update_tx);
    }

    #[test]
    fn test_second_update_while_pending() {
        let (mut a, _) = open_pair();
        a.send_update(Bytes::from_static(b"s1"), false).unwrap();
        let err = a.send_update(Bytes::from_static(b"s2"), false).unwrap_err();
        assert_eq!(err, ChannelError::UpdateAlreadyPending { sequence: 1 });
    }

    #[test]
    fn test_confirm_own_proposal_needs_counter_signature() {
        let (mut a, _) = open_pair();
        a.send_update(Bytes::from_static(b"s1"), true).unwrap();
        assert_eq!(a.confirm_update().unwrap_err(), ChannelError::MissingCounterSignature);
        assert_eq!(a.phase, Phase::PendingUpdate);
    }

    #[test]
    fn test_stale_update_rejected_without_change() {
        let (mut a, mut b) = open_pair();
        let p1 = a.send_update(Bytes::from_static(b"s1"), false).unwrap();
        b.receive_update(&p1).unwrap();
        let full1 = b.confirm_update().unwrap();
        a.receive_update(&full1).unwrap();

        // A fresh sequence-1 proposal with different state is stale now.
        let forged = UpdateTx {
            channel_id: a.channel_id,
            pubkeys: a.opening_tx.pubkeys,
            sequence_number: 1,
            state: Bytes::from_static(b"s1-other"),
            fast: false,
        };
        let ev = Envelope::new(&forged.into()).sign(&alice(), Slot::Zero).unwrap();
        let before = b.clone();

        let err = b.receive_update(&ev).unwrap_err();
        assert_eq!(err, ChannelError::StaleUpdate { received: 1, current: 1 });
        assert_eq!(b, before);
    }

    #[test]
    fn test_redelivered_update_is_noop() {
        let (mut a, mut b) = open_pair();
        let p1 = a.send_update(Bytes::from_static(b"s1"), false).unwrap();
        assert_eq!(b.receive_update(&p1).unwrap(), UpdateOutcome::Proposed);
        assert_eq!(b.receive_update(&p1).unwrap(), UpdateOutcome::AlreadyKnown);

        let full = b.confirm_update().unwrap();
        assert_eq!(b.receive_update(&full).unwrap(), UpdateOutcome::AlreadyKnown);
        assert_eq!(b.receive_update(&p1).unwrap(), UpdateOutcome::AlreadyKnown);
    }

    #[test]
    fn test_update_for_other_channel() {
        let (mut a, _) = open_pair();
        let (_, mut b2) = {
            let mut x = Channel::propose(
                ChannelId::from_bytes([8; 32]),
                alice(),
                bob().as_counterparty(),
                Bytes::new(),
                1,
            )
            .unwrap();
            let ev = x.confirm().unwrap();
            let mut y = Channel::from_opening_envelope(&ev, bob(), alice().as_counterparty()).unwrap();
            let full = y.confirm().unwrap();
            x.open(&full).unwrap();
            (x, y)
        };
        let p = a.send_update(Bytes::from_static(b"s1"), false).unwrap();
        assert!(matches!(
            b2.receive_update(&p),
            Err(ChannelError::ChannelMismatch { .. })
        ));
    }

    #[test]
    fn test_check_final_stall_disputes() {
        let (mut a, _) = open_pair();
        a.send_update(Bytes::from_static(b"s1"), false).unwrap();

        let filing = a.check_final(None).unwrap().unwrap();
        assert_eq!(a.phase, Phase::Disputed);
        assert_eq!(Some(&filing), a.last_full_update_tx_envelope.as_ref());
        assert!(filing.is_complete());
    }

    #[test]
    fn test_check_final_bad_envelope_disputes() {
        let (mut a, _) = open_pair();
        let mut p = a.send_update(Bytes::from_static(b"s1"), false).unwrap();
        p.signatures[1] = p.signatures[0];

        assert!(a.check_final(Some(&p)).unwrap().is_some());
        assert_eq!(a.phase, Phase::Disputed);
        assert!(a.send_update(Bytes::new(), false).is_err());
    }

    #[test]
    fn test_check_final_adopts_newer_full() {
        let (mut a, mut b) = open_pair();
        let p = a.send_update(Bytes::from_static(b"s1"), true).unwrap();
        b.receive_update(&p).unwrap();
        let full = b.confirm_update().unwrap();

        assert_eq!(a.check_final(Some(&full)).unwrap(), None);
        assert_eq!(a.phase, Phase::Open);
        assert_eq!(a.sequence(), Some(1));
        assert!(a.last_full_update_tx.as_ref().unwrap().fast);
    }

    #[test]
    fn test_check_final_requires_open_channel() {
        let mut a =
            Channel::propose(ChannelId::random(), alice(), bob().as_counterparty(), Bytes::new(), 1)
                .unwrap();
        assert!(matches!(a.check_final(None), Err(ChannelError::InvalidPhase { .. })));
    }

    fn signed_update(channel: &Channel, signer: &Account, sequence_number: u64) -> Envelope {
        let utx = UpdateTx {
            channel_id: channel.channel_id,
            pubkeys: channel.opening_tx.pubkeys,
            sequence_number,
            state: Bytes::from_static(b"far"),
            fast: false,
        };
        let slot = TxPayload::from(utx.clone()).slot_of(&signer.pubkey).unwrap();
        Envelope::new(&utx.into()).sign(signer, slot).unwrap()
    }

    #[test]
    fn test_max_sequence_rejected_without_change() {
        let (_, mut b) = open_pair();
        let ev = signed_update(&b, &alice(), u64::MAX);
        let before = b.clone();

        let err = b.receive_update(&ev).unwrap_err();
        assert_eq!(err, ChannelError::SequenceExhausted(b.channel_id));
        assert_eq!(b, before);
    }

    #[test]
    fn test_max_sequence_final_is_disputed() {
        let (mut a, _) = open_pair();
        let ev = signed_update(&a, &alice(), u64::MAX).sign(&bob(), Slot::One).unwrap();
        assert!(ev.is_complete());

        assert!(a.check_final(Some(&ev)).unwrap().is_some());
        assert_eq!(a.phase, Phase::Disputed);
        assert_eq!(a.sequence(), Some(0));
    }

    #[test]
    fn test_send_update_after_highest_usable_sequence() {
        let (mut a, mut b) = open_pair();
        let ev = signed_update(&b, &alice(), u64::MAX - 1);
        assert_eq!(b.receive_update(&ev).unwrap(), UpdateOutcome::Proposed);
        b.confirm_update().unwrap();
        assert_eq!(b.sequence(), Some(u64::MAX - 1));

        let next = b.send_update(Bytes::from_static(b"last"), false).unwrap();
        assert_eq!(a.receive_update(&next).unwrap_err(), ChannelError::SequenceExhausted(a.channel_id));

        // A channel whose last full update already holds the top value
        // refuses to propose instead of wrapping.
        b.last_full_update_tx.as_mut().unwrap().sequence_number = u64::MAX;
        b.proposed_update_tx = None;
        b.proposed_update_tx_envelope = None;
        b.phase = Phase::Open;
        let err = b.send_update(Bytes::new(), false).unwrap_err();
        assert_eq!(err, ChannelError::SequenceExhausted(b.channel_id));
        assert_eq!(b.phase, Phase::Open);
    }

    #[test]
    fn test_fulfillments_kept_in_order() {
        let (mut a, _) = open_pair();
        a.add_fulfillment(Bytes::from_static(b"f1")).unwrap();
        a.add_fulfillment(Bytes::from_static(b"f2")).unwrap();
        assert_eq!(a.fulfillments, vec![Bytes::from_static(b"f1"), Bytes::from_static(b"f2")]);
    }

    #[test]
    fn test_channel_serde_roundtrip() {
        let (a, _) = open_pair();
        let mut buf = Vec::new();
        ciborium::into_writer(&a, &mut buf).unwrap();
        let back: Channel = ciborium::from_reader(buf.as_slice()).unwrap();
        assert_eq!(back, a);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_last_full_sequence_is_monotonic(
            steps in proptest::collection::vec((any::<bool>(), any::<bool>()), 1..12)
        ) {
            let (mut a, mut b) = open_pair();
            let mut last = a.sequence().unwrap();

            for (i, (from_a, fast)) in steps.into_iter().enumerate() {
                let (p, q) = if from_a { (&mut a, &mut b) } else { (&mut b, &mut a) };
                let state = Bytes::from(format!("s{}", i + 1));
                let proposal = p.send_update(state, fast).unwrap();
                prop_assert_eq!(q.receive_update(&proposal).unwrap(), UpdateOutcome::Proposed);
                let full = q.confirm_update().unwrap();
                prop_assert_eq!(p.receive_update(&full).unwrap(), UpdateOutcome::Confirmed);

                for ch in [&a, &b] {
                    let seq = ch.sequence().unwrap();
                    prop_assert!(seq >= last);
                    prop_assert_eq!(ch.phase, Phase::Open);
                    prop_assert!(ch.proposed_update_tx.is_none());
                }
                last = a.sequence().unwrap();
            }
        }
    }
}
