//! Error types for envelopes and the channel state machine.

use thiserror::Error;

use crate::channel::Phase;
use crate::types::{ChannelId, Slot};

/// Envelope construction and validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    #[error("signature slot {0} is already occupied")]
    SlotOccupied(Slot),

    #[error("account is not the party at signature slot {0}")]
    WrongAccount(Slot),

    #[error("invalid signature in slot {0}")]
    InvalidSignature(Slot),

    #[error("signature slot {0} is empty")]
    MissingSignature(Slot),

    #[error("payload does not match the expected transaction")]
    PayloadMismatch,

    #[error("expected a {expected:?} payload")]
    UnexpectedKind { expected: crate::tx::TxKind },

    #[error("payload decoding error: {0}")]
    Decode(String),

    /// Raw verification failure; [`crate::Envelope::verify`] reports it
    /// with the offending slot as [`EnvelopeError::InvalidSignature`].
    #[error("signature verification failed")]
    BadSignature,

    #[error("invalid public key")]
    InvalidPubkey,
}

/// State machine guard violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("channel {channel_id} is {actual:?}, expected {expected}")]
    InvalidPhase {
        channel_id: ChannelId,
        actual: Phase,
        expected: &'static str,
    },

    #[error("stale update: sequence {received} is not after {current}")]
    StaleUpdate { received: u64, current: u64 },

    #[error("update {sequence} is already pending")]
    UpdateAlreadyPending { sequence: u64 },

    #[error("envelope is for channel {received}, not {expected}")]
    ChannelMismatch {
        expected: ChannelId,
        received: ChannelId,
    },

    #[error("channel {0} already exists with a different opening transaction")]
    ChannelExists(ChannelId),

    #[error("account and counterparty do not share a judge")]
    JudgeMismatch,

    #[error("account is not a party to this channel")]
    NotAParty,

    #[error("proposed update lacks the counterparty's signature")]
    MissingCounterSignature,

    #[error("opening envelope must carry exactly one signature, found {0}")]
    UnexpectedSignatureCount(usize),

    #[error("channel {0} has no sequence numbers left")]
    SequenceExhausted(ChannelId),
}

/// Result type for channel operations.
pub type Result<T> = std::result::Result<T, ChannelError>;
