//! Error types for the client.

use escrow_channel_core::{ChannelError, ChannelId, Envelope, EnvelopeError};
use escrow_channel_store::StoreError;
use escrow_channel_transport::TransportError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// State machine guard or envelope validation failure.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Envelope failure outside a transition (decoding an inbound payload).
    #[error("envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Transport error not tied to a committed change.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The local change committed but the envelope was not delivered.
    /// Resend `envelope` to `address` once the remote is reachable.
    #[error("committed locally but delivery to {address} failed: {source}")]
    Undelivered {
        channel_id: Option<ChannelId>,
        address: String,
        envelope: Box<Envelope>,
        #[source]
        source: TransportError,
    },

    /// Malformed request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration could not be parsed.
    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

/// Coarse error classes for mapping to an API status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Storage,
    /// A signature, payload or encoding check failed.
    Validation,
    /// The operation is not allowed in the channel's current state.
    Guard,
    BadRequest,
    CounterpartyUnresponsive,
    CounterpartyError,
}

fn envelope_kind(e: &EnvelopeError) -> ErrorKind {
    match e {
        EnvelopeError::SlotOccupied(_) | EnvelopeError::WrongAccount(_) => ErrorKind::Guard,
        _ => ErrorKind::Validation,
    }
}

fn transport_kind(e: &TransportError) -> ErrorKind {
    match e {
        TransportError::Unresponsive { .. } => ErrorKind::CounterpartyUnresponsive,
        TransportError::Encoding(_) => ErrorKind::Validation,
        TransportError::RemoteRejected { .. } | TransportError::VersionMismatch { .. } => {
            ErrorKind::CounterpartyError
        }
    }
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Channel(ChannelError::Envelope(e)) | ClientError::Envelope(e) => {
                envelope_kind(e)
            }
            ClientError::Channel(ChannelError::ChannelMismatch { .. }) => ErrorKind::Validation,
            ClientError::Channel(_) => ErrorKind::Guard,
            ClientError::Store(e) if e.is_not_found() => ErrorKind::NotFound,
            ClientError::Store(_) => ErrorKind::Storage,
            ClientError::Transport(e) => transport_kind(e),
            ClientError::Undelivered { source, .. } => transport_kind(source),
            ClientError::InvalidRequest(_) | ClientError::Config(_) => ErrorKind::BadRequest,
        }
    }

    /// The local state is committed and only delivery is outstanding.
    pub fn is_undelivered(&self) -> bool {
        matches!(self, ClientError::Undelivered { .. })
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
