//! Error types for the transport module.

use thiserror::Error;

/// Errors that can occur while delivering an envelope.
///
/// None of these affect committed local state; the sender may resend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The remote could not be reached or did not answer.
    #[error("{address} is unresponsive: {reason}")]
    Unresponsive { address: String, reason: String },

    /// The remote answered but refused the delivery.
    #[error("{address} rejected the delivery: {reason}")]
    RemoteRejected { address: String, reason: String },

    /// Wire encoding or decoding failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Protocol version mismatch with peer.
    #[error("protocol version mismatch: local={local}, peer={peer}")]
    VersionMismatch { local: u8, peer: u8 },
}

impl TransportError {
    pub(crate) fn unresponsive(address: &str, reason: impl Into<String>) -> Self {
        TransportError::Unresponsive {
            address: address.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
