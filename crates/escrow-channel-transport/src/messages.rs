//! Wire messages exchanged between parties and with the judge.

use serde::{Deserialize, Serialize};

use escrow_channel_core::{Envelope, TxKind};

use crate::error::{Result, TransportError};

/// Current protocol version.
pub const PROTOCOL_VERSION: u8 = 0;

/// The sender's role in the channel.
///
/// A client is always one of the two parties, so everything it sends is
/// `Counterparty`, judge filings included. Only the judge stamps `Judge`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    /// Sent by a channel party.
    Counterparty,
    /// Relayed by the channel's judge.
    Judge,
}

/// One envelope in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub version: u8,
    pub origin: Origin,
    /// Address of the sender.
    pub from: String,
    /// Payload type the sender claims; checked against the envelope on receipt.
    pub declared_kind: TxKind,
    pub envelope: Envelope,
}

impl Delivery {
    pub fn new(origin: Origin, from: impl Into<String>, envelope: Envelope) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            origin,
            from: from.into(),
            declared_kind: envelope.kind,
            envelope,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| TransportError::Encoding(e.to_string()))?;
        Ok(buf)
    }

    /// Decode and check the protocol version.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let delivery: Delivery =
            ciborium::from_reader(bytes).map_err(|e| TransportError::Encoding(e.to_string()))?;
        if delivery.version != PROTOCOL_VERSION {
            return Err(TransportError::VersionMismatch {
                local: PROTOCOL_VERSION,
                peer: delivery.version,
            });
        }
        Ok(delivery)
    }
}
