//! Transaction payloads carried inside envelopes.
//!
//! Both payload kinds record the two party pubkeys in slot order, so an
//! envelope can be verified from its payload alone.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::canonical;
use crate::crypto::Pubkey;
use crate::error::EnvelopeError;
use crate::types::{ChannelId, Slot};

/// Discriminator for the payload an envelope carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TxKind {
    Opening = 1,
    Update = 2,
}

impl TxKind {
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Opening),
            2 => Some(Self::Update),
            _ => None,
        }
    }
}

/// The initial channel state, naming both parties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpeningTx {
    pub channel_id: ChannelId,
    /// `pubkeys[0]` is the proposer, `pubkeys[1]` the receiver.
    pub pubkeys: [Pubkey; 2],
    /// Opaque application state.
    pub state: Bytes,
    /// Cooperative hold period the judge applies before enforcing.
    pub hold_period: u32,
}

/// A successor state with a strictly increasing sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateTx {
    pub channel_id: ChannelId,
    pub pubkeys: [Pubkey; 2],
    pub sequence_number: u64,
    pub state: Bytes,
    /// Skip the cooperative hold period on dispute. Passed through untouched.
    pub fast: bool,
}

impl UpdateTx {
    /// The sequence-0 state a freshly opened channel falls back to.
    pub fn from_opening(otx: &OpeningTx) -> Self {
        Self {
            channel_id: otx.channel_id,
            pubkeys: otx.pubkeys,
            sequence_number: 0,
            state: otx.state.clone(),
            fast: false,
        }
    }
}

/// A decoded envelope payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxPayload {
    Opening(OpeningTx),
    Update(UpdateTx),
}

impl TxPayload {
    pub fn kind(&self) -> TxKind {
        match self {
            TxPayload::Opening(_) => TxKind::Opening,
            TxPayload::Update(_) => TxKind::Update,
        }
    }

    pub fn channel_id(&self) -> &ChannelId {
        match self {
            TxPayload::Opening(otx) => &otx.channel_id,
            TxPayload::Update(utx) => &utx.channel_id,
        }
    }

    pub fn pubkeys(&self) -> &[Pubkey; 2] {
        match self {
            TxPayload::Opening(otx) => &otx.pubkeys,
            TxPayload::Update(utx) => &utx.pubkeys,
        }
    }

    /// The pubkey that owns `slot`.
    pub fn pubkey_at(&self, slot: Slot) -> &Pubkey {
        &self.pubkeys()[slot.index()]
    }

    /// The slot owned by `pubkey`, if it is a party to this payload.
    pub fn slot_of(&self, pubkey: &Pubkey) -> Option<Slot> {
        Slot::BOTH
            .into_iter()
            .find(|slot| self.pubkey_at(*slot) == pubkey)
    }

    /// Canonical bytes; this is what slot signatures cover.
    pub fn encode(&self) -> Vec<u8> {
        canonical::encode_payload(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        canonical::decode_payload(bytes)
    }
}

impl From<OpeningTx> for TxPayload {
    fn from(otx: OpeningTx) -> Self {
        TxPayload::Opening(otx)
    }
}

impl From<UpdateTx> for TxPayload {
    fn from(utx: UpdateTx) -> Self {
        TxPayload::Update(utx)
    }
}
