//! Envelope: a transaction payload plus two ordered signature slots.
//!
//! The payload is kept as its canonical bytes so that what was signed is
//! exactly what travels and what is stored. Slot `n` may only be signed by
//! the party recorded at `pubkeys[n]` inside the payload.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::crypto::{PayloadHash, Signature};
use crate::entity::Account;
use crate::error::EnvelopeError;
use crate::tx::{OpeningTx, TxKind, TxPayload, UpdateTx};
use crate::types::Slot;

type Result<T> = std::result::Result<T, EnvelopeError>;

/// A payload with its signature slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Declared kind; must agree with the encoded payload.
    pub kind: TxKind,
    /// Canonical payload bytes.
    pub payload: Bytes,
    pub signatures: [Option<Signature>; 2],
}

impl Envelope {
    /// Wrap a payload with both slots empty.
    pub fn new(payload: &TxPayload) -> Self {
        Self {
            kind: payload.kind(),
            payload: Bytes::from(payload.encode()),
            signatures: [None, None],
        }
    }

    pub fn payload_hash(&self) -> PayloadHash {
        PayloadHash::of(&self.payload)
    }

    /// Decode the payload, checking it against the declared kind.
    pub fn decode_payload(&self) -> Result<TxPayload> {
        let payload = TxPayload::decode(&self.payload)?;
        if payload.kind() != self.kind {
            return Err(EnvelopeError::UnexpectedKind { expected: self.kind });
        }
        Ok(payload)
    }

    pub fn opening_tx(&self) -> Result<OpeningTx> {
        match self.decode_payload()? {
            TxPayload::Opening(otx) => Ok(otx),
            TxPayload::Update(_) => Err(EnvelopeError::UnexpectedKind {
                expected: TxKind::Opening,
            }),
        }
    }

    pub fn update_tx(&self) -> Result<UpdateTx> {
        match self.decode_payload()? {
            TxPayload::Update(utx) => Ok(utx),
            TxPayload::Opening(_) => Err(EnvelopeError::UnexpectedKind {
                expected: TxKind::Update,
            }),
        }
    }

    pub fn signature(&self, slot: Slot) -> Option<&Signature> {
        self.signatures[slot.index()].as_ref()
    }

    pub fn has_signature(&self, slot: Slot) -> bool {
        self.signatures[slot.index()].is_some()
    }

    /// Number of occupied slots (not necessarily valid).
    pub fn signature_count(&self) -> usize {
        self.signatures.iter().filter(|s| s.is_some()).count()
    }

    /// Return a copy with `slot` signed by `account`.
    pub fn sign(&self, account: &Account, slot: Slot) -> Result<Envelope> {
        if self.has_signature(slot) {
            return Err(EnvelopeError::SlotOccupied(slot));
        }
        let payload = self.decode_payload()?;
        if payload.pubkey_at(slot) != &account.pubkey {
            return Err(EnvelopeError::WrongAccount(slot));
        }

        let mut signed = self.clone();
        signed.signatures[slot.index()] = Some(account.keypair().sign(&self.payload));
        Ok(signed)
    }

    /// Check every occupied slot, and optionally that the payload is the one
    /// the caller expects. Returns the decoded payload.
    pub fn verify(&self, expected: Option<&PayloadHash>) -> Result<TxPayload> {
        if let Some(expected) = expected {
            if &self.payload_hash() != expected {
                return Err(EnvelopeError::PayloadMismatch);
            }
        }

        let payload = self.decode_payload()?;
        for slot in Slot::BOTH {
            if let Some(sig) = self.signature(slot) {
                payload
                    .pubkey_at(slot)
                    .verify(&self.payload, sig)
                    .map_err(|_| EnvelopeError::InvalidSignature(slot))?;
            }
        }
        Ok(payload)
    }

    /// Require `slot` to be present and valid.
    pub fn verify_slot(&self, slot: Slot) -> Result<()> {
        let sig = self
            .signature(slot)
            .ok_or(EnvelopeError::MissingSignature(slot))?;
        let payload = self.decode_payload()?;
        payload
            .pubkey_at(slot)
            .verify(&self.payload, sig)
            .map_err(|_| EnvelopeError::InvalidSignature(slot))
    }

    /// Both slots occupied and valid.
    pub fn is_complete(&self) -> bool {
        self.signature_count() == 2 && self.verify(None).is_ok()
    }

    /// Wire encoding.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).expect("CBOR serialization failed");
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| EnvelopeError::Decode(e.to_string()))
    }
}
