//! # Escrow Channel Core
//!
//! Pure primitives for the escrow channel client: party entities,
//! transaction payloads, signed envelopes, and the channel state machine.
//!
//! This crate contains no I/O, no storage, no networking. Storage lives in
//! `escrow-channel-store`, delivery in `escrow-channel-transport`.
//!
//! ## Key Types
//!
//! - [`Channel`] - The bilateral channel aggregate and its transitions
//! - [`Envelope`] - A payload plus two ordered signature slots
//! - [`OpeningTx`] / [`UpdateTx`] - The payloads an envelope carries
//! - [`Judge`], [`Account`], [`Counterparty`] - The parties a channel names
//!
//! ## Canonicalization
//!
//! Payloads are encoded as deterministic CBOR before signing. See the
//! [`canonical`] module.

pub mod canonical;
pub mod channel;
pub mod crypto;
pub mod entity;
pub mod envelope;
pub mod error;
pub mod tx;
pub mod types;

pub use channel::{Channel, Phase, UpdateOutcome};
pub use crypto::{Keypair, PayloadHash, Pubkey, SecretSeed, Signature};
pub use entity::{Account, Counterparty, Judge};
pub use envelope::Envelope;
pub use error::{ChannelError, EnvelopeError, Result};
pub use tx::{OpeningTx, TxKind, TxPayload, UpdateTx};
pub use types::{ChannelId, Slot};
