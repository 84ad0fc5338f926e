//! # Escrow Channel Transport
//!
//! The delivery boundary of the escrow channel client: how envelopes reach a
//! counterparty or a judge.
//!
//! ## Overview
//!
//! Outbound, the client hands a [`Delivery`] to a [`Transport`] only after
//! the local state change it belongs to has committed. A failed send never
//! rolls anything back; it is reported so the caller can resend. Inbound,
//! whatever listens on the client's address decodes a [`Delivery`] and
//! passes it to the client's receiver.
//!
//! [`memory::MemoryNetwork`] wires several parties together in one process
//! for tests.

pub mod error;
pub mod messages;
pub mod transport;

pub use error::{Result, TransportError};
pub use messages::{Delivery, Origin, PROTOCOL_VERSION};
pub use transport::{
    memory::{Inbox, MemoryNetwork, MemoryTransport},
    Transport,
};
