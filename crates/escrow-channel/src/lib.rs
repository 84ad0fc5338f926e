//! # Escrow Channel
//!
//! Client for bilateral, escrow-backed payment channels arbitrated by a
//! judge.
//!
//! ## Overview
//!
//! Two parties agree on a sequence of signed states. Each state lives in an
//! envelope with two ordered signature slots; only an envelope carrying both
//! signatures is binding. If the counterparty stalls or cheats, the last
//! fully signed state is filed with the judge.
//!
//! - **Caller**: operations the local user starts (propose, confirm, update)
//! - **Receiver**: envelopes arriving from the counterparty or the judge
//! - **JudgeClient**: opening and dispute filings
//! - **Registry**: judges, accounts, counterparties and channel queries
//!
//! ## Usage
//!
//! ```rust,no_run
//! use escrow_channel::{ClientConfig, Context, Result};
//! use escrow_channel::core::{Pubkey, SecretSeed};
//! use escrow_channel::store::SqliteStore;
//! use escrow_channel::transport::MemoryNetwork;
//!
//! async fn example(judge: Pubkey, bob: Pubkey) -> Result<()> {
//!     let store = SqliteStore::open("channels.db")?;
//!     let network = MemoryNetwork::new();
//!     let ctx = Context::new(store, network.create_transport(), ClientConfig::default());
//!
//!     let alice = ctx
//!         .registry()
//!         .add_account("alice", SecretSeed([1; 32]), "alice:3001", judge)
//!         .await?;
//!
//!     // Sign and store the opening state, then release it to bob.
//!     let channel = ctx
//!         .caller()
//!         .propose_channel(alice.pubkey, bob, b"genesis".to_vec().into(), None)
//!         .await?;
//!     ctx.caller().confirm_channel(channel.channel_id).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Delivery
//!
//! A transition commits before anything is sent. When a send fails the
//! operation returns [`ClientError::Undelivered`] with the envelope and
//! address; pass them to [`Caller::resend`] once the remote is back.
//! Receivers treat re-deliveries as no-ops.
//!
//! ## Re-exports
//!
//! - `escrow_channel::core` - Envelopes, transactions and the state machine
//! - `escrow_channel::store` - Entity store and its backends
//! - `escrow_channel::transport` - Transport trait and the in-memory network

pub mod api;
pub mod caller;
pub mod config;
pub mod context;
pub mod error;
pub mod judge;
pub mod receiver;
pub mod registry;
pub mod requests;

#[cfg(test)]
mod testing;

pub use escrow_channel_core as core;
pub use escrow_channel_store as store;
pub use escrow_channel_transport as transport;

pub use api::Api;
pub use caller::Caller;
pub use config::ClientConfig;
pub use context::Context;
pub use error::{ClientError, ErrorKind, Result};
pub use judge::JudgeClient;
pub use receiver::{Inbound, Receiver};
pub use registry::Registry;
pub use requests::{ChannelSummary, ErrorResponse};

pub use escrow_channel_core::{
    Account, Channel, ChannelId, Counterparty, Envelope, Judge, Phase, Pubkey, Slot, UpdateOutcome,
};
