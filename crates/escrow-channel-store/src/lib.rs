//! # Escrow Channel Store
//!
//! Entity store for the escrow channel client. Provides a trait-based,
//! transactional interface over a bucketed key-value keyspace with SQLite
//! and in-memory implementations.
//!
//! ## Overview
//!
//! Four entity kinds live in their own buckets (judges, accounts,
//! counterparties, channels) plus one index bucket mapping a judge pubkey to
//! its channels. There is no relational engine: channels embed copies of
//! their parties, and the [`EntityTx`] layer keeps those copies honest.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait: `update` (single writer) and `view`
//! - [`KvTx`] - Raw bucket access inside a transaction
//! - [`EntityTx`] - Cascade writes and populate reads over any [`KvTx`]
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use escrow_channel_store::{EntityTx, SqliteStore, Store, StoreError};
//! use escrow_channel_core::ChannelId;
//!
//! async fn example(id: ChannelId) -> Result<(), StoreError> {
//!     let store = SqliteStore::open("channels.db")?;
//!
//!     // Read-modify-write of one channel is one transaction.
//!     store
//!         .update(move |tx| {
//!             let mut channel = tx.get_channel(&id)?;
//!             channel.fulfillments.push(b"proof".to_vec().into());
//!             tx.put_channel(&channel)
//!         })
//!         .await
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Cascade writes**: storing a channel re-stores its judge, account and
//!   counterparty and updates the judge index, atomically
//! - **Populate reads**: loading a channel replaces its embedded parties with
//!   the standalone records
//! - **Strict decoding**: a corrupt record or a missing referenced entity is
//!   an error, never skipped

pub mod entities;
pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use entities::EntityTx;
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{Bucket, KvTx, Store};
