//! Store trait: the abstract interface for transactional entity persistence.
//!
//! The store is a set of named buckets of ordered byte keys. Backends only
//! provide raw bucket access inside a transaction ([`KvTx`]); the entity
//! rules (cascade on write, populate on read, the judge index) are layered
//! on top in [`crate::entities`] so every backend shares them.

use async_trait::async_trait;

use crate::error::{Result, StoreError};

/// The logical collections of the keyspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Bucket {
    Judges,
    Accounts,
    Counterparties,
    Channels,
    /// Secondary indexes, keyed by `(relation, field, value, channel_id)`.
    Indexes,
}

impl Bucket {
    pub const ALL: [Bucket; 5] = [
        Bucket::Judges,
        Bucket::Accounts,
        Bucket::Counterparties,
        Bucket::Channels,
        Bucket::Indexes,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Bucket::Judges => "judges",
            Bucket::Accounts => "accounts",
            Bucket::Counterparties => "counterparties",
            Bucket::Channels => "channels",
            Bucket::Indexes => "indexes",
        }
    }
}

/// Raw bucket access within one transaction.
pub trait KvTx {
    fn get(&self, bucket: Bucket, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn put(&mut self, bucket: Bucket, key: &[u8], value: &[u8]) -> Result<()>;

    /// All entries whose key starts with `prefix`, in key order.
    fn scan(&self, bucket: Bucket, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;
}

/// The Store trait: async, transactional access to the keyspace.
///
/// `update` runs its closure as a single writer and commits only if the
/// closure returns `Ok`; on `Err` nothing it wrote is visible. `view` runs
/// a read-only closure and may run alongside other readers.
///
/// Closures are synchronous and `'static` so SQLite can run them under
/// `spawn_blocking`. Network I/O never happens inside one.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    async fn update<F, R, E>(&self, f: F) -> std::result::Result<R, E>
    where
        F: FnOnce(&mut dyn KvTx) -> std::result::Result<R, E> + Send + 'static,
        R: Send + 'static,
        E: From<StoreError> + Send + 'static;

    async fn view<F, R, E>(&self, f: F) -> std::result::Result<R, E>
    where
        F: FnOnce(&dyn KvTx) -> std::result::Result<R, E> + Send + 'static,
        R: Send + 'static,
        E: From<StoreError> + Send + 'static;
}
