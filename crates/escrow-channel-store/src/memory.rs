//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same transactional semantics
//! as SQLite but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{Result, StoreError};
use crate::traits::{Bucket, KvTx, Store};

type Buckets = HashMap<Bucket, BTreeMap<Vec<u8>, Vec<u8>>>;

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock:
/// readers share the lock, an update holds it exclusively until commit.
pub struct MemoryStore {
    inner: RwLock<Buckets>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Bucket::ALL.into_iter().map(|b| (b, BTreeMap::new())).collect()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> StoreError {
    StoreError::Task(format!("lock poisoned: {}", e))
}

fn scan_bucket(
    entries: Option<&BTreeMap<Vec<u8>, Vec<u8>>>,
    prefix: &[u8],
) -> BTreeMap<Vec<u8>, Vec<u8>> {
    entries
        .map(|m| {
            m.range(prefix.to_vec()..)
                .take_while(|(k, _)| k.starts_with(prefix))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default()
}

/// Read-only view over committed data.
struct ReadTx<'a> {
    data: &'a Buckets,
}

impl KvTx for ReadTx<'_> {
    fn get(&self, bucket: Bucket, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.data.get(&bucket).and_then(|m| m.get(key)).cloned())
    }

    fn put(&mut self, bucket: Bucket, _key: &[u8], _value: &[u8]) -> Result<()> {
        Err(StoreError::Task(format!(
            "write to {} in a read-only transaction",
            bucket.name()
        )))
    }

    fn scan(&self, bucket: Bucket, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(scan_bucket(self.data.get(&bucket), prefix).into_iter().collect())
    }
}

/// Write transaction: buffers writes over committed data until commit.
struct WriteTx<'a> {
    data: &'a Buckets,
    pending: Buckets,
}

impl KvTx for WriteTx<'_> {
    fn get(&self, bucket: Bucket, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(value) = self.pending.get(&bucket).and_then(|m| m.get(key)) {
            return Ok(Some(value.clone()));
        }
        Ok(self.data.get(&bucket).and_then(|m| m.get(key)).cloned())
    }

    fn put(&mut self, bucket: Bucket, key: &[u8], value: &[u8]) -> Result<()> {
        self.pending
            .entry(bucket)
            .or_default()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn scan(&self, bucket: Bucket, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut merged = scan_bucket(self.data.get(&bucket), prefix);
        merged.extend(scan_bucket(self.pending.get(&bucket), prefix));
        Ok(merged.into_iter().collect())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn update<F, R, E>(&self, f: F) -> std::result::Result<R, E>
    where
        F: FnOnce(&mut dyn KvTx) -> std::result::Result<R, E> + Send + 'static,
        R: Send + 'static,
        E: From<StoreError> + Send + 'static,
    {
        let mut data = self.inner.write().map_err(poisoned)?;

        let mut tx = WriteTx {
            data: &*data,
            pending: Buckets::new(),
        };
        let out = f(&mut tx)?;
        let pending = tx.pending;

        for (bucket, entries) in pending {
            data.entry(bucket).or_default().extend(entries);
        }
        Ok(out)
    }

    async fn view<F, R, E>(&self, f: F) -> std::result::Result<R, E>
    where
        F: FnOnce(&dyn KvTx) -> std::result::Result<R, E> + Send + 'static,
        R: Send + 'static,
        E: From<StoreError> + Send + 'static,
    {
        let data = self.inner.read().map_err(poisoned)?;
        f(&ReadTx { data: &*data })
    }
}
