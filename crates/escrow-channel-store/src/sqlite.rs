//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend. It uses rusqlite with bundled
//! SQLite, wrapped in async via tokio::spawn_blocking. Every `update` is one
//! SQLite transaction: committed when the closure returns `Ok`, rolled back
//! (by drop) otherwise.
//!
//! File-backed stores run in WAL mode and serve `view` from a pool of
//! read-only connections, so readers neither wait for each other nor for the
//! writer.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{Bucket, KvTx, Store};

/// Idle read connections kept for reuse.
const MAX_IDLE_READERS: usize = 8;

/// How long a reader waits on a locked database (checkpoints, recovery).
const READER_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-based store implementation.
///
/// The writer connection sits behind a Mutex, which makes each `update` the
/// single writer. `view` on a file-backed store uses its own read-only
/// connection and runs concurrently with other views and with the writer.
/// An in-memory database has only the one connection, so there `view`
/// shares the writer's lock. All operations use spawn_blocking to avoid
/// blocking the async runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    readers: Option<Arc<ReaderPool>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut conn = Connection::open(&path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            readers: Some(Arc::new(ReaderPool::new(path))),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            readers: None,
        })
    }
}

/// Read-only connections to one database file.
struct ReaderPool {
    path: PathBuf,
    idle: Mutex<Vec<Connection>>,
}

impl ReaderPool {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            idle: Mutex::new(Vec::new()),
        }
    }

    fn take(&self) -> Result<Connection> {
        if let Some(conn) = self.idle.lock().map_err(poisoned)?.pop() {
            return Ok(conn);
        }
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(READER_BUSY_TIMEOUT)?;
        tracing::trace!(path = %self.path.display(), "opened read connection");
        Ok(conn)
    }

    fn give_back(&self, conn: Connection) {
        if let Ok(mut idle) = self.idle.lock() {
            if idle.len() < MAX_IDLE_READERS {
                idle.push(conn);
            }
        }
    }
}

fn poisoned<T>(e: PoisonError<T>) -> StoreError {
    StoreError::Database(rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
        Some(format!("mutex poisoned: {}", e)),
    ))
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock().map_err(poisoned)
}

fn join_error(e: tokio::task::JoinError) -> StoreError {
    StoreError::Task(format!("spawn_blocking failed: {}", e))
}

/// Bucket access over an open connection or transaction.
struct SqliteTx<'a> {
    conn: &'a Connection,
}

impl KvTx for SqliteTx<'_> {
    fn get(&self, bucket: Bucket, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self
            .conn
            .query_row(
                "SELECT value FROM kv WHERE bucket = ?1 AND key = ?2",
                params![bucket.name(), key],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn put(&mut self, bucket: Bucket, key: &[u8], value: &[u8]) -> Result<()> {
        self.conn.execute(
            "INSERT INTO kv (bucket, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(bucket, key) DO UPDATE SET value = excluded.value",
            params![bucket.name(), key, value],
        )?;
        Ok(())
    }

    fn scan(&self, bucket: Bucket, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT key, value FROM kv WHERE bucket = ?1 AND key >= ?2 ORDER BY key",
        )?;
        let rows = stmt.query_map(params![bucket.name(), prefix], |row| {
            Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, Vec<u8>>(1)?))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (key, value) = row?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push((key, value));
        }
        Ok(out)
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn update<F, R, E>(&self, f: F) -> std::result::Result<R, E>
    where
        F: FnOnce(&mut dyn KvTx) -> std::result::Result<R, E> + Send + 'static,
        R: Send + 'static,
        E: From<StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || -> std::result::Result<R, E> {
            let mut conn = lock(&conn)?;
            let tx = conn.transaction().map_err(StoreError::from)?;

            let out = f(&mut SqliteTx { conn: &*tx })?;

            tx.commit().map_err(StoreError::from)?;
            Ok(out)
        })
        .await
        .map_err(|e| E::from(join_error(e)))?
    }

    async fn view<F, R, E>(&self, f: F) -> std::result::Result<R, E>
    where
        F: FnOnce(&dyn KvTx) -> std::result::Result<R, E> + Send + 'static,
        R: Send + 'static,
        E: From<StoreError> + Send + 'static,
    {
        let task = match &self.readers {
            Some(pool) => {
                let pool = pool.clone();
                tokio::task::spawn_blocking(move || -> std::result::Result<R, E> {
                    let mut conn = pool.take()?;
                    // One read transaction, so `f` sees a single snapshot.
                    let out = {
                        let tx = conn.transaction().map_err(StoreError::from)?;
                        f(&SqliteTx { conn: &*tx })
                    };
                    pool.give_back(conn);
                    out
                })
            }
            None => {
                let conn = self.conn.clone();
                tokio::task::spawn_blocking(move || -> std::result::Result<R, E> {
                    let conn = lock(&conn)?;
                    f(&SqliteTx { conn: &*conn })
                })
            }
        };

        task.await.map_err(|e| E::from(join_error(e)))?
    }
}
