//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during store operations.
///
/// Any of these aborts the enclosing transaction.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Record encoding/decoding error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A requested or referenced entity is missing.
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// The blocking task or a lock guarding the backend failed.
    #[error("store task failed: {0}")]
    Task(String),
}

impl StoreError {
    pub(crate) fn not_found(kind: &'static str, key: impl std::fmt::Display) -> Self {
        StoreError::NotFound {
            kind,
            key: key.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
