//! Error types for the store module.

use chanstore_core::{TransactionId, TransactionStatus};
use thiserror::Error;

/// Errors that can occur during store operations.
///
/// A missing entity on a plain lookup is not an error: getters return
/// `Ok(None)` or an empty list.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Row payload could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An update references an entity that does not exist, or stored data
    /// has an unexpected shape. The enclosing transaction is rolled back.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// A transaction status change that would move backwards.
    #[error("invalid status transition for transaction {id}: {from} -> {to}")]
    InvalidTransition {
        id: TransactionId,
        from: TransactionStatus,
        to: TransactionStatus,
    },

    /// The capability is not available.
    #[error("not implemented: {0}")]
    Unimplemented(&'static str),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// Poisoned lock, closed database, or a failed blocking task.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether the caller may retry the operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::Database(_) | StoreError::Io(_) | StoreError::Runtime(_)
        )
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
