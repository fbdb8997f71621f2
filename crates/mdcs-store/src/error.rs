//! Error types for the storage layer.

use thiserror::Error;

/// Errors returned by a [`Transaction`](crate::Transaction).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A concurrent transaction committed a change to a key this transaction
    /// depended on. Safe to retry from scratch.
    #[error("transaction conflict")]
    Conflict,

    #[error("transaction already closed")]
    TxnClosed,

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether this error is a write-write/read-write conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict)
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
