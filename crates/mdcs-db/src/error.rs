//! Error types for the document layer.

use mdcs_core::{CrdtError, CrdtType, FieldKind};
use mdcs_merkle::{Cid, MerkleError};
use mdcs_store::StoreError;
use thiserror::Error;

/// Errors that can occur in database operations.
///
/// Cloneable so the final outcome of a merge can be handed to its waiter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DbError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Merkle(#[from] MerkleError),

    #[error(transparent)]
    Crdt(#[from] CrdtError),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Collection already exists: {0}")]
    CollectionAlreadyExists(String),

    #[error("Field does not exist: {0}")]
    FieldNotExist(String),

    #[error("Field {field} cannot use {crdt:?} with kind {kind:?}")]
    CrdtKindMismatch {
        field: String,
        crdt: CrdtType,
        kind: FieldKind,
    },

    /// A block's payload does not fit the CRDT of the field it targets.
    #[error("Block {} carries an unexpected payload for {field}", .cid.short())]
    UnexpectedPayload { cid: Cid, field: String },

    /// A block links into a history it does not belong to.
    #[error("Malformed block {}: {reason}", .cid.short())]
    MalformedBlock { cid: Cid, reason: String },

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Document already exists: {0}")]
    DocumentAlreadyExists(String),

    #[error("Document was deleted: {0}")]
    DocumentDeleted(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Background task failed: {0}")]
    TaskFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DbError {
    /// Whether the operation failed on a transaction conflict and may be
    /// retried from scratch.
    pub fn is_conflict(&self) -> bool {
        match self {
            DbError::Store(e) => e.is_conflict(),
            DbError::Merkle(e) => e.is_conflict(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::InvalidConfig(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
