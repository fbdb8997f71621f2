//! Errors raised while storing, loading and walking blocks.

use crate::hash::Cid;
use mdcs_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MerkleError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("block not found: {}", .0.short())]
    BlockNotFound(Cid),

    /// Stored bytes do not hash to the identifier they are stored under.
    #[error("block content does not match its identifier: {}", .0.short())]
    CorruptBlock(Cid),

    #[error("failed to decode block {cid}: {reason}")]
    Decode { cid: Cid, reason: String },

    #[error("failed to encode block: {0}")]
    Encode(String),

    #[error("invalid signature on block {}", .0.short())]
    InvalidSignature(Cid),

    #[error("invalid head-set entry: {0}")]
    InvalidHead(String),
}

impl MerkleError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, MerkleError::Store(e) if e.is_conflict())
    }
}

pub type Result<T> = std::result::Result<T, MerkleError>;
