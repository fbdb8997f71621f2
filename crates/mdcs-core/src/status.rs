//! Document existence status.
//!
//! Composite deltas carry a status. Deleted dominates Active, so once any
//! replica deletes a document every replica that sees the delete agrees it
//! is gone.

use crate::lattice::Lattice;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DocumentStatus {
    Active,
    Deleted,
}

impl DocumentStatus {
    pub fn as_byte(&self) -> u8 {
        match self {
            DocumentStatus::Active => 1,
            DocumentStatus::Deleted => 2,
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(DocumentStatus::Active),
            2 => Some(DocumentStatus::Deleted),
            _ => None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, DocumentStatus::Deleted)
    }
}

impl Lattice for DocumentStatus {
    fn bottom() -> Self {
        DocumentStatus::Active
    }

    fn join(&self, other: &Self) -> Self {
        (*self).max(*other)
    }
}
