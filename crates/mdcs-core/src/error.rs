//! Errors raised by CRDT value handling.

use crate::value::{CrdtType, FieldKind};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CrdtError {
    #[error("failed to encode value: {0}")]
    Encode(String),

    #[error("failed to decode value: {0}")]
    Decode(String),

    #[error("negative increment {0} on an increment-only counter")]
    NegativeIncrement(String),

    #[error("CRDT type {crdt:?} does not support field kind {kind:?}")]
    KindMismatch { crdt: CrdtType, kind: FieldKind },

    #[error("value {value} is not of field kind {kind:?}")]
    InvalidValue { value: String, kind: FieldKind },
}

pub type Result<T> = std::result::Result<T, CrdtError>;
