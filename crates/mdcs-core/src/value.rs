//! Scalar field values, field kinds and the CRDT types that can hold them.

use crate::error::{CrdtError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The declared kind of a collection field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    Bool,
    Int,
    Float,
    String,
}

/// The CRDT used to store a field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrdtType {
    /// Last-writer-wins by causal priority.
    #[default]
    LwwRegister,
    /// Increment-only counter.
    PCounter,
    /// Increment/decrement counter.
    PNCounter,
}

impl CrdtType {
    /// Whether a field of `kind` can be stored with this CRDT.
    pub fn supports(&self, kind: FieldKind) -> bool {
        match self {
            CrdtType::LwwRegister => true,
            CrdtType::PCounter | CrdtType::PNCounter => {
                matches!(kind, FieldKind::Int | FieldKind::Float)
            }
        }
    }

    /// Fail with [`CrdtError::KindMismatch`] when `kind` is unsupported.
    pub fn check(&self, kind: FieldKind) -> Result<()> {
        if self.supports(kind) {
            Ok(())
        } else {
            Err(CrdtError::KindMismatch { crdt: *self, kind })
        }
    }

    pub fn is_counter(&self) -> bool {
        matches!(self, CrdtType::PCounter | CrdtType::PNCounter)
    }
}

/// A scalar document value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl FieldValue {
    /// Canonical byte encoding. Equal values always encode to equal bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| CrdtError::Encode(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| CrdtError::Decode(e.to_string()))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Whether this value may be stored in a field of `kind`. Null fits any kind.
    pub fn matches_kind(&self, kind: FieldKind) -> bool {
        matches!(
            (self, kind),
            (FieldValue::Null, _)
                | (FieldValue::Bool(_), FieldKind::Bool)
                | (FieldValue::Int(_), FieldKind::Int)
                | (FieldValue::Float(_), FieldKind::Float)
                | (FieldValue::String(_), FieldKind::String)
        )
    }

    /// Fail with [`CrdtError::InvalidValue`] when the value does not fit `kind`.
    pub fn check_kind(&self, kind: FieldKind) -> Result<()> {
        if self.matches_kind(kind) {
            Ok(())
        } else {
            Err(CrdtError::InvalidValue {
                value: self.to_string(),
                kind,
            })
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => f.write_str("null"),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Float(x) => write!(f, "{}", x),
            FieldValue::String(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}
