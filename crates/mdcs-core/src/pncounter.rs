//! Additive counters
//!
//! A counter delta carries an increment; merging adds it to the stored
//! total. Addition commutes, so any arrival order converges, but it is not
//! idempotent: callers must apply each delta exactly once.

use crate::error::{CrdtError, Result};
use crate::value::{CrdtType, FieldKind, FieldValue};

/// Validate an increment for a counter of the given type and kind.
pub fn validate_increment(crdt: CrdtType, kind: FieldKind, increment: &FieldValue) -> Result<()> {
    crdt.check(kind)?;
    increment.check_kind(kind)?;
    let negative = match increment {
        FieldValue::Int(i) => *i < 0,
        FieldValue::Float(f) => *f < 0.0,
        _ => false,
    };
    if negative && crdt == CrdtType::PCounter {
        return Err(CrdtError::NegativeIncrement(increment.to_string()));
    }
    Ok(())
}

/// Add `increment` to `current`. A missing or null current value counts as zero.
pub fn add(kind: FieldKind, current: Option<&FieldValue>, increment: &FieldValue) -> Result<FieldValue> {
    let current = match current {
        None | Some(FieldValue::Null) => zero(kind)?,
        Some(v) => v.clone(),
    };
    if increment.is_null() {
        return Ok(current);
    }
    match (kind, current, increment) {
        (FieldKind::Int, FieldValue::Int(a), FieldValue::Int(b)) => {
            Ok(FieldValue::Int(a.wrapping_add(*b)))
        }
        (FieldKind::Float, FieldValue::Float(a), FieldValue::Float(b)) => Ok(FieldValue::Float(a + b)),
        (kind, _, other) => Err(CrdtError::InvalidValue {
            value: other.to_string(),
            kind,
        }),
    }
}

fn zero(kind: FieldKind) -> Result<FieldValue> {
    match kind {
        FieldKind::Int => Ok(FieldValue::Int(0)),
        FieldKind::Float => Ok(FieldValue::Float(0.0)),
        other => Err(CrdtError::KindMismatch {
            crdt: CrdtType::PNCounter,
            kind: other,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_from_empty() {
        let v = add(FieldKind::Int, None, &FieldValue::Int(5)).unwrap();
        assert_eq!(v, FieldValue::Int(5));
    }

    #[test]
    fn test_add_accumulates() {
        let v = add(FieldKind::Float, Some(&FieldValue::Float(1.5)), &FieldValue::Float(2.0)).unwrap();
        assert_eq!(v, FieldValue::Float(3.5));
    }

    #[test]
    fn test_pcounter_rejects_negative() {
        let err = validate_increment(CrdtType::PCounter, FieldKind::Int, &FieldValue::Int(-1));
        assert!(matches!(err, Err(CrdtError::NegativeIncrement(_))));
        assert!(validate_increment(CrdtType::PNCounter, FieldKind::Int, &FieldValue::Int(-1)).is_ok());
    }

    #[test]
    fn test_counter_rejects_string_kind() {
        let err = validate_increment(CrdtType::PNCounter, FieldKind::String, &FieldValue::from("x"));
        assert!(matches!(err, Err(CrdtError::KindMismatch { .. })));
    }

    #[test]
    fn test_mismatched_increment_type() {
        let err = add(FieldKind::Int, Some(&FieldValue::Int(1)), &FieldValue::Float(1.0));
        assert!(matches!(err, Err(CrdtError::InvalidValue { .. })));
    }
}
