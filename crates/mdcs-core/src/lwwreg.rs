//! Last-Write-Wins (LWW) Register ordered by causal priority
//!
//! "Latest" is decided by the priority (DAG height) of the block that carried
//! the write, never by wall-clock time. When two writes share a priority the
//! one whose encoded value bytes compare greater wins, so every replica picks
//! the same value from block contents alone.

use crate::lattice::Lattice;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Decide whether an incoming write replaces the current one.
///
/// `current` is `None` when nothing has been written yet.
pub fn wins(incoming: &[u8], priority: u64, current: Option<(&[u8], u64)>) -> bool {
    match current {
        None => true,
        Some((value, current_priority)) => match priority.cmp(&current_priority) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => incoming > value,
        },
    }
}

/// An LWW register holding an encoded value and the priority that wrote it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LwwRegister {
    value: Option<Vec<u8>>,
    priority: u64,
}

impl LwwRegister {
    /// Create an empty register.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a register from stored parts.
    pub fn from_parts(value: Option<Vec<u8>>, priority: u64) -> Self {
        Self { value, priority }
    }

    /// Apply a write; returns whether the register changed.
    pub fn apply(&mut self, value: Vec<u8>, priority: u64) -> bool {
        let current = self.value.as_deref().map(|v| (v, self.priority));
        if wins(&value, priority, current) {
            self.value = Some(value);
            self.priority = priority;
            true
        } else {
            false
        }
    }

    pub fn get(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }

    pub fn priority(&self) -> u64 {
        self.priority
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }
}

impl Lattice for LwwRegister {
    fn bottom() -> Self {
        Self::new()
    }

    fn join(&self, other: &Self) -> Self {
        let mut joined = self.clone();
        if let Some(value) = &other.value {
            joined.apply(value.clone(), other.priority);
        }
        joined
    }
}
