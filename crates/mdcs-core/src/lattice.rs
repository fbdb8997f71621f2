//! Mergeable field state.
//!
//! Stored field values are folded together with [`Lattice::join`]. A join
//! may see the same state twice and in any order across replicas, so it
//! has to be order-insensitive and repeat-safe for replicas that saw the
//! same blocks to store the same value.

/// State stored for a field and combined on every merge.
pub trait Lattice: Clone + PartialEq {
    /// The state of a field nothing has been written to.
    fn bottom() -> Self;

    /// Combine two states into the smallest state covering both.
    fn join(&self, other: &Self) -> Self;

    /// Whether `other` already covers `self`.
    fn leq(&self, other: &Self) -> bool {
        self.join(other) == *other
    }
}
