//! # mdcs-core
//!
//! Pure CRDT semantics used by the Carnelia document store.
//!
//! Nothing in here touches storage: the types describe *how* two states or
//! a state and a delta combine. The `mdcs-db` crate binds them to keys in a
//! transaction.
//!
//! - [`lattice`]: the join-semilattice trait every merge rule satisfies
//! - [`value`]: scalar field values, field kinds and CRDT types
//! - [`lwwreg`]: last-writer-wins register ordered by causal priority
//! - [`pncounter`]: additive counters (increment-only and increment/decrement)
//! - [`status`]: document existence as a remove-wins status lattice

pub mod error;
pub mod lattice;
pub mod lwwreg;
pub mod pncounter;
pub mod status;
pub mod value;

pub use error::{CrdtError, Result};
pub use lattice::Lattice;
pub use lwwreg::LwwRegister;
pub use status::DocumentStatus;
pub use value::{CrdtType, FieldKind, FieldValue};
