//! # mdcs-store
//!
//! Ordered transactional key-value storage for the Carnelia document store.
//!
//! The rest of the workspace treats storage as an opaque collaborator with
//! four primitives (get, set, delete, prefix-iterate), success callbacks and
//! commit/discard. Commit fails with [`StoreError::Conflict`] when another
//! transaction invalidated something this one read or wrote.
//!
//! [`MemoryStore`] is an optimistic, in-process implementation used by the
//! replicas in tests and in the demo binary.
//!
//! ## Example
//!
//! ```rust
//! use mdcs_store::{Datastore, MemoryStore};
//!
//! let store = MemoryStore::new();
//! let mut txn = store.new_txn();
//! txn.set(b"/k", b"v".to_vec()).unwrap();
//! txn.commit().unwrap();
//!
//! let mut txn = store.new_txn();
//! assert_eq!(txn.get(b"/k").unwrap(), Some(b"v".to_vec()));
//! ```

mod datastore;
mod error;
pub mod keys;
mod memory;

pub use datastore::{Datastore, SuccessCallback, Transaction};
pub use error::{Result, StoreError};
pub use keys::{DataStoreKey, FieldKey, HeadStoreKey, IndexKey};
pub use memory::{MemoryStore, MemoryTxn};
