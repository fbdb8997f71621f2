//! # mdcs-db
//!
//! Replicated document store built on the Merkle clock in `mdcs-merkle`.
//!
//! Every document is a composite CRDT whose fields are themselves CRDTs
//! (last-writer-wins registers and counters). Each write appends one block per
//! changed field plus a composite block linking them, and advances the heads
//! of every DAG it touched. Peers exchange blocks and ask their local [`Db`]
//! to merge them: the [`MergeDispatcher`] serializes merges per document and
//! retries on transaction conflicts, and the [`MergeProcessor`] walks the
//! unknown part of the history back to the local frontier and replays it in
//! priority order. Secondary indexes follow every projection change.
//!
//! ## Example
//!
//! ```rust
//! use mdcs_core::{CrdtType, FieldKind, FieldValue};
//! use mdcs_db::{CollectionDefinition, Db, DbConfig};
//! use mdcs_store::MemoryStore;
//!
//! let db = Db::new(MemoryStore::new(), DbConfig::default()).unwrap();
//! let users = db
//!     .add_collection(
//!         CollectionDefinition::new(1, "users")
//!             .with_field("name", FieldKind::String, CrdtType::LwwRegister)
//!             .with_field("age", FieldKind::Int, CrdtType::LwwRegister)
//!             .with_index("name"),
//!     )
//!     .unwrap();
//!
//! let mut alice = users
//!     .new_document([("name", FieldValue::from("Alice")), ("age", FieldValue::Int(30))])
//!     .unwrap();
//! users.create(&mut alice).unwrap();
//!
//! let found = users.query("name", &FieldValue::from("Alice")).unwrap();
//! assert_eq!(found.len(), 1);
//! ```

pub mod collection;
pub mod config;
pub mod crdt;
pub mod db;
pub mod dispatcher;
pub mod document;
pub mod error;
pub mod events;
pub mod index;
pub mod merge;
pub mod schema;

pub use collection::Collection;
pub use config::{DbConfig, DbConfigBuilder};
pub use crdt::FieldCrdt;
pub use db::Db;
pub use dispatcher::{MergeDispatcher, MergeQueue, MergeRequest, MergeSlot};
pub use document::{DocId, Document};
pub use error::{DbError, Result};
pub use events::{Event, EventBus, MergeCompleteEvent, UpdateEvent};
pub use index::{CollectionIndex, FieldIndex};
pub use merge::{merge_key, MergeProcessor};
pub use schema::{
    CollectionDefinition, CollectionResolver, FieldDefinition, IndexDefinition, SchemaRegistry,
};
