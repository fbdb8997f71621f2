//! # mdcs-merkle
//!
//! The Merkle DAG layer of the Carnelia document store.
//!
//! This crate provides:
//! - Content-addressed blocks carrying one CRDT delta each
//! - Block storage on top of any [`mdcs_store::Transaction`]
//! - Head sets tracking the causal tips of each DAG namespace
//! - The ancestor walk used to find which blocks of an arriving history
//!   are not yet applied locally
//! - Detached Ed25519 block signatures
//! - [`MerkleClock`], which writes blocks and maintains head sets
//!
//! ## Namespaces
//!
//! Every field of every document has its own DAG, and so does the
//! document's composite (document-level) history. Branchable collections
//! add one more DAG for the collection as a whole. `_head` links never
//! cross namespaces. A block's priority is one more than the highest
//! priority among its `_head` parents.
//!
//! ## Example
//!
//! ```rust
//! use mdcs_merkle::{Block, BlockStore, Delta, DeltaPayload, HeadSet};
//! use mdcs_store::{DataStoreKey, Datastore, FieldKey, MemoryStore};
//!
//! let store = MemoryStore::new();
//! let mut txn = store.new_txn();
//!
//! let key = DataStoreKey::new(1, "bae-1", FieldKey::Field(1));
//! let heads = HeadSet::new(key.to_head_store_key());
//!
//! let block = Block::new(
//!     Delta {
//!         doc_id: "bae-1".into(),
//!         field_name: "name".into(),
//!         priority: 1,
//!         schema_version_id: "v1".into(),
//!         payload: DeltaPayload::LwwRegister { data: b"\"Alice\"".to_vec() },
//!     },
//!     vec![],
//!     vec![],
//! );
//! let (cid, _) = txn.put_block(&block).unwrap();
//! heads.write(txn.as_mut(), &cid, 1).unwrap();
//!
//! assert_eq!(heads.list(txn.as_mut()).unwrap(), (vec![cid], 1));
//! ```

mod block;
mod clock;
mod error;
mod hash;
mod headset;
mod signature;
mod store;
mod walk;

pub use block::{Block, DagLink, Delta, DeltaPayload, HEAD_LINK, SIGNATURE_LINK};
pub use clock::{ClockEntry, MerkleClock};
pub use error::{MerkleError, Result};
pub use hash::{Cid, Hasher};
pub use headset::HeadSet;
pub use signature::{sign_block, verify_block, Identity, SignatureBlock, SignatureKind};
pub use store::BlockStore;
pub use walk::{collect_blocks, MergeTarget};
