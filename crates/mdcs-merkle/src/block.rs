//! Blocks, deltas and links.
//!
//! A block pairs one CRDT delta with named links to other blocks:
//! - `_head` links point at the previous tips of the same DAG namespace
//! - links named after a field (or a document ID, for collection blocks)
//!   point at the blocks bundled into this causal unit
//! - an optional `_sig` link points at a detached signature block
//!
//! The block's CID is the hash of its encoding, so any change to the delta
//! or its links yields a different identifier.

use crate::error::{MerkleError, Result};
use crate::hash::Cid;
use mdcs_core::DocumentStatus;
use serde::{Deserialize, Serialize};

/// Name of links to previous blocks of the same namespace.
pub const HEAD_LINK: &str = "_head";

/// Name of the link to a detached signature block.
pub const SIGNATURE_LINK: &str = "_sig";

/// The CRDT-specific part of a delta.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum DeltaPayload {
    /// Encoded field value for a last-writer-wins register.
    LwwRegister { data: Vec<u8> },
    /// Encoded increment for a counter. The nonce keeps equal increments
    /// from collapsing into one block.
    Counter { data: Vec<u8>, nonce: i64 },
    /// Document-level change marker, or a tombstone.
    Composite { status: DocumentStatus },
    /// Collection-level change marker for branchable collections.
    Collection,
}

/// A single causal change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    /// Empty for collection blocks.
    pub doc_id: String,
    /// Empty for composite and collection blocks.
    pub field_name: String,
    /// Height of the block within its namespace.
    pub priority: u64,
    pub schema_version_id: String,
    pub payload: DeltaPayload,
}

impl Delta {
    pub fn is_composite(&self) -> bool {
        matches!(self.payload, DeltaPayload::Composite { .. })
    }

    pub fn is_collection(&self) -> bool {
        matches!(self.payload, DeltaPayload::Collection)
    }
}

/// A named reference to another block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagLink {
    pub name: String,
    pub cid: Cid,
}

impl DagLink {
    pub fn new(name: impl Into<String>, cid: Cid) -> Self {
        Self {
            name: name.into(),
            cid,
        }
    }

    pub fn head(cid: Cid) -> Self {
        Self::new(HEAD_LINK, cid)
    }

    pub fn is_head(&self) -> bool {
        self.name == HEAD_LINK
    }

    pub fn is_signature(&self) -> bool {
        self.name == SIGNATURE_LINK
    }
}

/// An immutable, content-addressed DAG node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub delta: Delta,
    pub links: Vec<DagLink>,
}

impl Block {
    /// Build a block. Heads and links are sorted by CID so the same inputs
    /// always encode to the same bytes.
    pub fn new(delta: Delta, mut links: Vec<DagLink>, mut heads: Vec<Cid>) -> Self {
        heads.sort();
        heads.dedup();
        links.sort_by(|a, b| a.cid.cmp(&b.cid).then_with(|| a.name.cmp(&b.name)));

        let mut all = Vec::with_capacity(heads.len() + links.len());
        all.extend(heads.into_iter().map(DagLink::head));
        all.extend(links);
        Block { delta, links: all }
    }

    pub fn priority(&self) -> u64 {
        self.delta.priority
    }

    /// CIDs of previous blocks in this block's namespace.
    pub fn heads(&self) -> impl Iterator<Item = Cid> + '_ {
        self.links.iter().filter(|l| l.is_head()).map(|l| l.cid)
    }

    /// Links to the blocks bundled into this one.
    pub fn content_links(&self) -> impl Iterator<Item = &DagLink> + '_ {
        self.links.iter().filter(|l| !l.is_head() && !l.is_signature())
    }

    pub fn signature(&self) -> Option<Cid> {
        self.links.iter().find(|l| l.is_signature()).map(|l| l.cid)
    }

    pub fn link_by_name(&self, name: &str) -> Option<Cid> {
        self.links.iter().find(|l| l.name == name).map(|l| l.cid)
    }

    /// Return the block with a signature link attached.
    pub fn with_signature(mut self, signature: Cid) -> Self {
        self.links.retain(|l| !l.is_signature());
        self.links.push(DagLink::new(SIGNATURE_LINK, signature));
        self
    }

    /// The block as it was before signing.
    pub fn without_signature(&self) -> Self {
        let mut unsigned = self.clone();
        unsigned.links.retain(|l| !l.is_signature());
        unsigned
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| MerkleError::Encode(e.to_string()))
    }

    /// Decode bytes stored under `cid`.
    pub fn decode(cid: Cid, bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| MerkleError::Decode {
            cid,
            reason: e.to_string(),
        })
    }

    /// Compute this block's CID.
    pub fn cid(&self) -> Result<Cid> {
        Ok(Cid::of(&self.encode()?))
    }
}
