//! Merkle clock: block creation and head-set bookkeeping for one namespace.
//!
//! The clock only deals with the DAG side of a change. Applying the delta
//! to stored CRDT state is the caller's job, done in the same transaction.

use crate::block::{Block, DagLink, Delta};
use crate::error::Result;
use crate::hash::Cid;
use crate::headset::HeadSet;
use crate::signature::{sign_block, Identity};
use crate::store::BlockStore;
use mdcs_store::{HeadStoreKey, Transaction};
use tracing::trace;

/// A newly written block.
#[derive(Clone, Debug, PartialEq)]
pub struct ClockEntry {
    pub cid: Cid,
    pub block: Block,
    /// Encoded bytes, as stored.
    pub bytes: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct MerkleClock {
    headset: HeadSet,
}

impl MerkleClock {
    pub fn new(key: HeadStoreKey) -> Self {
        Self {
            headset: HeadSet::new(key),
        }
    }

    pub fn headset(&self) -> &HeadSet {
        &self.headset
    }

    /// Store `delta` as a block on top of the current heads and make it the
    /// only head. The delta's priority is overwritten with the next height.
    pub fn add_delta(
        &self,
        txn: &mut dyn Transaction,
        mut delta: Delta,
        links: Vec<DagLink>,
        signer: Option<&Identity>,
    ) -> Result<ClockEntry> {
        let (heads, max_priority) = self.headset.list(txn)?;
        delta.priority = max_priority + 1;

        let mut block = Block::new(delta, links, heads.clone());
        if let Some(identity) = signer {
            block = sign_block(txn, block, identity)?;
        }
        let (cid, bytes) = txn.put_block(&block)?;

        self.headset.replace(txn, &heads, &cid, block.priority())?;
        self.headset.mark_merged(txn, &cid)?;
        trace!(cid = %cid.short(), priority = block.priority(), "added block");

        Ok(ClockEntry { cid, block, bytes })
    }

    /// Record a replayed block. Each `_head` parent that is currently a
    /// head is replaced by `cid`; if none is, `cid` joins the heads.
    pub fn process_block(&self, txn: &mut dyn Transaction, cid: &Cid, block: &Block) -> Result<()> {
        let mut replaced = Vec::new();
        for parent in block.heads() {
            if self.headset.is_head(txn, &parent)? {
                replaced.push(parent);
            }
        }
        self.headset.replace(txn, &replaced, cid, block.priority())?;
        self.headset.mark_merged(txn, cid)
    }

    pub fn is_merged(&self, txn: &mut dyn Transaction, cid: &Cid) -> Result<bool> {
        self.headset.is_merged(txn, cid)
    }
}
