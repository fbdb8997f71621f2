//! Ancestor walk from an arriving block back to the local frontier.
//!
//! The walk follows `_head` links only. It stops at blocks that are
//! already part of the local history: blocks in the current merge target
//! and blocks carrying a merged marker. When a branch is reached whose
//! priority is below the merge target's height, the target is first moved
//! down to that level so branches of unequal depth are compared at the
//! same height.
//!
//! The result is returned oldest first, ordered by `(priority, cid)`. Since
//! a block's priority is strictly greater than that of each of its `_head`
//! parents, this order is a topological order of the discovered subgraph.

use crate::block::Block;
use crate::error::{MerkleError, Result};
use crate::hash::Cid;
use crate::headset::HeadSet;
use crate::store::BlockStore;
use mdcs_store::Transaction;
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;
use tracing::trace;

/// The local frontier a walk compares against.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MergeTarget {
    heads: BTreeMap<Cid, Block>,
    height: u64,
}

impl MergeTarget {
    /// Load the current heads of `headset`.
    pub fn load(txn: &mut dyn Transaction, headset: &HeadSet) -> Result<Self> {
        let (cids, _) = headset.list(txn)?;
        let mut heads = BTreeMap::new();
        for cid in cids {
            let block = txn.get_block(&cid)?;
            heads.insert(cid, block);
        }
        Ok(Self::from_heads(heads))
    }

    fn from_heads(heads: BTreeMap<Cid, Block>) -> Self {
        let height = heads.values().map(Block::priority).max().unwrap_or(0);
        Self { heads, height }
    }

    pub fn contains(&self, cid: &Cid) -> bool {
        self.heads.contains_key(cid)
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn heads(&self) -> impl Iterator<Item = &Cid> + '_ {
        self.heads.keys()
    }

    /// Replace every head above `below` with its `_head` parents, repeating
    /// until no head is above `below`.
    pub fn descend(&self, txn: &mut dyn Transaction, below: u64) -> Result<Self> {
        let mut heads = self.heads.clone();
        loop {
            let above: Vec<Cid> = heads
                .iter()
                .filter(|(_, block)| block.priority() > below)
                .map(|(cid, _)| *cid)
                .collect();
            if above.is_empty() {
                break;
            }
            for cid in above {
                let Some(block) = heads.remove(&cid) else {
                    continue;
                };
                for parent in block.heads() {
                    let parent_block = txn.get_block(&parent)?;
                    if parent_block.priority() >= block.priority() {
                        return Err(MerkleError::InvalidHead(format!(
                            "{} does not precede {}",
                            parent.short(),
                            cid.short()
                        )));
                    }
                    heads.insert(parent, parent_block);
                }
            }
        }
        Ok(Self::from_heads(heads))
    }
}

/// Collect the blocks reachable from `arriving` that are not yet part of
/// the local history of `headset`.
pub fn collect_blocks(
    txn: &mut dyn Transaction,
    headset: &HeadSet,
    arriving: Cid,
    target: MergeTarget,
) -> Result<Vec<(Cid, Block)>> {
    let mut stack = vec![(arriving, Rc::new(target))];
    let mut processed = HashSet::new();
    let mut found = Vec::new();

    while let Some((cid, mut target)) = stack.pop() {
        if !processed.insert(cid) || target.contains(&cid) || headset.is_merged(txn, &cid)? {
            continue;
        }

        let block = txn.get_block(&cid)?;
        if block.priority() < target.height() {
            target = Rc::new(target.descend(txn, block.priority())?);
            trace!(
                cid = %cid.short(),
                height = target.height(),
                "moved merge target down"
            );
            if target.contains(&cid) {
                continue;
            }
        }

        for parent in block.heads() {
            if parent == cid {
                continue;
            }
            stack.push((parent, Rc::clone(&target)));
        }
        found.push((cid, block));
    }

    found.sort_by(|(a_cid, a), (b_cid, b)| (a.priority(), a_cid).cmp(&(b.priority(), b_cid)));
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Delta, DeltaPayload};
    use mdcs_core::DocumentStatus;
    use mdcs_store::{DataStoreKey, Datastore, FieldKey, MemoryStore};

    fn composite(tag: &str, priority: u64, heads: Vec<Cid>) -> Block {
        Block::new(
            Delta {
                doc_id: format!("bae-{}", tag),
                field_name: String::new(),
                priority,
                schema_version_id: "v1".into(),
                payload: DeltaPayload::Composite {
                    status: DocumentStatus::Active,
                },
            },
            vec![],
            heads,
        )
    }

    fn put(txn: &mut dyn Transaction, block: &Block) -> Cid {
        txn.put_block(block).unwrap().0
    }

    fn headset() -> HeadSet {
        HeadSet::new(DataStoreKey::new(1, "bae-1", FieldKey::Composite).to_head_store_key())
    }

    /// Record `cid` as applied and make it the only head.
    fn apply(txn: &mut dyn Transaction, hs: &HeadSet, cid: Cid, priority: u64) {
        let (old, _) = hs.list(txn).unwrap();
        hs.replace(txn, &old, &cid, priority).unwrap();
        hs.mark_merged(txn, &cid).unwrap();
    }

    #[test]
    fn test_collect_from_empty_frontier() {
        let store = MemoryStore::new();
        let mut txn = store.new_txn();
        let hs = headset();

        let a = put(txn.as_mut(), &composite("a", 1, vec![]));
        let b = put(txn.as_mut(), &composite("b", 2, vec![a]));
        let c = put(txn.as_mut(), &composite("c", 3, vec![b]));

        let target = MergeTarget::load(txn.as_mut(), &hs).unwrap();
        assert_eq!(target.height(), 0);
        let found = collect_blocks(txn.as_mut(), &hs, c, target).unwrap();
        let cids: Vec<Cid> = found.iter().map(|(cid, _)| *cid).collect();
        assert_eq!(cids, vec![a, b, c]);
    }

    #[test]
    fn test_collect_stops_at_frontier() {
        let store = MemoryStore::new();
        let mut txn = store.new_txn();
        let hs = headset();

        let a = put(txn.as_mut(), &composite("a", 1, vec![]));
        apply(txn.as_mut(), &hs, a, 1);
        let b = put(txn.as_mut(), &composite("b", 2, vec![a]));

        let target = MergeTarget::load(txn.as_mut(), &hs).unwrap();
        assert!(target.contains(&a));
        let found = collect_blocks(txn.as_mut(), &hs, b, target).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, b);
    }

    #[test]
    fn test_known_block_yields_nothing() {
        let store = MemoryStore::new();
        let mut txn = store.new_txn();
        let hs = headset();

        let a = put(txn.as_mut(), &composite("a", 1, vec![]));
        let b = put(txn.as_mut(), &composite("b", 2, vec![a]));
        apply(txn.as_mut(), &hs, a, 1);
        apply(txn.as_mut(), &hs, b, 2);

        let target = MergeTarget::load(txn.as_mut(), &hs).unwrap();
        assert!(collect_blocks(txn.as_mut(), &hs, a, target.clone())
            .unwrap()
            .is_empty());
        assert!(collect_blocks(txn.as_mut(), &hs, b, target)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_shorter_branch_descends_target() {
        let store = MemoryStore::new();
        let mut txn = store.new_txn();
        let hs = headset();

        // local: root -> l1 -> l2 -> l3, remote: root -> r1
        let root = put(txn.as_mut(), &composite("root", 1, vec![]));
        let l1 = put(txn.as_mut(), &composite("l1", 2, vec![root]));
        let l2 = put(txn.as_mut(), &composite("l2", 3, vec![l1]));
        let l3 = put(txn.as_mut(), &composite("l3", 4, vec![l2]));
        for (cid, p) in [(root, 1), (l1, 2), (l2, 3), (l3, 4)] {
            apply(txn.as_mut(), &hs, cid, p);
        }
        let r1 = put(txn.as_mut(), &composite("r1", 2, vec![root]));

        let target = MergeTarget::load(txn.as_mut(), &hs).unwrap();
        assert_eq!(target.height(), 4);

        let lowered = target.descend(txn.as_mut(), 2).unwrap();
        assert_eq!(lowered.heads().copied().collect::<Vec<_>>(), vec![l1]);
        assert_eq!(lowered.height(), 2);

        let found = collect_blocks(txn.as_mut(), &hs, r1, target).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, r1);
    }

    #[test]
    fn test_diamond_visited_once() {
        let store = MemoryStore::new();
        let mut txn = store.new_txn();
        let hs = headset();

        let root = put(txn.as_mut(), &composite("root", 1, vec![]));
        let left = put(txn.as_mut(), &composite("left", 2, vec![root]));
        let right = put(txn.as_mut(), &composite("right", 2, vec![root]));
        let join = put(txn.as_mut(), &composite("join", 3, vec![left, right]));

        let target = MergeTarget::load(txn.as_mut(), &hs).unwrap();
        let found = collect_blocks(txn.as_mut(), &hs, join, target).unwrap();
        assert_eq!(found.len(), 4);
        assert_eq!(found[0].0, root);
        assert_eq!(found[3].0, join);
        let middle: HashSet<Cid> = found[1..3].iter().map(|(cid, _)| *cid).collect();
        assert_eq!(middle, HashSet::from([left, right]));
    }

    #[test]
    fn test_missing_ancestor_is_error() {
        let store = MemoryStore::new();
        let mut txn = store.new_txn();
        let hs = headset();

        let ghost = Cid::of(b"never stored");
        let b = put(txn.as_mut(), &composite("b", 2, vec![ghost]));
        let target = MergeTarget::load(txn.as_mut(), &hs).unwrap();
        assert_eq!(
            collect_blocks(txn.as_mut(), &hs, b, target),
            Err(MerkleError::BlockNotFound(ghost))
        );
    }
}
