//! Head sets: the current causal tips of one DAG namespace.
//!
//! Each member is stored as its own key under the head-set prefix with the
//! member's priority as value, so membership tests are point reads and
//! listing is one prefix scan. All mutation happens through the caller's
//! transaction and is rolled back with it.

use crate::error::{MerkleError, Result};
use crate::hash::Cid;
use mdcs_store::{HeadStoreKey, Transaction};

/// Head set of one (collection, document, field) namespace, or of a whole
/// branchable collection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeadSet {
    key: HeadStoreKey,
}

impl HeadSet {
    pub fn new(key: HeadStoreKey) -> Self {
        Self { key }
    }

    pub fn key(&self) -> &HeadStoreKey {
        &self.key
    }

    /// Current heads sorted by CID, plus the highest priority among them
    /// (0 when the set is empty).
    pub fn list(&self, txn: &mut dyn Transaction) -> Result<(Vec<Cid>, u64)> {
        let prefix = self.key.prefix();
        let mut heads = Vec::new();
        let mut max_priority = 0;

        for (key, value) in txn.iter_prefix(&prefix)? {
            let suffix = String::from_utf8_lossy(&key[prefix.len()..]).into_owned();
            let cid = Cid::from_hex(&suffix).ok_or(MerkleError::InvalidHead(suffix))?;
            max_priority = max_priority.max(decode_priority(&value)?);
            heads.push(cid);
        }

        heads.sort();
        Ok((heads, max_priority))
    }

    pub fn is_head(&self, txn: &mut dyn Transaction, cid: &Cid) -> Result<bool> {
        Ok(txn.has(&self.key.with_cid(&cid.to_hex()))?)
    }

    /// Add `cid` as a head.
    pub fn write(&self, txn: &mut dyn Transaction, cid: &Cid, priority: u64) -> Result<()> {
        txn.set(
            &self.key.with_cid(&cid.to_hex()),
            priority.to_be_bytes().to_vec(),
        )?;
        Ok(())
    }

    /// Remove every entry of `old` and insert `new`.
    pub fn replace(
        &self,
        txn: &mut dyn Transaction,
        old: &[Cid],
        new: &Cid,
        priority: u64,
    ) -> Result<()> {
        for cid in old {
            txn.delete(&self.key.with_cid(&cid.to_hex()))?;
        }
        self.write(txn, new, priority)
    }

    /// Whether `cid` has already been applied in this namespace's scope.
    pub fn is_merged(&self, txn: &mut dyn Transaction, cid: &Cid) -> Result<bool> {
        Ok(txn.has(&self.key.merged_marker(&cid.to_hex()))?)
    }

    pub fn mark_merged(&self, txn: &mut dyn Transaction, cid: &Cid) -> Result<()> {
        txn.set(&self.key.merged_marker(&cid.to_hex()), Vec::new())?;
        Ok(())
    }
}

fn decode_priority(bytes: &[u8]) -> Result<u64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| MerkleError::InvalidHead(format!("priority of {} bytes", bytes.len())))?;
    Ok(u64::from_be_bytes(raw))
}
