//! Content-addressed block storage on top of a transaction.
//!
//! Blocks live under `/b/<cid>`. Because the key is derived from the
//! content, writing a block that already exists is a no-op and no separate
//! index is needed to detect duplicates.

use crate::block::Block;
use crate::error::{MerkleError, Result};
use crate::hash::Cid;
use mdcs_store::keys::block_key;
use mdcs_store::Transaction;

/// Block storage operations available on every transaction.
pub trait BlockStore {
    /// Store raw encoded bytes, returning their CID.
    fn put_raw_block(&mut self, bytes: Vec<u8>) -> Result<Cid>;

    /// Load raw bytes, verifying they hash to `cid`.
    fn get_raw_block(&mut self, cid: &Cid) -> Result<Vec<u8>>;

    fn has_block(&mut self, cid: &Cid) -> Result<bool>;

    /// Encode and store a block, returning its CID and encoded bytes.
    fn put_block(&mut self, block: &Block) -> Result<(Cid, Vec<u8>)> {
        let bytes = block.encode()?;
        let cid = self.put_raw_block(bytes.clone())?;
        Ok((cid, bytes))
    }

    /// Load and decode a block.
    fn get_block(&mut self, cid: &Cid) -> Result<Block> {
        let bytes = self.get_raw_block(cid)?;
        Block::decode(*cid, &bytes)
    }
}

impl<T: Transaction + ?Sized> BlockStore for T {
    fn put_raw_block(&mut self, bytes: Vec<u8>) -> Result<Cid> {
        let cid = Cid::of(&bytes);
        let key = block_key(&cid.to_hex());
        if !self.has(&key)? {
            self.set(&key, bytes)?;
        }
        Ok(cid)
    }

    fn get_raw_block(&mut self, cid: &Cid) -> Result<Vec<u8>> {
        let bytes = self
            .get(&block_key(&cid.to_hex()))?
            .ok_or(MerkleError::BlockNotFound(*cid))?;
        if Cid::of(&bytes) != *cid {
            return Err(MerkleError::CorruptBlock(*cid));
        }
        Ok(bytes)
    }

    fn has_block(&mut self, cid: &Cid) -> Result<bool> {
        Ok(self.has(&block_key(&cid.to_hex()))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Delta, DeltaPayload};
    use mdcs_store::{Datastore, MemoryStore};

    fn block(priority: u64) -> Block {
        Block::new(
            Delta {
                doc_id: "bae-1".into(),
                field_name: "age".into(),
                priority,
                schema_version_id: "v1".into(),
                payload: DeltaPayload::LwwRegister { data: vec![1] },
            },
            vec![],
            vec![],
        )
    }

    #[test]
    fn test_put_get_roundtrip() {
        let store = MemoryStore::new();
        let mut txn = store.new_txn();
        let b = block(1);
        let (cid, bytes) = txn.put_block(&b).unwrap();
        assert_eq!(cid, b.cid().unwrap());
        assert_eq!(txn.get_raw_block(&cid).unwrap(), bytes);
        assert_eq!(txn.get_block(&cid).unwrap(), b);
        assert!(txn.has_block(&cid).unwrap());
    }

    #[test]
    fn test_duplicate_put_is_noop() {
        let store = MemoryStore::new();
        let mut txn = store.new_txn();
        let (a, _) = txn.put_block(&block(1)).unwrap();
        let (b, _) = txn.put_block(&block(1)).unwrap();
        assert_eq!(a, b);
        txn.commit().unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_missing_block() {
        let store = MemoryStore::new();
        let mut txn = store.new_txn();
        let cid = Cid::of(b"nothing");
        assert_eq!(txn.get_block(&cid), Err(MerkleError::BlockNotFound(cid)));
    }

    #[test]
    fn test_corrupt_block_detected() {
        let store = MemoryStore::new();
        let mut txn = store.new_txn();
        let cid = Cid::of(b"original");
        txn.set(&block_key(&cid.to_hex()), b"tampered".to_vec())
            .unwrap();
        assert_eq!(txn.get_raw_block(&cid), Err(MerkleError::CorruptBlock(cid)));
    }
}
