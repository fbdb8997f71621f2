//! Optimistic in-memory implementation of [`Datastore`].
//!
//! Every committed key carries the sequence number of the commit that last
//! touched it (deletes included). A transaction remembers the sequence it
//! started at plus every key it read, wrote or scanned; commit validates
//! that none of those moved past the start sequence.

use crate::datastore::{Datastore, SuccessCallback, Transaction};
use crate::error::{Result, StoreError};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::trace;

#[derive(Debug, Default)]
struct Inner {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    versions: BTreeMap<Vec<u8>, u64>,
    seq: u64,
}

impl Inner {
    fn moved_since(&self, key: &[u8], start: u64) -> bool {
        self.versions.get(key).is_some_and(|v| *v > start)
    }

    fn prefix_moved_since(&self, prefix: &[u8], start: u64) -> bool {
        self.versions
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .any(|(_, v)| *v > start)
    }
}

/// Shared in-memory ordered store.
///
/// Cloning is cheap and yields a handle to the same data.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed keys.
    pub fn len(&self) -> usize {
        self.inner.read().data.len()
    }

    /// Check if the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Open a transaction with the concrete type.
    pub fn begin(&self) -> MemoryTxn {
        MemoryTxn {
            inner: Arc::clone(&self.inner),
            start: self.inner.read().seq,
            reads: BTreeSet::new(),
            scans: Vec::new(),
            pending: BTreeMap::new(),
            callbacks: Vec::new(),
        }
    }
}

impl Datastore for MemoryStore {
    fn new_txn(&self) -> Box<dyn Transaction> {
        Box::new(self.begin())
    }
}

/// A transaction over a [`MemoryStore`].
pub struct MemoryTxn {
    inner: Arc<RwLock<Inner>>,
    start: u64,
    reads: BTreeSet<Vec<u8>>,
    scans: Vec<Vec<u8>>,
    /// `None` marks a pending delete.
    pending: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    callbacks: Vec<SuccessCallback>,
}

impl Transaction for MemoryTxn {
    fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(pending) = self.pending.get(key) {
            return Ok(pending.clone());
        }
        self.reads.insert(key.to_vec());
        Ok(self.inner.read().data.get(key).cloned())
    }

    fn set(&mut self, key: &[u8], value: Vec<u8>) -> Result<()> {
        self.pending.insert(key.to_vec(), Some(value));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.pending.insert(key.to_vec(), None);
        Ok(())
    }

    fn iter_prefix(&mut self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.scans.push(prefix.to_vec());

        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = self
            .inner
            .read()
            .data
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        for (key, value) in self
            .pending
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
        {
            match value {
                Some(v) => {
                    merged.insert(key.clone(), v.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }

        Ok(merged.into_iter().collect())
    }

    fn on_success(&mut self, callback: SuccessCallback) {
        self.callbacks.push(callback);
    }

    fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTxn {
            inner,
            start,
            reads,
            scans,
            pending,
            callbacks,
        } = *self;

        {
            let mut guard = inner.write();

            let conflicted = reads.iter().any(|k| guard.moved_since(k, start))
                || pending.keys().any(|k| guard.moved_since(k, start))
                || scans.iter().any(|p| guard.prefix_moved_since(p, start));
            if conflicted {
                trace!(start, current = guard.seq, "commit rejected");
                return Err(StoreError::Conflict);
            }

            guard.seq += 1;
            let seq = guard.seq;
            for (key, value) in pending {
                match value {
                    Some(v) => {
                        guard.data.insert(key.clone(), v);
                    }
                    None => {
                        guard.data.remove(&key);
                    }
                }
                guard.versions.insert(key, seq);
            }
        }

        for callback in callbacks {
            callback();
        }
        Ok(())
    }

    fn discard(self: Box<Self>) {}
}
