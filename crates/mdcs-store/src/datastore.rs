//! Storage traits consumed by the DAG and document layers.

use crate::error::Result;

/// Callback run once after a transaction commits successfully.
pub type SuccessCallback = Box<dyn FnOnce() + Send + 'static>;

/// A handle that can open transactions.
pub trait Datastore: Send + Sync + 'static {
    /// Open a new read-write transaction.
    fn new_txn(&self) -> Box<dyn Transaction>;
}

/// An ordered key-value transaction.
///
/// Reads observe the transaction's own pending writes. Nothing written is
/// visible to other transactions until [`commit`](Transaction::commit)
/// succeeds. Dropping or discarding a transaction rolls everything back and
/// drops its success callbacks without running them.
pub trait Transaction: Send {
    /// Get the value stored under `key`.
    fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Check whether `key` exists.
    fn has(&mut self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Set `key` to `value`.
    fn set(&mut self, key: &[u8], value: Vec<u8>) -> Result<()>;

    /// Delete `key`. Deleting a missing key is not an error.
    fn delete(&mut self, key: &[u8]) -> Result<()>;

    /// All entries whose key starts with `prefix`, in ascending key order.
    fn iter_prefix(&mut self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Register a callback to run after a successful commit.
    fn on_success(&mut self, callback: SuccessCallback);

    /// Atomically apply all writes.
    ///
    /// Fails with [`StoreError::Conflict`](crate::StoreError::Conflict) when a
    /// concurrent commit touched a key this transaction read, scanned or wrote.
    fn commit(self: Box<Self>) -> Result<()>;

    /// Abandon the transaction.
    fn discard(self: Box<Self>);
}
