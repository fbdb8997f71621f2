//! Merge dispatch: one task per merge event, serialized per document,
//! retried on transaction conflicts.

use crate::config::DbConfig;
use crate::error::{DbError, Result};
use crate::events::EventBus;
use crate::merge::{merge_key, MergeProcessor};
use crate::schema::CollectionResolver;
use mdcs_merkle::Cid;
use mdcs_store::Datastore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// An inbound request to merge the history ending at a block.
#[derive(Debug)]
pub struct MergeRequest {
    pub cid: Cid,
    pub schema_root: String,
    /// Resolved once with the final outcome.
    pub done: Option<oneshot::Sender<Result<()>>>,
}

impl MergeRequest {
    pub fn new(cid: Cid, schema_root: impl Into<String>) -> Self {
        Self {
            cid,
            schema_root: schema_root.into(),
            done: None,
        }
    }

    /// A request plus the receiver its outcome will be delivered on.
    pub fn with_completion(
        cid: Cid,
        schema_root: impl Into<String>,
    ) -> (Self, oneshot::Receiver<Result<()>>) {
        let (tx, rx) = oneshot::channel();
        let mut request = Self::new(cid, schema_root);
        request.done = Some(tx);
        (request, rx)
    }
}

/// Registry of in-flight merges, by serialization key.
#[derive(Debug, Default)]
pub struct MergeQueue {
    inflight: Mutex<HashMap<String, watch::Sender<bool>>>,
}

impl MergeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other merge holds `key`, then hold it until the
    /// returned guard is dropped.
    pub async fn acquire(self: &Arc<Self>, key: String) -> MergeSlot {
        loop {
            let mut released = {
                let mut inflight = self.inflight.lock();
                match inflight.get(&key) {
                    Some(tx) => tx.subscribe(),
                    None => {
                        let (tx, _) = watch::channel(false);
                        inflight.insert(key.clone(), tx);
                        return MergeSlot {
                            queue: Arc::clone(self),
                            key,
                        };
                    }
                }
            };
            let _ = released.changed().await;
        }
    }

    pub fn is_busy(&self, key: &str) -> bool {
        self.inflight.lock().contains_key(key)
    }
}

/// Exclusive hold on one serialization key.
#[derive(Debug)]
pub struct MergeSlot {
    queue: Arc<MergeQueue>,
    key: String,
}

impl Drop for MergeSlot {
    fn drop(&mut self) {
        if let Some(tx) = self.queue.inflight.lock().remove(&self.key) {
            let _ = tx.send(true);
        }
    }
}

struct DispatcherInner {
    store: Arc<dyn Datastore>,
    resolver: Arc<dyn CollectionResolver>,
    events: EventBus,
    config: Arc<DbConfig>,
    queue: Arc<MergeQueue>,
    shutdown: watch::Receiver<bool>,
}

/// Runs merge requests concurrently across documents.
#[derive(Clone)]
pub struct MergeDispatcher {
    inner: Arc<DispatcherInner>,
}

impl MergeDispatcher {
    pub fn new(
        store: Arc<dyn Datastore>,
        resolver: Arc<dyn CollectionResolver>,
        events: EventBus,
        config: Arc<DbConfig>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                store,
                resolver,
                events,
                config,
                queue: Arc::new(MergeQueue::new()),
                shutdown,
            }),
        }
    }

    pub fn queue(&self) -> &Arc<MergeQueue> {
        &self.inner.queue
    }

    /// Spawn a task for `request`. Must be called within a tokio runtime.
    pub fn dispatch(&self, request: MergeRequest) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.run(request).await })
    }

    /// Dispatch and wait for the outcome.
    pub async fn merge(&self, cid: Cid, schema_root: impl Into<String>) -> Result<()> {
        let (request, done) = MergeRequest::with_completion(cid, schema_root);
        self.dispatch(request);
        done.await.map_err(|_| DbError::Cancelled)?
    }
}

impl DispatcherInner {
    async fn run(self: Arc<Self>, request: MergeRequest) {
        let result = self.execute(&request.cid, &request.schema_root).await;
        if let Err(e) = &result {
            error!(cid = %request.cid, error = %e, "merge failed");
        }
        if let Some(done) = request.done {
            let _ = done.send(result);
        }
    }

    async fn execute(self: &Arc<Self>, cid: &Cid, schema_root: &str) -> Result<()> {
        let collection = self
            .resolver
            .resolve(schema_root)
            .ok_or_else(|| DbError::CollectionNotFound(schema_root.to_string()))?;

        let key = {
            let store = Arc::clone(&self.store);
            let collection = Arc::clone(&collection);
            let cid = *cid;
            tokio::task::spawn_blocking(move || merge_key(store.as_ref(), &collection, &cid))
                .await
                .map_err(|e| DbError::TaskFailed(e.to_string()))??
        };
        let _slot = self.queue.acquire(key.clone()).await;

        let mut attempt = 0;
        loop {
            if *self.shutdown.borrow() {
                return Err(DbError::Cancelled);
            }
            debug!(cid = %cid.short(), key = %key, attempt, "merge attempt");

            let this = Arc::clone(self);
            let collection = Arc::clone(&collection);
            let target = *cid;
            let result = tokio::task::spawn_blocking(move || {
                MergeProcessor::new(
                    this.store.as_ref(),
                    collection,
                    &this.config,
                    this.events.clone(),
                )
                .execute(&target)
            })
            .await
            .map_err(|e| DbError::TaskFailed(e.to_string()))?;

            match result {
                Ok(()) => return Ok(()),
                Err(e) if e.is_conflict() && attempt + 1 < self.config.max_txn_retries => {
                    let backoff = self.config.retry_interval(attempt);
                    warn!(
                        cid = %cid.short(),
                        attempt = attempt + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        "merge conflicted, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
