//! Merge dispatch tests: conflict retry, shutdown and concurrent requests.

use mdcs_core::{CrdtType, FieldKind, FieldValue};
use mdcs_db::{CollectionDefinition, Db, DbConfig, DbConfigBuilder, DbError, DocId, MergeRequest};
use mdcs_merkle::Cid;
use mdcs_store::{Datastore, MemoryStore, StoreError, SuccessCallback, Transaction};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A store whose next `failures` commits fail with a conflict.
#[derive(Clone, Default)]
struct FlakyStore {
    inner: MemoryStore,
    failures: Arc<AtomicUsize>,
    commits: Arc<AtomicUsize>,
}

impl FlakyStore {
    fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
        self.commits.store(0, Ordering::SeqCst);
    }
}

impl Datastore for FlakyStore {
    fn new_txn(&self) -> Box<dyn Transaction> {
        Box::new(FlakyTxn {
            inner: self.inner.new_txn(),
            failures: Arc::clone(&self.failures),
            commits: Arc::clone(&self.commits),
        })
    }
}

struct FlakyTxn {
    inner: Box<dyn Transaction>,
    failures: Arc<AtomicUsize>,
    commits: Arc<AtomicUsize>,
}

impl Transaction for FlakyTxn {
    fn get(&mut self, key: &[u8]) -> mdcs_store::Result<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn set(&mut self, key: &[u8], value: Vec<u8>) -> mdcs_store::Result<()> {
        self.inner.set(key, value)
    }

    fn delete(&mut self, key: &[u8]) -> mdcs_store::Result<()> {
        self.inner.delete(key)
    }

    fn iter_prefix(&mut self, prefix: &[u8]) -> mdcs_store::Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.inner.iter_prefix(prefix)
    }

    fn on_success(&mut self, callback: SuccessCallback) {
        self.inner.on_success(callback)
    }

    fn commit(self: Box<Self>) -> mdcs_store::Result<()> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            self.inner.discard();
            return Err(StoreError::Conflict);
        }
        self.inner.commit()
    }

    fn discard(self: Box<Self>) {
        self.inner.discard()
    }
}

fn users() -> CollectionDefinition {
    CollectionDefinition::new(1, "User")
        .with_field("name", FieldKind::String, CrdtType::LwwRegister)
        .with_field("age", FieldKind::Int, CrdtType::LwwRegister)
}

/// A replica holding Alice's history, her ID and the composite CID to merge.
fn source() -> (Db, DocId, Cid) {
    let db = Db::new(MemoryStore::new(), DbConfig::default()).unwrap();
    let users = db.add_collection(users()).unwrap();
    let mut alice = users
        .new_document([("name", FieldValue::from("Alice")), ("age", FieldValue::Int(30))])
        .unwrap();
    let cid = users.create(&mut alice).unwrap();
    (db, alice.id().clone(), cid)
}

fn deliver(from: &Db, to: &Db) {
    for (_, bytes) in from.blocks().unwrap() {
        to.put_block(bytes).unwrap();
    }
}

fn fast_retries(max: usize) -> DbConfig {
    DbConfigBuilder::new()
        .max_txn_retries(max)
        .retry_intervals(vec![1])
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_conflict_is_retried_once() {
    let (a, id, cid) = source();
    let store = FlakyStore::default();
    let b = Db::new(store.clone(), fast_retries(5)).unwrap();
    let users = b.add_collection(users()).unwrap();
    deliver(&a, &b);

    store.fail_next(1);
    b.merge(cid, users.schema_root()).await.unwrap();

    assert_eq!(store.commits.load(Ordering::SeqCst), 2);
    assert_eq!(users.heads(&id).unwrap(), vec![cid]);
    assert!(users.get(&id).unwrap().is_some());
}

#[tokio::test]
async fn test_retried_merge_keeps_index_consistent() {
    let a = Db::new(MemoryStore::new(), DbConfig::default()).unwrap();
    let users_a = a.add_collection(users().with_index("name")).unwrap();
    let mut alice = users_a
        .new_document([("name", FieldValue::from("Alice")), ("age", FieldValue::Int(30))])
        .unwrap();
    let a1 = users_a.create(&mut alice).unwrap();

    let store = FlakyStore::default();
    let b = Db::new(store.clone(), fast_retries(5)).unwrap();
    let users_b = b.add_collection(users().with_index("name")).unwrap();
    deliver(&a, &b);
    b.merge(a1, users_b.schema_root()).await.unwrap();

    alice.set(users_a.definition(), "name", "Alicia").unwrap();
    let a2 = users_a.update(&mut alice).unwrap();
    deliver(&a, &b);

    // the first attempt has already moved the index entry when it fails
    store.fail_next(1);
    b.merge(a2, users_b.schema_root()).await.unwrap();
    assert_eq!(store.commits.load(Ordering::SeqCst), 2);

    let found = users_b.query("name", &FieldValue::from("Alicia")).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id(), alice.id());
    assert!(users_b.query("name", &FieldValue::from("Alice")).unwrap().is_empty());

    b.merge(a2, users_b.schema_root()).await.unwrap();
    assert_eq!(users_b.query("name", &FieldValue::from("Alicia")).unwrap().len(), 1);
    assert_eq!(users_b.heads(alice.id()).unwrap(), vec![a2]);
}

#[tokio::test]
async fn test_conflicts_exhaust_retries() {
    let (a, id, cid) = source();
    let store = FlakyStore::default();
    let b = Db::new(store.clone(), fast_retries(3)).unwrap();
    let users = b.add_collection(users()).unwrap();
    deliver(&a, &b);

    store.fail_next(usize::MAX);
    let result = b.merge(cid, users.schema_root()).await;
    assert!(matches!(result, Err(e) if e.is_conflict()));
    assert_eq!(store.commits.load(Ordering::SeqCst), 3);

    store.fail_next(0);
    assert_eq!(users.get(&id).unwrap(), None);
    assert!(users.heads(&id).unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_collection() {
    let (_, _, cid) = source();
    let b = Db::new(MemoryStore::new(), DbConfig::default()).unwrap();
    assert!(matches!(
        b.merge(cid, "missing").await,
        Err(DbError::CollectionNotFound(_))
    ));
}

#[tokio::test]
async fn test_shutdown_cancels_new_merges() {
    let (a, id, cid) = source();
    let b = Db::new(MemoryStore::new(), DbConfig::default()).unwrap();
    let users = b.add_collection(users()).unwrap();
    deliver(&a, &b);

    b.shutdown();
    assert_eq!(
        b.merge(cid, users.schema_root()).await,
        Err(DbError::Cancelled)
    );
    assert_eq!(users.get(&id).unwrap(), None);
}

#[tokio::test]
async fn test_concurrent_requests_for_many_documents() {
    let a = Db::new(MemoryStore::new(), DbConfig::default()).unwrap();
    let users_a = a.add_collection(users()).unwrap();
    let mut docs = Vec::new();
    for age in 0..16 {
        let mut doc = users_a
            .new_document([("name", FieldValue::from("user")), ("age", FieldValue::Int(age))])
            .unwrap();
        let cid = users_a.create(&mut doc).unwrap();
        docs.push((doc.id().clone(), cid));
    }

    let b = Db::new(MemoryStore::new(), DbConfig::default()).unwrap();
    let users_b = b.add_collection(users()).unwrap();
    deliver(&a, &b);

    // every document twice, so same-key requests queue behind each other
    let root = users_b.schema_root().to_string();
    let requests = docs
        .iter()
        .chain(docs.iter())
        .map(|(_, cid)| (*cid, root.clone()));
    for result in b.merge_all(requests).await {
        result.unwrap();
    }
    for (id, cid) in &docs {
        assert_eq!(users_b.heads(id).unwrap(), vec![*cid]);
        assert_eq!(users_b.get(id).unwrap(), users_a.get(id).unwrap());
    }
}

#[test]
fn test_dispatch_without_waiting() {
    tokio_test::block_on(async {
        let (a, id, cid) = source();
        let b = Db::new(MemoryStore::new(), DbConfig::default()).unwrap();
        let users = b.add_collection(users()).unwrap();
        deliver(&a, &b);

        let (request, done) = MergeRequest::with_completion(cid, users.schema_root());
        b.dispatch(request).await.unwrap();
        assert_eq!(done.await.unwrap(), Ok(()));
        assert!(users.get(&id).unwrap().is_some());
    });
}
