//! The database handle tying storage, schemas, writes and merges together.

use crate::collection::Collection;
use crate::config::DbConfig;
use crate::dispatcher::{MergeDispatcher, MergeRequest};
use crate::error::{DbError, Result};
use crate::events::{Event, EventBus};
use crate::schema::{CollectionDefinition, SchemaRegistry};
use futures::future::join_all;
use mdcs_merkle::{BlockStore, Cid, HeadSet, Identity};
use mdcs_store::{Datastore, HeadStoreKey};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::info;

/// A replica of the document store.
pub struct Db {
    store: Arc<dyn Datastore>,
    registry: Arc<SchemaRegistry>,
    events: EventBus,
    config: Arc<DbConfig>,
    identity: Option<Arc<Identity>>,
    dispatcher: MergeDispatcher,
    shutdown: watch::Sender<bool>,
}

impl Db {
    pub fn new(store: impl Datastore, config: DbConfig) -> Result<Self> {
        config.validate()?;
        let store: Arc<dyn Datastore> = Arc::new(store);
        let registry = Arc::new(SchemaRegistry::new());
        let events = EventBus::new(config.event_capacity);
        let config = Arc::new(config);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let dispatcher = MergeDispatcher::new(
            Arc::clone(&store),
            registry.clone(),
            events.clone(),
            Arc::clone(&config),
            shutdown_rx,
        );
        Ok(Self {
            store,
            registry,
            events,
            config,
            identity: None,
            dispatcher,
            shutdown,
        })
    }

    /// Use `identity` to sign blocks written from now on, when signing is
    /// enabled in the configuration.
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(Arc::new(identity));
        self
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_deref()
    }

    /// Register a collection (or a new version of one) and return its handle.
    pub fn add_collection(&self, def: CollectionDefinition) -> Result<Collection> {
        let def = self.registry.register(def)?;
        info!(collection = %def.name, id = def.id, fields = def.fields.len(), "collection registered");
        Ok(self.handle(def))
    }

    pub fn collection(&self, name: &str) -> Result<Collection> {
        self.registry
            .by_name(name)
            .map(|def| self.handle(def))
            .ok_or_else(|| DbError::CollectionNotFound(name.to_string()))
    }

    fn handle(&self, def: Arc<CollectionDefinition>) -> Collection {
        Collection::new(
            def,
            Arc::clone(&self.store),
            self.events.clone(),
            Arc::clone(&self.config),
            self.identity.clone(),
        )
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Store a block received from a peer. Returns its CID.
    pub fn put_block(&self, bytes: Vec<u8>) -> Result<Cid> {
        let mut txn = self.store.new_txn();
        match txn.put_raw_block(bytes) {
            Ok(cid) => {
                txn.commit()?;
                Ok(cid)
            }
            Err(e) => {
                txn.discard();
                Err(e.into())
            }
        }
    }

    /// Raw bytes of a stored block.
    pub fn get_block(&self, cid: &Cid) -> Result<Vec<u8>> {
        let mut txn = self.store.new_txn();
        let bytes = txn.get_raw_block(cid);
        txn.discard();
        Ok(bytes?)
    }

    /// Every stored block as `(cid, bytes)`, for handing a full history to a peer.
    pub fn blocks(&self) -> Result<Vec<(Cid, Vec<u8>)>> {
        let mut txn = self.store.new_txn();
        let entries = txn.iter_prefix(b"/b/");
        txn.discard();
        Ok(entries?
            .into_iter()
            .map(|(_, bytes)| (Cid::of(&bytes), bytes))
            .collect())
    }

    /// Members of any head set, in CID order.
    pub fn heads(&self, key: &HeadStoreKey) -> Result<Vec<Cid>> {
        let mut txn = self.store.new_txn();
        let heads = HeadSet::new(key.clone()).list(txn.as_mut());
        txn.discard();
        Ok(heads?.0)
    }

    /// Merge the history ending at `cid` and wait for the outcome.
    pub async fn merge(&self, cid: Cid, schema_root: impl Into<String>) -> Result<()> {
        self.dispatcher.merge(cid, schema_root).await
    }

    /// Merge several histories concurrently, returning each outcome in order.
    pub async fn merge_all<I, S>(&self, requests: I) -> Vec<Result<()>>
    where
        I: IntoIterator<Item = (Cid, S)>,
        S: Into<String>,
    {
        join_all(
            requests
                .into_iter()
                .map(|(cid, root)| self.dispatcher.merge(cid, root)),
        )
        .await
    }

    /// Hand a request to the dispatcher without waiting.
    pub fn dispatch(&self, request: MergeRequest) -> JoinHandle<()> {
        self.dispatcher.dispatch(request)
    }

    /// Stop starting new merge attempts. Attempts already running complete.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("collections", &self.registry.len())
            .field("config", &self.config)
            .field("identity", &self.identity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbConfigBuilder;
    use mdcs_core::{CrdtType, FieldKind, FieldValue};
    use mdcs_store::{DataStoreKey, FieldKey, MemoryStore};

    fn users() -> CollectionDefinition {
        CollectionDefinition::new(1, "User")
            .with_field("name", FieldKind::String, CrdtType::LwwRegister)
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = DbConfig::default();
        config.max_txn_retries = 0;
        assert!(matches!(
            Db::new(MemoryStore::new(), config),
            Err(DbError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_collection_lookup() {
        let db = Db::new(MemoryStore::new(), DbConfig::default()).unwrap();
        assert!(matches!(
            db.collection("User"),
            Err(DbError::CollectionNotFound(_))
        ));
        let added = db.add_collection(users()).unwrap();
        let found = db.collection("User").unwrap();
        assert_eq!(found.schema_root(), added.schema_root());
    }

    #[test]
    fn test_blocks_and_heads() {
        let db = Db::new(MemoryStore::new(), DbConfig::default()).unwrap();
        let users = db.add_collection(users()).unwrap();
        let mut doc = users
            .new_document([("name", FieldValue::from("Alice"))])
            .unwrap();
        let cid = users.create(&mut doc).unwrap();

        let key = DataStoreKey::new(1, doc.id().as_str(), FieldKey::Composite).to_head_store_key();
        assert_eq!(db.heads(&key).unwrap(), vec![cid]);

        let bytes = db.get_block(&cid).unwrap();
        assert_eq!(Cid::of(&bytes), cid);
        // one field block plus the composite
        assert_eq!(db.blocks().unwrap().len(), 2);
        assert_eq!(db.put_block(bytes).unwrap(), cid);
        assert_eq!(db.blocks().unwrap().len(), 2);
    }

    #[test]
    fn test_with_identity() {
        let config = DbConfigBuilder::new().sign_blocks(true).build().unwrap();
        let db = Db::new(MemoryStore::new(), config)
            .unwrap()
            .with_identity(Identity::generate());
        assert!(db.identity().is_some());
        assert!(db.config().sign_blocks);
    }
}
