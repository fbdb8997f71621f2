//! Collection handles: the local write path and document reads.
//!
//! Every write runs in one transaction. For each dirty field a block is
//! added to that field's DAG and applied to the stored value; a composite
//! block then bundles those field blocks on top of the document's composite
//! heads. Branchable collections additionally fold the composite block into
//! the collection-wide DAG. The update event is published only once the
//! transaction commits.

use crate::config::DbConfig;
use crate::crdt::{read_status, FieldCrdt};
use crate::document::{DocId, Document};
use crate::error::{DbError, Result};
use crate::events::{Event, EventBus, UpdateEvent};
use crate::index::CollectionIndex;
use crate::schema::CollectionDefinition;
use mdcs_core::{DocumentStatus, FieldValue};
use mdcs_merkle::{Cid, ClockEntry, DagLink, Delta, DeltaPayload, Identity, MerkleClock};
use mdcs_store::{DataStoreKey, Datastore, FieldKey, HeadStoreKey, Transaction};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Handle to one collection of a [`Db`](crate::Db).
#[derive(Clone)]
pub struct Collection {
    def: Arc<CollectionDefinition>,
    store: Arc<dyn Datastore>,
    events: EventBus,
    config: Arc<DbConfig>,
    identity: Option<Arc<Identity>>,
}

impl Collection {
    pub(crate) fn new(
        def: Arc<CollectionDefinition>,
        store: Arc<dyn Datastore>,
        events: EventBus,
        config: Arc<DbConfig>,
        identity: Option<Arc<Identity>>,
    ) -> Self {
        Self {
            def,
            store,
            events,
            config,
            identity,
        }
    }

    pub fn definition(&self) -> &Arc<CollectionDefinition> {
        &self.def
    }

    pub fn id(&self) -> u32 {
        self.def.id
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn schema_root(&self) -> &str {
        &self.def.schema_root
    }

    /// Build a new document for this collection.
    pub fn new_document<I, K>(&self, values: I) -> Result<Document>
    where
        I: IntoIterator<Item = (K, FieldValue)>,
        K: Into<String>,
    {
        Document::new(&self.def, values)
    }

    /// Persist a new document. Returns the CID of its composite block.
    ///
    /// Document ids are content-derived, so a deleted document cannot be
    /// created again with the same initial values.
    pub fn create(&self, doc: &mut Document) -> Result<Cid> {
        let cid = self.in_txn(|txn| {
            let key = self.composite_key(doc.id());
            match read_status(txn, &key)? {
                None => {}
                Some(DocumentStatus::Active) => {
                    return Err(DbError::DocumentAlreadyExists(doc.id().to_string()))
                }
                Some(DocumentStatus::Deleted) => {
                    return Err(DbError::DocumentDeleted(doc.id().to_string()))
                }
            }
            let entry = self.save(txn, doc, DocumentStatus::Active, true)?;
            let after = load_document(txn, &self.def, doc.id().as_str())?;
            CollectionIndex::for_collection(&self.def).sync_indexed_doc(txn, None, after.as_ref())?;
            Ok(entry.cid)
        })?;
        doc.clear_dirty();
        Ok(cid)
    }

    /// Persist the dirty fields of an existing document.
    pub fn update(&self, doc: &mut Document) -> Result<Cid> {
        let cid = self.in_txn(|txn| {
            let before = load_document(txn, &self.def, doc.id().as_str())?
                .ok_or_else(|| DbError::DocumentNotFound(doc.id().to_string()))?;
            let entry = self.save(txn, doc, DocumentStatus::Active, false)?;
            let after = load_document(txn, &self.def, doc.id().as_str())?;
            CollectionIndex::for_collection(&self.def).sync_indexed_doc(
                txn,
                Some(&before),
                after.as_ref(),
            )?;
            Ok(entry.cid)
        })?;
        doc.clear_dirty();
        Ok(cid)
    }

    /// Delete a document with a tombstone composite block.
    pub fn delete(&self, doc_id: &DocId) -> Result<Cid> {
        self.in_txn(|txn| {
            let before = load_document(txn, &self.def, doc_id.as_str())?
                .ok_or_else(|| DbError::DocumentNotFound(doc_id.to_string()))?;
            let tombstone = Document::from_parts(doc_id.clone(), BTreeMap::new());
            let entry = self.save(txn, &tombstone, DocumentStatus::Deleted, false)?;
            CollectionIndex::for_collection(&self.def).delete_indexed_doc(txn, &before)?;
            Ok(entry.cid)
        })
    }

    /// The document at its current heads, or `None` when absent or deleted.
    pub fn get(&self, doc_id: &DocId) -> Result<Option<Document>> {
        let mut txn = self.store.new_txn();
        let doc = load_document(txn.as_mut(), &self.def, doc_id.as_str());
        txn.discard();
        doc
    }

    /// Documents whose indexed `field` equals `value`.
    pub fn query(&self, field: &str, value: &FieldValue) -> Result<Vec<Document>> {
        let indexes = CollectionIndex::for_collection(&self.def);
        let index = indexes
            .on_field(field)
            .ok_or_else(|| DbError::FieldNotExist(field.to_string()))?;

        let mut txn = self.store.new_txn();
        let result = index.query(txn.as_mut(), value).and_then(|ids| {
            let mut docs = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(doc) = load_document(txn.as_mut(), &self.def, id.as_str())? {
                    docs.push(doc);
                }
            }
            Ok(docs)
        });
        txn.discard();
        result
    }

    /// Current heads of a document's composite DAG.
    pub fn heads(&self, doc_id: &DocId) -> Result<Vec<Cid>> {
        self.list_heads(self.composite_key(doc_id).to_head_store_key())
    }

    /// Current heads of one field's DAG.
    pub fn field_heads(&self, doc_id: &DocId, field: &str) -> Result<Vec<Cid>> {
        let def = self
            .def
            .field(field)
            .ok_or_else(|| DbError::FieldNotExist(field.to_string()))?;
        let key = DataStoreKey::new(self.def.id, doc_id.as_str(), FieldKey::Field(def.id));
        self.list_heads(key.to_head_store_key())
    }

    /// Current heads of the collection-wide DAG.
    pub fn collection_heads(&self) -> Result<Vec<Cid>> {
        self.list_heads(HeadStoreKey::collection(self.def.id))
    }

    fn list_heads(&self, key: HeadStoreKey) -> Result<Vec<Cid>> {
        let mut txn = self.store.new_txn();
        let heads = MerkleClock::new(key).headset().list(txn.as_mut());
        txn.discard();
        Ok(heads?.0)
    }

    fn composite_key(&self, doc_id: &DocId) -> DataStoreKey {
        DataStoreKey::new(self.def.id, doc_id.as_str(), FieldKey::Composite)
    }

    fn in_txn<T>(&self, f: impl FnOnce(&mut dyn Transaction) -> Result<T>) -> Result<T> {
        let mut txn = self.store.new_txn();
        match f(txn.as_mut()) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(e) => {
                txn.discard();
                Err(e)
            }
        }
    }

    /// Write field blocks for the dirty fields of `doc`, then the composite
    /// block bundling them (and the collection block, if branchable).
    fn save(
        &self,
        txn: &mut dyn Transaction,
        doc: &Document,
        status: DocumentStatus,
        is_create: bool,
    ) -> Result<ClockEntry> {
        let doc_id = doc.id().as_str();
        let signer = if self.config.sign_blocks {
            self.identity.as_deref()
        } else {
            None
        };

        let mut links = Vec::new();
        for (name, value) in doc.dirty_fields() {
            let field = self
                .def
                .field(name)
                .ok_or_else(|| DbError::FieldNotExist(name.to_string()))?;
            let crdt = FieldCrdt::for_field(self.def.id, doc_id, field)?;
            let delta = self.delta(doc_id, name, crdt.delta(value, is_create)?);

            let clock = MerkleClock::new(crdt.key().to_head_store_key());
            let entry = clock.add_delta(txn, delta, Vec::new(), signer)?;
            crdt.merge(txn, &entry.cid, &entry.block.delta)?;
            links.push(DagLink::new(name, entry.cid));
        }

        let composite = FieldCrdt::composite(self.def.id, doc_id);
        let delta = self.delta(doc_id, "", DeltaPayload::Composite { status });
        let clock = MerkleClock::new(composite.key().to_head_store_key());
        let entry = clock.add_delta(txn, delta, links, signer)?;
        composite.merge(txn, &entry.cid, &entry.block.delta)?;

        if self.def.branchable {
            let delta = self.delta("", "", DeltaPayload::Collection);
            let clock = MerkleClock::new(HeadStoreKey::collection(self.def.id));
            clock.add_delta(txn, delta, vec![DagLink::new(doc_id, entry.cid)], signer)?;
        }

        debug!(
            collection = %self.def.name,
            doc_id,
            cid = %entry.cid.short(),
            priority = entry.block.priority(),
            ?status,
            "wrote document"
        );

        let events = self.events.clone();
        let event = Event::Update(UpdateEvent {
            doc_id: doc_id.to_string(),
            cid: entry.cid,
            collection_id: self.def.id,
            schema_root: self.def.schema_root.clone(),
            block: entry.bytes.clone(),
            is_create,
        });
        txn.on_success(Box::new(move || events.publish(event)));

        Ok(entry)
    }

    fn delta(&self, doc_id: &str, field_name: &str, payload: DeltaPayload) -> Delta {
        Delta {
            doc_id: doc_id.to_string(),
            field_name: field_name.to_string(),
            priority: 0,
            schema_version_id: self.def.schema_version_id.clone(),
            payload,
        }
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("id", &self.def.id)
            .field("name", &self.def.name)
            .finish()
    }
}

/// Project a document from stored state. `None` when absent or deleted.
pub(crate) fn load_document(
    txn: &mut dyn Transaction,
    def: &CollectionDefinition,
    doc_id: &str,
) -> Result<Option<Document>> {
    let key = DataStoreKey::new(def.id, doc_id, FieldKey::Composite);
    match read_status(txn, &key)? {
        None | Some(DocumentStatus::Deleted) => return Ok(None),
        Some(DocumentStatus::Active) => {}
    }

    let mut values = BTreeMap::new();
    for field in &def.fields {
        let crdt = FieldCrdt::for_field(def.id, doc_id, field)?;
        if let Some(value) = crdt.value(txn)? {
            values.insert(field.name.clone(), value);
        }
    }
    Ok(Some(Document::from_parts(DocId::from(doc_id), values)))
}
