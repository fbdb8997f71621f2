//! The merge processor.
//!
//! One [`MergeProcessor`] handles one merge attempt inside one transaction:
//!
//! 1. load the arriving block and find the document it belongs to
//! 2. read the document's composite heads (the merge target)
//! 3. walk back from the arriving block to the local frontier
//! 4. replay the discovered composite blocks oldest first, each together
//!    with the field blocks it bundles
//! 5. bring the collection's indexes in line with the new projection
//! 6. commit, then publish events
//!
//! Any error discards the transaction, leaving the document untouched.
//! Collection blocks of branchable collections follow the same walk over the
//! collection DAG and run a document merge for every composite they link.

use crate::collection::load_document;
use crate::config::DbConfig;
use crate::crdt::FieldCrdt;
use crate::error::{DbError, Result};
use crate::events::{Event, EventBus, MergeCompleteEvent, UpdateEvent};
use crate::index::CollectionIndex;
use crate::schema::CollectionDefinition;
use mdcs_merkle::{collect_blocks, verify_block, Block, BlockStore, Cid, MergeTarget, MerkleClock};
use mdcs_store::{Datastore, HeadStoreKey, Transaction};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// The serialization key for merges of the history ending at `cid`: one
/// per document, or one per collection for collection blocks.
pub fn merge_key(store: &dyn Datastore, collection: &CollectionDefinition, cid: &Cid) -> Result<String> {
    let mut txn = store.new_txn();
    let block = txn.get_block(cid);
    txn.discard();
    let block = block?;
    if block.delta.is_collection() {
        Ok(format!("collection:{}", collection.id))
    } else {
        Ok(format!("{}/{}", collection.id, block.delta.doc_id))
    }
}

fn malformed(cid: &Cid, reason: &str) -> DbError {
    DbError::MalformedBlock {
        cid: *cid,
        reason: reason.to_string(),
    }
}

/// State of one merge attempt.
pub struct MergeProcessor {
    txn: Box<dyn Transaction>,
    collection: Arc<CollectionDefinition>,
    indexes: CollectionIndex,
    verify_signatures: bool,
    events: EventBus,
    /// Field CRDTs already bound during this merge, by (document, field).
    crdts: HashMap<(String, String), FieldCrdt>,
}

impl MergeProcessor {
    pub fn new(
        store: &dyn Datastore,
        collection: Arc<CollectionDefinition>,
        config: &DbConfig,
        events: EventBus,
    ) -> Self {
        Self {
            txn: store.new_txn(),
            indexes: CollectionIndex::for_collection(&collection),
            collection,
            verify_signatures: config.verify_signatures,
            events,
            crdts: HashMap::new(),
        }
    }

    /// Merge the history ending at `cid` and commit.
    pub fn execute(mut self, cid: &Cid) -> Result<()> {
        match self.merge(cid) {
            Ok(doc_id) => {
                let event = Event::MergeComplete(MergeCompleteEvent {
                    cid: *cid,
                    schema_root: self.collection.schema_root.clone(),
                    doc_id,
                });
                self.publish_on_success(event);
                self.txn.commit()?;
                Ok(())
            }
            Err(e) => {
                self.txn.discard();
                Err(e)
            }
        }
    }

    fn merge(&mut self, cid: &Cid) -> Result<Option<String>> {
        let block = self.txn.get_block(cid)?;
        if block.delta.is_collection() {
            self.merge_collection(cid)?;
            Ok(None)
        } else if block.delta.is_composite() {
            self.merge_document(cid, &block)?;
            Ok(Some(block.delta.doc_id))
        } else {
            Err(DbError::UnexpectedPayload {
                cid: *cid,
                field: block.delta.field_name,
            })
        }
    }

    fn merge_collection(&mut self, cid: &Cid) -> Result<()> {
        let clock = MerkleClock::new(HeadStoreKey::collection(self.collection.id));
        let target = MergeTarget::load(self.txn.as_mut(), clock.headset())?;
        let blocks = collect_blocks(self.txn.as_mut(), clock.headset(), *cid, target)?;
        debug!(
            collection = %self.collection.name,
            count = blocks.len(),
            "replaying collection blocks"
        );

        for (cid, block) in &blocks {
            if !block.delta.is_collection() {
                return Err(malformed(cid, "collection history reaches a non-collection block"));
            }
        }
        for (cid, block) in blocks {
            if self.verify_signatures {
                verify_block(self.txn.as_mut(), &block)?;
            }
            clock.process_block(self.txn.as_mut(), &cid, &block)?;
            for link in block.content_links() {
                let composite = self.txn.get_block(&link.cid)?;
                if !composite.delta.is_composite() || composite.delta.doc_id != link.name {
                    return Err(malformed(
                        &link.cid,
                        &format!("collection link {} is not that document's composite", link.name),
                    ));
                }
                self.merge_document(&link.cid, &composite)?;
            }
        }
        Ok(())
    }

    fn merge_document(&mut self, cid: &Cid, block: &Block) -> Result<()> {
        let doc_id = block.delta.doc_id.clone();
        let composite = FieldCrdt::composite(self.collection.id, &doc_id);
        let clock = MerkleClock::new(composite.key().to_head_store_key());

        let before = load_document(self.txn.as_mut(), &self.collection, &doc_id)?;
        let target = MergeTarget::load(self.txn.as_mut(), clock.headset())?;
        let blocks = collect_blocks(self.txn.as_mut(), clock.headset(), *cid, target)?;
        if blocks.is_empty() {
            trace!(doc_id = %doc_id, cid = %cid.short(), "nothing to merge");
            return Ok(());
        }
        for (cid, block) in &blocks {
            if !block.delta.is_composite() || block.delta.doc_id != doc_id {
                return Err(malformed(
                    cid,
                    &format!("history of {} reaches a block of another document or kind", doc_id),
                ));
            }
        }
        debug!(doc_id = %doc_id, count = blocks.len(), "replaying blocks");

        for (cid, block) in blocks {
            self.replay(&doc_id, composite.clone(), cid, block)?;
        }

        let after = load_document(self.txn.as_mut(), &self.collection, &doc_id)?;
        self.indexes
            .sync_indexed_doc(self.txn.as_mut(), before.as_ref(), after.as_ref())?;

        let bytes = self.txn.get_raw_block(cid)?;
        let event = Event::Update(UpdateEvent {
            doc_id,
            cid: *cid,
            collection_id: self.collection.id,
            schema_root: self.collection.schema_root.clone(),
            block: bytes,
            is_create: before.is_none(),
        });
        self.publish_on_success(event);
        Ok(())
    }

    /// Apply one composite block of `doc_id` and the field blocks it bundles.
    fn replay(&mut self, doc_id: &str, composite: FieldCrdt, cid: Cid, block: Block) -> Result<()> {
        if !self.apply(composite, &cid, &block)? {
            return Ok(());
        }
        for link in block.content_links() {
            let child = self.txn.get_block(&link.cid)?;
            let delta = &child.delta;
            if delta.is_composite()
                || delta.is_collection()
                || delta.doc_id != doc_id
                || delta.field_name != link.name
            {
                return Err(malformed(
                    &link.cid,
                    &format!("link {} of {} is not one of its field blocks", link.name, cid.short()),
                ));
            }
            if child.content_links().next().is_some() {
                return Err(malformed(&link.cid, "field block bundles other blocks"));
            }

            let Some(crdt) = self.crdt_for(doc_id, &delta.field_name)? else {
                debug!(
                    field = %delta.field_name,
                    cid = %link.cid.short(),
                    "skipping block for unknown field"
                );
                continue;
            };
            self.apply(crdt, &link.cid, &child)?;
        }
        Ok(())
    }

    /// Merge one block into `crdt` and its clock. Returns false when the
    /// block was already applied.
    fn apply(&mut self, crdt: FieldCrdt, cid: &Cid, block: &Block) -> Result<bool> {
        let clock = MerkleClock::new(crdt.key().to_head_store_key());
        if clock.is_merged(self.txn.as_mut(), cid)? {
            return Ok(false);
        }
        if self.verify_signatures {
            verify_block(self.txn.as_mut(), block)?;
        }
        crdt.merge(self.txn.as_mut(), cid, &block.delta)?;
        clock.process_block(self.txn.as_mut(), cid, block)?;
        Ok(true)
    }

    /// The CRDT of `field` on the document being merged, or `None` for a
    /// field the current schema version does not have.
    fn crdt_for(&mut self, doc_id: &str, field: &str) -> Result<Option<FieldCrdt>> {
        let cache_key = (doc_id.to_string(), field.to_string());
        if let Some(crdt) = self.crdts.get(&cache_key) {
            return Ok(Some(crdt.clone()));
        }
        let Some(def) = self.collection.field(field) else {
            return Ok(None);
        };
        let crdt = FieldCrdt::for_field(self.collection.id, doc_id, def)?;
        self.crdts.insert(cache_key, crdt.clone());
        Ok(Some(crdt))
    }

    fn publish_on_success(&mut self, event: Event) {
        let events = self.events.clone();
        self.txn.on_success(Box::new(move || events.publish(event)));
    }
}
