//! Secondary indexes and their synchronization after merges.
//!
//! A field index maps an encoded field value to the IDs of the documents
//! holding it. Entries are plain keys, so index updates roll back with the
//! transaction that made them.

use crate::document::{DocId, Document};
use crate::error::Result;
use crate::schema::{CollectionDefinition, IndexDefinition};
use mdcs_core::FieldValue;
use mdcs_store::{IndexKey, Transaction};
use tracing::trace;

/// A single-field index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldIndex {
    key: IndexKey,
    field: String,
}

impl FieldIndex {
    pub fn new(collection_id: u32, def: &IndexDefinition) -> Self {
        Self {
            key: IndexKey::new(collection_id, def.id),
            field: def.field.clone(),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    fn encoded(&self, doc: &Document) -> Result<Option<Vec<u8>>> {
        match doc.get(&self.field) {
            Some(value) => Ok(Some(value.encode()?)),
            None => Ok(None),
        }
    }

    pub fn index_new_doc(&self, txn: &mut dyn Transaction, doc: &Document) -> Result<()> {
        if let Some(value) = self.encoded(doc)? {
            txn.set(&self.key.entry(&value, doc.id().as_str()), Vec::new())?;
        }
        Ok(())
    }

    pub fn delete_indexed_doc(&self, txn: &mut dyn Transaction, doc: &Document) -> Result<()> {
        if let Some(value) = self.encoded(doc)? {
            txn.delete(&self.key.entry(&value, doc.id().as_str()))?;
        }
        Ok(())
    }

    /// Move the entry of a document whose indexed value changed. Unchanged
    /// values leave the index untouched.
    pub fn update_doc_index(
        &self,
        txn: &mut dyn Transaction,
        old: &Document,
        new: &Document,
    ) -> Result<()> {
        let before = self.encoded(old)?;
        let after = self.encoded(new)?;
        if before == after {
            return Ok(());
        }
        trace!(field = %self.field, doc_id = %new.id(), "index value changed");
        if let Some(value) = before {
            txn.delete(&self.key.entry(&value, old.id().as_str()))?;
        }
        if let Some(value) = after {
            txn.set(&self.key.entry(&value, new.id().as_str()), Vec::new())?;
        }
        Ok(())
    }

    /// IDs of documents whose indexed field equals `value`, in ID order.
    pub fn query(&self, txn: &mut dyn Transaction, value: &FieldValue) -> Result<Vec<DocId>> {
        let prefix = self.key.value_prefix(&value.encode()?);
        Ok(txn
            .iter_prefix(&prefix)?
            .into_iter()
            .filter_map(|(entry, _)| IndexKey::doc_id_of(&entry))
            .map(DocId::from)
            .collect())
    }
}

/// All indexes of one collection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CollectionIndex {
    indexes: Vec<FieldIndex>,
}

impl CollectionIndex {
    pub fn for_collection(def: &CollectionDefinition) -> Self {
        Self {
            indexes: def
                .indexes
                .iter()
                .map(|index| FieldIndex::new(def.id, index))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    pub fn on_field(&self, field: &str) -> Option<&FieldIndex> {
        self.indexes.iter().find(|i| i.field == field)
    }

    pub fn index_new_doc(&self, txn: &mut dyn Transaction, doc: &Document) -> Result<()> {
        for index in &self.indexes {
            index.index_new_doc(txn, doc)?;
        }
        Ok(())
    }

    pub fn delete_indexed_doc(&self, txn: &mut dyn Transaction, doc: &Document) -> Result<()> {
        for index in &self.indexes {
            index.delete_indexed_doc(txn, doc)?;
        }
        Ok(())
    }

    pub fn update_doc_index(
        &self,
        txn: &mut dyn Transaction,
        old: &Document,
        new: &Document,
    ) -> Result<()> {
        for index in &self.indexes {
            index.update_doc_index(txn, old, new)?;
        }
        Ok(())
    }

    /// Bring the indexes in line with a document's projection before and
    /// after a change. `None` means absent or deleted.
    pub fn sync_indexed_doc(
        &self,
        txn: &mut dyn Transaction,
        before: Option<&Document>,
        after: Option<&Document>,
    ) -> Result<()> {
        match (before, after) {
            (None, Some(new)) => self.index_new_doc(txn, new),
            (Some(old), None) => self.delete_indexed_doc(txn, old),
            (Some(old), Some(new)) => self.update_doc_index(txn, old, new),
            (None, None) => Ok(()),
        }
    }
}
