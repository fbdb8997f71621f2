//! Documents and document identifiers.

use crate::error::{DbError, Result};
use crate::schema::CollectionDefinition;
use mdcs_core::FieldValue;
use mdcs_merkle::Hasher;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

const DOC_ID_PREFIX: &str = "bae-";

/// Identifier of a document, derived from its collection and initial values.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocId(String);

impl DocId {
    /// Derive the ID of a document created with `values` in the collection
    /// with `schema_root`.
    pub fn derive(schema_root: &str, values: &BTreeMap<String, FieldValue>) -> Result<Self> {
        let canonical = serde_json::to_vec(values)
            .map_err(|e| DbError::Crdt(mdcs_core::CrdtError::Encode(e.to_string())))?;
        let digest = Hasher::hash_all(&[schema_root.as_bytes(), &canonical]);
        Ok(DocId(format!("{}{}", DOC_ID_PREFIX, &digest.to_hex()[..32])))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocId {
    fn from(s: &str) -> Self {
        DocId(s.to_string())
    }
}

impl From<String> for DocId {
    fn from(s: String) -> Self {
        DocId(s)
    }
}

/// A document: field values plus the set of fields changed since it was
/// loaded or last saved.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    id: DocId,
    values: BTreeMap<String, FieldValue>,
    dirty: BTreeSet<String>,
}

impl Document {
    /// A new document for `collection`. Every given field is validated and
    /// marked dirty.
    pub fn new<I, K>(collection: &CollectionDefinition, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, FieldValue)>,
        K: Into<String>,
    {
        let mut checked = BTreeMap::new();
        for (name, value) in values {
            let name = name.into();
            check_field(collection, &name, &value)?;
            checked.insert(name, value);
        }
        let id = DocId::derive(&collection.schema_root, &checked)?;
        let dirty = checked.keys().cloned().collect();
        Ok(Self {
            id,
            values: checked,
            dirty,
        })
    }

    /// A document as loaded from storage, with nothing dirty.
    pub fn from_parts(id: DocId, values: BTreeMap<String, FieldValue>) -> Self {
        Self {
            id,
            values,
            dirty: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> &DocId {
        &self.id
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field)
    }

    pub fn values(&self) -> &BTreeMap<String, FieldValue> {
        &self.values
    }

    /// Set a field and mark it dirty. For counter fields `value` is the
    /// increment to apply.
    pub fn set(
        &mut self,
        collection: &CollectionDefinition,
        field: &str,
        value: impl Into<FieldValue>,
    ) -> Result<()> {
        let value = value.into();
        check_field(collection, field, &value)?;
        self.values.insert(field.to_string(), value);
        self.dirty.insert(field.to_string());
        Ok(())
    }

    /// Changed fields with their values, in name order.
    pub fn dirty_fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> + '_ {
        self.dirty
            .iter()
            .filter_map(|name| self.values.get(name).map(|v| (name.as_str(), v)))
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.dirty.clear();
    }
}

fn check_field(collection: &CollectionDefinition, name: &str, value: &FieldValue) -> Result<()> {
    let def = collection
        .field(name)
        .ok_or_else(|| DbError::FieldNotExist(name.to_string()))?;
    value.check_kind(def.kind)?;
    Ok(())
}
