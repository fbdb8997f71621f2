//! Persisted key layout.
//!
//! ```text
//! /b/<cid>                                 raw block bytes
//! /d/<collection>/<doc>/<field|C>/v        current value (status byte for C)
//! /d/<collection>/<doc>/<field|C>/p        current priority
//! /h/<collection>/<doc>/<field|C>/<cid>    head-set member -> priority
//! /h/<collection>/_/<cid>                  collection head-set member -> priority
//! /m/<collection>/<doc|_>/<cid>            merged marker
//! /i/<collection>/<index>/<value>/<doc>    index entry
//! ```

use std::fmt;

const COMPOSITE_MARKER: &str = "C";
const COLLECTION_MARKER: &str = "_";

/// Which CRDT namespace of a document a key refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldKey {
    /// The document-level composite DAG.
    Composite,
    /// A scalar field, by schema field ID.
    Field(u32),
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKey::Composite => f.write_str(COMPOSITE_MARKER),
            FieldKey::Field(id) => write!(f, "{}", id),
        }
    }
}

/// Key of the raw bytes of a block.
pub fn block_key(cid: &str) -> Vec<u8> {
    format!("/b/{}", cid).into_bytes()
}

/// Addresses the stored state of one CRDT of one document.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DataStoreKey {
    pub collection_id: u32,
    pub doc_id: String,
    pub field: FieldKey,
}

impl DataStoreKey {
    pub fn new(collection_id: u32, doc_id: impl Into<String>, field: FieldKey) -> Self {
        Self {
            collection_id,
            doc_id: doc_id.into(),
            field,
        }
    }

    /// Same document, different namespace.
    pub fn with_field(&self, field: FieldKey) -> Self {
        Self {
            collection_id: self.collection_id,
            doc_id: self.doc_id.clone(),
            field,
        }
    }

    /// Prefix shared by every value of the document.
    pub fn doc_prefix(&self) -> Vec<u8> {
        format!("/d/{}/{}/", self.collection_id, self.doc_id).into_bytes()
    }

    pub fn value_key(&self) -> Vec<u8> {
        format!("/d/{}/{}/{}/v", self.collection_id, self.doc_id, self.field).into_bytes()
    }

    pub fn priority_key(&self) -> Vec<u8> {
        format!("/d/{}/{}/{}/p", self.collection_id, self.doc_id, self.field).into_bytes()
    }

    pub fn to_head_store_key(&self) -> HeadStoreKey {
        HeadStoreKey {
            collection_id: self.collection_id,
            doc_id: Some(self.doc_id.clone()),
            field: self.field,
        }
    }
}

/// Addresses a head set: per document namespace, or collection-wide.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct HeadStoreKey {
    pub collection_id: u32,
    /// `None` for the collection-level head set of a branchable collection.
    pub doc_id: Option<String>,
    pub field: FieldKey,
}

impl HeadStoreKey {
    /// The collection-wide head set.
    pub fn collection(collection_id: u32) -> Self {
        Self {
            collection_id,
            doc_id: None,
            field: FieldKey::Composite,
        }
    }

    pub fn is_collection(&self) -> bool {
        self.doc_id.is_none()
    }

    pub fn prefix(&self) -> Vec<u8> {
        match &self.doc_id {
            Some(doc) => format!("/h/{}/{}/{}/", self.collection_id, doc, self.field),
            None => format!("/h/{}/{}/", self.collection_id, COLLECTION_MARKER),
        }
        .into_bytes()
    }

    pub fn with_cid(&self, cid: &str) -> Vec<u8> {
        let mut key = self.prefix();
        key.extend_from_slice(cid.as_bytes());
        key
    }

    /// Marker recording that `cid` has been applied to this document (or
    /// collection) namespace.
    pub fn merged_marker(&self, cid: &str) -> Vec<u8> {
        let scope = self.doc_id.as_deref().unwrap_or(COLLECTION_MARKER);
        format!("/m/{}/{}/{}", self.collection_id, scope, cid).into_bytes()
    }
}

/// Addresses entries of one secondary index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexKey {
    pub collection_id: u32,
    pub index_id: u32,
}

impl IndexKey {
    pub fn new(collection_id: u32, index_id: u32) -> Self {
        Self {
            collection_id,
            index_id,
        }
    }

    pub fn prefix(&self) -> Vec<u8> {
        format!("/i/{}/{}/", self.collection_id, self.index_id).into_bytes()
    }

    /// Prefix of all entries for one encoded value.
    pub fn value_prefix(&self, value: &[u8]) -> Vec<u8> {
        let mut key = self.prefix();
        key.extend_from_slice(hex::encode(value).as_bytes());
        key.push(b'/');
        key
    }

    pub fn entry(&self, value: &[u8], doc_id: &str) -> Vec<u8> {
        let mut key = self.value_prefix(value);
        key.extend_from_slice(doc_id.as_bytes());
        key
    }

    /// Extract the document ID from a full entry key.
    pub fn doc_id_of(entry: &[u8]) -> Option<String> {
        let pos = entry.iter().rposition(|b| *b == b'/')?;
        String::from_utf8(entry[pos + 1..].to_vec()).ok()
    }
}
