//! Collection definitions and schema resolution.
//!
//! A collection is identified across replicas by its schema root, which
//! stays fixed as fields are added or dropped. Each field change produces a
//! new schema version ID. Merges resolve the collection from the schema root
//! carried by the event and interpret blocks against the *current* local
//! version.

use crate::error::{DbError, Result};
use mdcs_core::{CrdtType, FieldKind};
use mdcs_merkle::Hasher;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub id: u32,
    pub name: String,
    pub kind: FieldKind,
    pub crdt: CrdtType,
}

/// A single-field secondary index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub id: u32,
    pub field: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionDefinition {
    pub id: u32,
    pub name: String,
    pub schema_root: String,
    pub schema_version_id: String,
    pub fields: Vec<FieldDefinition>,
    /// Track a collection-wide head set across all documents.
    pub branchable: bool,
    pub indexes: Vec<IndexDefinition>,
}

impl CollectionDefinition {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        let name = name.into();
        let schema_root = Hasher::hash(name.as_bytes()).to_hex();
        let mut def = Self {
            id,
            name,
            schema_root,
            schema_version_id: String::new(),
            fields: Vec::new(),
            branchable: false,
            indexes: Vec::new(),
        };
        def.refresh_version();
        def
    }

    /// Add a field. Field IDs are assigned in declaration order, starting at 1.
    pub fn with_field(mut self, name: impl Into<String>, kind: FieldKind, crdt: CrdtType) -> Self {
        let id = self.fields.iter().map(|f| f.id).max().unwrap_or(0) + 1;
        self.fields.push(FieldDefinition {
            id,
            name: name.into(),
            kind,
            crdt,
        });
        self.refresh_version();
        self
    }

    pub fn branchable(mut self, branchable: bool) -> Self {
        self.branchable = branchable;
        self
    }

    pub fn with_index(mut self, field: impl Into<String>) -> Self {
        let id = self.indexes.iter().map(|i| i.id).max().unwrap_or(0) + 1;
        self.indexes.push(IndexDefinition {
            id,
            field: field.into(),
        });
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Check that every field's CRDT supports its kind and every index
    /// names an existing field.
    pub fn validate(&self) -> Result<()> {
        for field in &self.fields {
            if !field.crdt.supports(field.kind) {
                return Err(DbError::CrdtKindMismatch {
                    field: field.name.clone(),
                    crdt: field.crdt,
                    kind: field.kind,
                });
            }
        }
        for index in &self.indexes {
            if self.field(&index.field).is_none() {
                return Err(DbError::FieldNotExist(index.field.clone()));
            }
        }
        Ok(())
    }

    fn refresh_version(&mut self) {
        let fields = serde_json::to_vec(&self.fields).unwrap_or_default();
        self.schema_version_id =
            Hasher::hash_all(&[self.schema_root.as_bytes(), &fields]).to_hex();
    }
}

/// Resolves the collection currently bound to a schema root.
pub trait CollectionResolver: Send + Sync {
    fn resolve(&self, schema_root: &str) -> Option<Arc<CollectionDefinition>>;
}

/// In-memory registry of collection definitions.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    by_root: RwLock<HashMap<String, Arc<CollectionDefinition>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a collection, or replace the definition bound to its schema
    /// root with a newer version. The collection ID must not collide with a
    /// different collection.
    pub fn register(&self, def: CollectionDefinition) -> Result<Arc<CollectionDefinition>> {
        def.validate()?;
        let mut by_root = self.by_root.write();
        let clash = by_root
            .values()
            .any(|other| other.id == def.id && other.schema_root != def.schema_root);
        if clash {
            return Err(DbError::CollectionAlreadyExists(def.name));
        }
        let def = Arc::new(def);
        by_root.insert(def.schema_root.clone(), Arc::clone(&def));
        Ok(def)
    }

    pub fn by_name(&self, name: &str) -> Option<Arc<CollectionDefinition>> {
        self.by_root.read().values().find(|d| d.name == name).cloned()
    }

    pub fn len(&self) -> usize {
        self.by_root.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CollectionResolver for SchemaRegistry {
    fn resolve(&self, schema_root: &str) -> Option<Arc<CollectionDefinition>> {
        self.by_root.read().get(schema_root).cloned()
    }
}
