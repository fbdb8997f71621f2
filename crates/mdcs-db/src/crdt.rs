//! Field and composite CRDT dispatch.
//!
//! One [`FieldCrdt`] is bound to the stored state of one document namespace
//! (`/d/<collection>/<doc>/<field|C>`). It turns new values into delta
//! payloads on the write path and folds incoming deltas into stored state
//! on both the write and merge paths.

use crate::error::{DbError, Result};
use crate::schema::FieldDefinition;
use mdcs_core::{pncounter, CrdtType, DocumentStatus, FieldKind, FieldValue, Lattice, LwwRegister};
use mdcs_merkle::{Cid, Delta, DeltaPayload};
use mdcs_store::{DataStoreKey, FieldKey, Transaction};

#[derive(Clone, Debug, PartialEq)]
pub enum FieldCrdt {
    LwwRegister {
        key: DataStoreKey,
        field: String,
        kind: FieldKind,
    },
    Counter {
        key: DataStoreKey,
        field: String,
        kind: FieldKind,
        crdt: CrdtType,
    },
    Composite {
        key: DataStoreKey,
    },
}

impl FieldCrdt {
    /// Bind the CRDT declared for `field` to a document's stored state.
    pub fn for_field(collection_id: u32, doc_id: &str, field: &FieldDefinition) -> Result<Self> {
        if !field.crdt.supports(field.kind) {
            return Err(DbError::CrdtKindMismatch {
                field: field.name.clone(),
                crdt: field.crdt,
                kind: field.kind,
            });
        }
        let key = DataStoreKey::new(collection_id, doc_id, FieldKey::Field(field.id));
        Ok(match field.crdt {
            CrdtType::LwwRegister => FieldCrdt::LwwRegister {
                key,
                field: field.name.clone(),
                kind: field.kind,
            },
            crdt @ (CrdtType::PCounter | CrdtType::PNCounter) => FieldCrdt::Counter {
                key,
                field: field.name.clone(),
                kind: field.kind,
                crdt,
            },
        })
    }

    pub fn composite(collection_id: u32, doc_id: &str) -> Self {
        FieldCrdt::Composite {
            key: DataStoreKey::new(collection_id, doc_id, FieldKey::Composite),
        }
    }

    pub fn key(&self) -> &DataStoreKey {
        match self {
            FieldCrdt::LwwRegister { key, .. }
            | FieldCrdt::Counter { key, .. }
            | FieldCrdt::Composite { key } => key,
        }
    }

    fn field_name(&self) -> &str {
        match self {
            FieldCrdt::LwwRegister { field, .. } | FieldCrdt::Counter { field, .. } => field,
            FieldCrdt::Composite { .. } => "",
        }
    }

    /// Payload recording `value` as the field's new value (or, for counters,
    /// as an increment). The composite CRDT ignores `value` and records an
    /// active-document change.
    pub fn delta(&self, value: &FieldValue, is_create: bool) -> Result<DeltaPayload> {
        match self {
            FieldCrdt::LwwRegister { kind, .. } => {
                value.check_kind(*kind)?;
                Ok(DeltaPayload::LwwRegister {
                    data: value.encode()?,
                })
            }
            FieldCrdt::Counter { kind, crdt, .. } => {
                pncounter::validate_increment(*crdt, *kind, value)?;
                let nonce = if is_create { 0 } else { rand::random::<i64>() };
                Ok(DeltaPayload::Counter {
                    data: value.encode()?,
                    nonce,
                })
            }
            FieldCrdt::Composite { .. } => Ok(DeltaPayload::Composite {
                status: DocumentStatus::Active,
            }),
        }
    }

    /// Fold `delta`, carried by block `cid`, into the stored state.
    pub fn merge(&self, txn: &mut dyn Transaction, cid: &Cid, delta: &Delta) -> Result<()> {
        match (self, &delta.payload) {
            (FieldCrdt::LwwRegister { key, .. }, DeltaPayload::LwwRegister { data }) => {
                let mut register = LwwRegister::from_parts(
                    txn.get(&key.value_key())?,
                    read_priority(txn, key)?,
                );
                if register.apply(data.clone(), delta.priority) {
                    txn.set(&key.value_key(), data.clone())?;
                    txn.set(&key.priority_key(), delta.priority.to_be_bytes().to_vec())?;
                }
                Ok(())
            }
            (FieldCrdt::Counter { key, kind, crdt, .. }, DeltaPayload::Counter { data, .. }) => {
                let increment = FieldValue::decode(data)?;
                pncounter::validate_increment(*crdt, *kind, &increment)?;
                let current = match txn.get(&key.value_key())? {
                    Some(bytes) => Some(FieldValue::decode(&bytes)?),
                    None => None,
                };
                let total = pncounter::add(*kind, current.as_ref(), &increment)?;
                txn.set(&key.value_key(), total.encode()?)?;
                let priority = read_priority(txn, key)?.max(delta.priority);
                txn.set(&key.priority_key(), priority.to_be_bytes().to_vec())?;
                Ok(())
            }
            (FieldCrdt::Composite { key }, DeltaPayload::Composite { status }) => {
                let current = read_status(txn, key)?;
                let joined = match current {
                    Some(current) => current.join(status),
                    None => *status,
                };
                txn.set(&key.value_key(), vec![joined.as_byte()])?;
                let priority = read_priority(txn, key)?.max(delta.priority);
                txn.set(&key.priority_key(), priority.to_be_bytes().to_vec())?;
                Ok(())
            }
            _ => Err(DbError::UnexpectedPayload {
                cid: *cid,
                field: self.field_name().to_string(),
            }),
        }
    }

    /// The current stored value; `None` when nothing was ever written.
    pub fn value(&self, txn: &mut dyn Transaction) -> Result<Option<FieldValue>> {
        match txn.get(&self.key().value_key())? {
            None => Ok(None),
            Some(bytes) => match self {
                FieldCrdt::Composite { .. } => Ok(None),
                _ => Ok(Some(FieldValue::decode(&bytes)?)),
            },
        }
    }
}

/// Stored status of a document, `None` when it was never written.
pub fn read_status(txn: &mut dyn Transaction, key: &DataStoreKey) -> Result<Option<DocumentStatus>> {
    let composite = key.with_field(FieldKey::Composite);
    match txn.get(&composite.value_key())? {
        None => Ok(None),
        Some(bytes) => Ok(bytes.first().copied().and_then(DocumentStatus::from_byte)),
    }
}

fn read_priority(txn: &mut dyn Transaction, key: &DataStoreKey) -> Result<u64> {
    Ok(txn
        .get(&key.priority_key())?
        .and_then(|bytes| <[u8; 8]>::try_from(bytes.as_slice()).ok())
        .map(u64::from_be_bytes)
        .unwrap_or(0))
}
