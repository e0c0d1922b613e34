//! Document store plus the on-disk helpers used to persist it.

mod codec;
mod file_store;

pub use codec::{decode_vectors, encode_vectors};
pub use file_store::{is_path_component, FileStore};

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use hv_core::{DocId, FieldValue, RowId};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VectorDbError};

/// One published, immutable version of a document.
///
/// Readers hold an `Arc` to a version; writers publish a new version by
/// swapping the pointer, so a reader never sees a partially written field set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: DocId,
    pub row_id: RowId,
    pub fields: BTreeMap<String, FieldValue>,
}

impl StoredDocument {
    pub fn vector(&self, field: &str) -> Option<&[f32]> {
        self.fields.get(field).and_then(FieldValue::as_vector)
    }
}

pub struct DocumentStore {
    by_id: DashMap<DocId, Arc<StoredDocument>>,
    by_row: DashMap<RowId, Arc<StoredDocument>>,
    next_row: AtomicU64,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self {
            by_id: DashMap::new(),
            by_row: DashMap::new(),
            next_row: AtomicU64::new(0),
        }
    }

    pub fn allocate_row(&self) -> RowId {
        self.next_row.fetch_add(1, Ordering::Relaxed)
    }

    pub fn next_row(&self) -> RowId {
        self.next_row.load(Ordering::Relaxed)
    }

    pub fn get(&self, id: &str) -> Option<Arc<StoredDocument>> {
        self.by_id.get(id).map(|d| Arc::clone(d.value()))
    }

    pub fn get_row(&self, row: RowId) -> Option<Arc<StoredDocument>> {
        self.by_row.get(&row).map(|d| Arc::clone(d.value()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Publish a brand-new document. Fails with `DuplicateId` if the id is taken.
    pub fn insert_new(&self, doc: Arc<StoredDocument>) -> Result<()> {
        match self.by_id.entry(doc.id.clone()) {
            Entry::Occupied(_) => return Err(VectorDbError::DuplicateId(doc.id.clone())),
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&doc));
            }
        }
        self.publish_row(&doc);
        Ok(())
    }

    /// Index `doc` by row, unless a concurrent `remove` or `replace` already
    /// unpublished it from `by_id`.
    fn publish_row(&self, doc: &Arc<StoredDocument>) {
        self.by_row.insert(doc.row_id, Arc::clone(doc));
        let still_live = self.by_id.get(&doc.id).is_some_and(|cur| Arc::ptr_eq(cur.value(), doc));
        if !still_live {
            self.by_row.remove_if(&doc.row_id, |_, cur| Arc::ptr_eq(cur, doc));
        }
    }

    /// Swap in `next` if `expected` is still the published version of its id.
    pub fn replace(&self, expected: &Arc<StoredDocument>, next: Arc<StoredDocument>) -> bool {
        {
            let Some(mut current) = self.by_id.get_mut(&expected.id) else {
                return false;
            };
            if !Arc::ptr_eq(current.value(), expected) {
                return false;
            }
            *current.value_mut() = Arc::clone(&next);
        }
        self.publish_row(&next);
        if expected.row_id != next.row_id {
            self.by_row.remove_if(&expected.row_id, |_, cur| Arc::ptr_eq(cur, expected));
        }
        true
    }

    /// Unpublish a document; returns the version that was live.
    pub fn remove(&self, id: &str) -> Option<Arc<StoredDocument>> {
        let (_, doc) = self.by_id.remove(id)?;
        self.by_row.remove_if(&doc.row_id, |_, current| Arc::ptr_eq(current, &doc));
        Some(doc)
    }

    /// Every live document, ordered by row id.
    pub fn snapshot(&self) -> Vec<Arc<StoredDocument>> {
        let mut docs: Vec<_> = self.by_id.iter().map(|d| Arc::clone(d.value())).collect();
        docs.sort_by_key(|d| d.row_id);
        docs
    }

    /// Re-insert a persisted document during load.
    pub(crate) fn restore(&self, doc: StoredDocument) -> Result<()> {
        let row = doc.row_id;
        self.insert_new(Arc::new(doc))?;
        self.next_row.fetch_max(row + 1, Ordering::Relaxed);
        Ok(())
    }

    pub(crate) fn set_next_row(&self, next: RowId) {
        self.next_row.fetch_max(next, Ordering::Relaxed);
    }
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new()
    }
}
