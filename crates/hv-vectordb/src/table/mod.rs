//! A named table: schema registry, document store and one segmented
//! vector index per vector field, plus its on-disk layout.
//!
//! Layout under the table directory:
//! - `table_meta.json`: name, model name, timestamps, schema, next row id
//! - `records.json`: ids, row ids and non-vector fields
//! - `vectors/<field>.bin`: binary vectors per vector field

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use hv_core::{DocId, Document, EngineConfig, FieldDef, FieldValue, RowId};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Result, VectorDbError};
use crate::filter::Filter;
use crate::index::{IndexStats, SegmentedIndex, VectorIndex};
use crate::query::{self, Projection, SearchRequest, SearchResponse};
use crate::schema::{FieldSchema, SchemaRegistry};
use crate::store::{decode_vectors, encode_vectors, is_path_component, DocumentStore, FileStore, StoredDocument};

const META_FILE: &str = "table_meta.json";
const RECORDS_FILE: &str = "records.json";
const VECTORS_DIR: &str = "vectors";

/// Which documents a get or delete addresses.
#[derive(Debug, Clone)]
pub enum Selector {
    Ids(Vec<DocId>),
    Filter(Filter),
}

impl Selector {
    pub fn ids<S: Into<DocId>>(ids: impl IntoIterator<Item = S>) -> Self {
        Self::Ids(ids.into_iter().map(Into::into).collect())
    }

    pub fn id(id: impl Into<DocId>) -> Self {
        Self::Ids(vec![id.into()])
    }
}

impl From<Filter> for Selector {
    fn from(filter: Filter) -> Self {
        Self::Filter(filter)
    }
}

/// Result of adding one document of a batch.
#[derive(Debug)]
pub enum DocOutcome {
    Added(DocId),
    Failed(VectorDbError),
}

impl DocOutcome {
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Added(id) => Some(id.as_str()),
            Self::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&VectorDbError> {
        match self {
            Self::Added(_) => None,
            Self::Failed(e) => Some(e),
        }
    }
}

/// Per-document outcomes of `Table::add`, in input order.
#[derive(Debug, Default)]
pub struct BatchResult {
    pub outcomes: Vec<DocOutcome>,
}

impl BatchResult {
    /// Ids of the documents that were added.
    pub fn ids(&self) -> Vec<&str> {
        self.outcomes.iter().filter_map(DocOutcome::id).collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = (usize, &VectorDbError)> + '_ {
        self.outcomes.iter().enumerate().filter_map(|(i, o)| o.error().map(|e| (i, e)))
    }

    pub fn added(&self) -> usize {
        self.outcomes.iter().filter(|o| matches!(o, DocOutcome::Added(_))).count()
    }

    pub fn is_ok(&self) -> bool {
        self.failures().next().is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMeta {
    pub name: String,
    #[serde(default)]
    pub model_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedMeta {
    #[serde(flatten)]
    meta: TableMeta,
    #[serde(default)]
    fields: Vec<FieldSchema>,
    #[serde(default)]
    next_row: RowId,
}

#[derive(Debug, Serialize, Deserialize)]
struct Record {
    id: DocId,
    row_id: RowId,
    #[serde(default)]
    fields: BTreeMap<String, FieldValue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableStats {
    pub name: String,
    pub documents: usize,
    pub fields: usize,
    pub indexes: BTreeMap<String, IndexStats>,
}

/// Table names become directory names, so keep them to one path component.
pub(crate) fn validate_name(name: &str) -> Result<()> {
    if is_path_component(name) {
        Ok(())
    } else {
        Err(VectorDbError::InvalidRequest(format!("invalid table name '{name}'")))
    }
}

pub struct Table {
    name: String,
    config: EngineConfig,
    schema: SchemaRegistry,
    store: DocumentStore,
    indexes: DashMap<String, Arc<SegmentedIndex>>,
    files: Option<FileStore>,
    meta: RwLock<TableMeta>,
    /// Held by writes that introduce fields, from validation until the
    /// new fields are registered.
    schema_writes: Mutex<()>,
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table").field("name", &self.name).finish_non_exhaustive()
    }
}

impl Table {
    /// Create an empty table. With a storage root configured the table
    /// directory is initialized immediately.
    pub fn create(name: &str, defs: &[FieldDef], config: EngineConfig) -> Result<Self> {
        validate_name(name)?;
        let schema = SchemaRegistry::with_fields(defs, config.index.max_dimension)?;
        let files = config.storage.root_dir.as_ref().map(|root| FileStore::new(root.join(name)));
        if files.as_ref().is_some_and(|f| f.exists(META_FILE)) {
            return Err(VectorDbError::TableAlreadyExists(name.to_string()));
        }

        let now = Utc::now();
        let table = Self {
            name: name.to_string(),
            schema,
            store: DocumentStore::new(),
            indexes: DashMap::new(),
            files,
            meta: RwLock::new(TableMeta {
                name: name.to_string(),
                model_name: None,
                created_at: now,
                updated_at: now,
            }),
            schema_writes: Mutex::new(()),
            config,
        };
        for (field, dimension) in table.schema.vector_fields() {
            table.index_for(&field, dimension);
        }
        table.persist()?;
        tracing::info!(table = %name, fields = defs.len(), "created table");
        Ok(table)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    pub fn meta(&self) -> TableMeta {
        self.meta.read().clone()
    }

    pub fn model_name(&self) -> Option<String> {
        self.meta.read().model_name.clone()
    }

    pub fn dir(&self) -> Option<&Path> {
        self.files.as_ref().map(FileStore::base_path)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    fn touch(&self) {
        self.meta.write().updated_at = Utc::now();
    }

    fn index_for(&self, field: &str, dimension: usize) -> Arc<SegmentedIndex> {
        let entry = self.indexes.entry(field.to_string()).or_insert_with(|| {
            Arc::new(SegmentedIndex::new(field, dimension, self.config.index.clone()))
        });
        Arc::clone(entry.value())
    }

    // -- writes --

    /// Run `write` for a document carrying `fields`.
    ///
    /// Fields the document introduces are registered only after `write`
    /// succeeds, so a rejected write leaves the schema untouched. Writes that
    /// introduce fields run one at a time; writes over known fields do not wait.
    fn with_schema<T>(&self, fields: &BTreeMap<String, FieldValue>, write: impl FnOnce() -> Result<T>) -> Result<T> {
        if self.schema.check_document(fields)?.is_empty() {
            return write();
        }
        let _guard = self.schema_writes.lock();
        let fresh = self.schema.check_document(fields)?;
        match write() {
            Ok(out) => {
                self.schema.register(fresh);
                Ok(out)
            }
            Err(e) => {
                // indexes opened for a field that never got registered
                for field in fresh.iter().filter(|f| f.kind.dimension().is_some()) {
                    self.indexes.remove(&field.name);
                }
                Err(e)
            }
        }
    }

    /// Add a batch. Each document succeeds or fails on its own.
    pub fn add(&self, docs: Vec<Document>) -> BatchResult {
        let outcomes: Vec<DocOutcome> = docs
            .into_iter()
            .map(|doc| match self.add_one(doc) {
                Ok(id) => DocOutcome::Added(id),
                Err(e) => DocOutcome::Failed(e),
            })
            .collect();
        self.touch();
        let result = BatchResult { outcomes };
        tracing::debug!(table = %self.name, added = result.added(), total = result.outcomes.len(), "add batch");
        result
    }

    /// Add a single document and return its id.
    pub fn add_one(&self, doc: Document) -> Result<DocId> {
        let Document { id, fields } = doc;
        if id.as_deref() == Some("") {
            return Err(VectorDbError::invalid_value(hv_core::ID_FIELD, "ids must not be empty"));
        }
        let schema_fields = fields.clone();
        let id = self.with_schema(&schema_fields, || {
            let id = match id {
                Some(id) if self.store.contains(&id) => return Err(VectorDbError::DuplicateId(id)),
                Some(id) => id,
                None => self.generate_id()?,
            };
            self.insert_version(id, fields)
        })?;
        self.touch();
        Ok(id)
    }

    fn generate_id(&self) -> Result<DocId> {
        let id = Uuid::new_v4().to_string();
        if !self.store.contains(&id) {
            return Ok(id);
        }
        let retry = Uuid::new_v4().to_string();
        if self.store.contains(&retry) {
            return Err(VectorDbError::IdCollision(retry));
        }
        Ok(retry)
    }

    /// Index every vector under a fresh row, then publish the document.
    fn insert_version(&self, id: DocId, fields: BTreeMap<String, FieldValue>) -> Result<DocId> {
        let row = self.store.allocate_row();
        self.index_vectors(row, &fields)?;
        let doc = Arc::new(StoredDocument { id: id.clone(), row_id: row, fields });
        if let Err(e) = self.store.insert_new(Arc::clone(&doc)) {
            self.unindex(&doc);
            tracing::warn!(table = %self.name, id = %id, "lost insert race, rolled back index entries");
            return Err(e);
        }
        Ok(id)
    }

    /// Insert all vectors of `fields` under `row`; on failure nothing stays indexed.
    fn index_vectors(&self, row: RowId, fields: &BTreeMap<String, FieldValue>) -> Result<()> {
        let mut done: Vec<Arc<SegmentedIndex>> = Vec::new();
        for (name, value) in fields {
            let Some(vector) = value.as_vector() else {
                continue;
            };
            let index = self.index_for(name, vector.len());
            if let Err(e) = index.insert(row, vector) {
                for index in &done {
                    index.delete(row);
                }
                return Err(e);
            }
            done.push(index);
        }
        Ok(())
    }

    fn unindex(&self, doc: &StoredDocument) {
        for (name, value) in &doc.fields {
            if value.is_vector() {
                if let Some(index) = self.indexes.get(name) {
                    index.delete(doc.row_id);
                }
            }
        }
    }

    /// Swap `current` for a version holding `fields`.
    ///
    /// With `reindex` the new version gets a fresh row and every vector is
    /// inserted before publication; the old row is tombstoned afterwards.
    /// Returns false when another writer published first.
    fn publish_version(
        &self,
        current: &Arc<StoredDocument>,
        fields: BTreeMap<String, FieldValue>,
        reindex: bool,
    ) -> Result<bool> {
        let row = if reindex { self.store.allocate_row() } else { current.row_id };
        if reindex {
            self.index_vectors(row, &fields)?;
        }
        let next = Arc::new(StoredDocument { id: current.id.clone(), row_id: row, fields });
        if self.store.replace(current, Arc::clone(&next)) {
            if reindex {
                self.unindex(current);
            }
            return Ok(true);
        }
        if reindex {
            self.unindex(&next);
        }
        Ok(false)
    }

    /// Merge `partial` into an existing document.
    pub fn update(&self, id: &str, partial: BTreeMap<String, FieldValue>) -> Result<()> {
        let reindex = partial.values().any(FieldValue::is_vector);
        self.with_schema(&partial, || {
            for _ in 0..2 {
                let current = self
                    .store
                    .get(id)
                    .ok_or_else(|| VectorDbError::DocumentNotFound(id.to_string()))?;
                let mut merged = current.fields.clone();
                merged.extend(partial.iter().map(|(k, v)| (k.clone(), v.clone())));
                if self.publish_version(&current, merged, reindex)? {
                    return Ok(());
                }
            }
            Err(VectorDbError::ConcurrentModification(id.to_string()))
        })?;
        self.touch();
        Ok(())
    }

    /// Add `doc`, or replace every field of the existing document with that id.
    pub fn upsert(&self, doc: Document) -> Result<DocId> {
        let Some(id) = doc.id.clone() else {
            return self.add_one(doc);
        };
        if id.is_empty() {
            return Err(VectorDbError::invalid_value(hv_core::ID_FIELD, "ids must not be empty"));
        }
        self.with_schema(&doc.fields, || {
            for _ in 0..2 {
                let published = match self.store.get(&id) {
                    Some(current) => self.publish_version(&current, doc.fields.clone(), true)?,
                    None => match self.insert_version(id.clone(), doc.fields.clone()) {
                        Ok(_) => true,
                        Err(VectorDbError::DuplicateId(_)) => false,
                        Err(e) => return Err(e),
                    },
                };
                if published {
                    return Ok(());
                }
            }
            Err(VectorDbError::ConcurrentModification(id.clone()))
        })?;
        self.touch();
        Ok(id)
    }

    /// Delete the selected documents and tombstone their index entries.
    pub fn delete(&self, selector: &Selector) -> Result<usize> {
        let ids: Vec<DocId> = match selector {
            Selector::Ids(ids) => ids.clone(),
            Selector::Filter(filter) => {
                filter.validate(&self.schema, self.config.search.filter_mode)?;
                self.store
                    .snapshot()
                    .into_iter()
                    .filter(|doc| filter.matches(&doc.fields))
                    .map(|doc| doc.id.clone())
                    .collect()
            }
        };
        let mut deleted = 0;
        for id in &ids {
            if let Some(doc) = self.store.remove(id) {
                self.unindex(&doc);
                deleted += 1;
            }
        }
        if deleted > 0 {
            self.touch();
        }
        tracing::debug!(table = %self.name, deleted, "delete");
        Ok(deleted)
    }

    // -- reads --

    /// Selected documents, projected. Absent ids are skipped.
    pub fn get(&self, selector: &Selector, projection: &Projection) -> Result<Vec<Document>> {
        projection.validate(&self.schema)?;
        let docs: Vec<Arc<StoredDocument>> = match selector {
            Selector::Ids(ids) => ids.iter().filter_map(|id| self.store.get(id)).collect(),
            Selector::Filter(filter) => {
                filter.validate(&self.schema, self.config.search.filter_mode)?;
                self.store
                    .snapshot()
                    .into_iter()
                    .filter(|doc| filter.matches(&doc.fields))
                    .collect()
            }
        };
        Ok(docs
            .iter()
            .map(|doc| Document {
                id: Some(doc.id.clone()),
                fields: projection.apply(&doc.fields),
            })
            .collect())
    }

    pub fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        if self.store.is_empty() {
            return Ok(SearchResponse::empty());
        }
        let plan = query::plan(request, &self.schema, &self.config.search)?;
        query::execute(&plan, &self.store, &self.indexes)
    }

    // -- maintenance --

    /// Rebuild index segments with too many tombstones. Returns segments rebuilt.
    pub fn compact(&self) -> Result<usize> {
        let indexes: Vec<Arc<SegmentedIndex>> = self.indexes.iter().map(|e| Arc::clone(e.value())).collect();
        let mut rebuilt = 0;
        for index in indexes {
            if index.needs_compaction() {
                rebuilt += index.compact()?;
            }
        }
        Ok(rebuilt)
    }

    pub fn stats(&self) -> TableStats {
        TableStats {
            name: self.name.clone(),
            documents: self.store.len(),
            fields: self.schema.len(),
            indexes: self
                .indexes
                .iter()
                .map(|e| (e.key().clone(), e.value().stats()))
                .collect(),
        }
    }

    // -- persistence --

    /// Write the table to its directory. A no-op for volatile tables.
    pub fn persist(&self) -> Result<()> {
        let Some(ref files) = self.files else {
            return Ok(());
        };
        let docs = self.store.snapshot();
        let vector_fields = self.schema.vector_fields();

        for (field, dimension) in &vector_fields {
            let entries: Vec<(RowId, Vec<f32>)> = docs
                .iter()
                .filter_map(|doc| doc.vector(field).map(|v| (doc.row_id, v.to_vec())))
                .collect();
            let bytes = encode_vectors(*dimension, &entries)?;
            files.put(&format!("{VECTORS_DIR}/{field}.bin"), &bytes)?;
        }

        let records: Vec<Record> = docs
            .iter()
            .map(|doc| Record {
                id: doc.id.clone(),
                row_id: doc.row_id,
                fields: doc
                    .fields
                    .iter()
                    .filter(|(_, v)| !v.is_vector())
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            })
            .collect();
        files.put(RECORDS_FILE, &serde_json::to_vec(&records)?)?;

        let meta = PersistedMeta {
            meta: self.meta(),
            fields: self.schema.fields(),
            next_row: self.store.next_row(),
        };
        files.put(META_FILE, &serde_json::to_vec_pretty(&meta)?)?;
        tracing::info!(table = %self.name, documents = docs.len(), path = %files.base_path().display(), "persisted table");
        Ok(())
    }

    /// Rehydrate a table persisted under `dir`.
    pub fn load(name: &str, dir: &Path, model_name: Option<&str>, config: EngineConfig) -> Result<Self> {
        validate_name(name)?;
        let files = FileStore::new(dir);
        let Some(meta_bytes) = files.get(META_FILE)? else {
            return Err(VectorDbError::TableNotFound(name.to_string()));
        };
        let persisted: PersistedMeta = serde_json::from_slice(&meta_bytes)?;
        let schema = SchemaRegistry::from_schemas(&persisted.fields, config.index.max_dimension)?;

        let mut records: BTreeMap<RowId, Record> = BTreeMap::new();
        if let Some(bytes) = files.get(RECORDS_FILE)? {
            let raw: Vec<Value> = serde_json::from_slice(&bytes)?;
            for (i, value) in raw.into_iter().enumerate() {
                match serde_json::from_value::<Record>(value) {
                    Ok(rec) => {
                        records.insert(rec.row_id, rec);
                    }
                    Err(e) => tracing::warn!(table = %name, record = i, error = %e, "skipping corrupt record"),
                }
            }
        }

        for (field, dimension) in schema.vector_fields() {
            let Some(bytes) = files.get(&format!("{VECTORS_DIR}/{field}.bin"))? else {
                continue;
            };
            let (file_dimension, entries) = decode_vectors(&bytes)?;
            if file_dimension != dimension {
                return Err(VectorDbError::Storage(format!(
                    "vectors for '{field}' have dimension {file_dimension}, schema says {dimension}"
                )));
            }
            let mut orphans = 0usize;
            for (row, vector) in entries {
                match records.get_mut(&row) {
                    Some(rec) => {
                        rec.fields.insert(field.clone(), FieldValue::Vector(vector));
                    }
                    None => orphans += 1,
                }
            }
            if orphans > 0 {
                tracing::warn!(table = %name, field = %field, orphans, "vectors without a record were dropped");
            }
        }

        let mut meta = persisted.meta;
        meta.name = name.to_string();
        if let Some(model) = model_name {
            meta.model_name = Some(model.to_string());
        }
        let table = Self {
            name: name.to_string(),
            schema,
            store: DocumentStore::new(),
            indexes: DashMap::new(),
            files: Some(files),
            meta: RwLock::new(meta),
            schema_writes: Mutex::new(()),
            config,
        };

        let mut per_field: BTreeMap<String, Vec<(RowId, Vec<f32>)>> = BTreeMap::new();
        for (row, rec) in records {
            let vectors: Vec<(String, Vec<f32>)> = rec
                .fields
                .iter()
                .filter_map(|(field, value)| value.as_vector().map(|v| (field.clone(), v.to_vec())))
                .collect();
            let id = rec.id.clone();
            match table.store.restore(StoredDocument { id: rec.id, row_id: row, fields: rec.fields }) {
                Ok(()) => {
                    for (field, v) in vectors {
                        per_field.entry(field).or_default().push((row, v));
                    }
                }
                Err(e) => tracing::warn!(table = %name, id = %id, error = %e, "skipping duplicate record"),
            }
        }
        for (field, dimension) in table.schema.vector_fields() {
            let index = table.index_for(&field, dimension);
            index.load_entries(per_field.remove(&field).unwrap_or_default())?;
        }
        table.store.set_next_row(persisted.next_row);

        tracing::info!(table = %name, documents = table.len(), path = %dir.display(), "loaded table");
        Ok(table)
    }

    /// Remove the table directory, if any.
    pub fn destroy(&self) -> Result<()> {
        if let Some(ref files) = self.files {
            files.destroy()?;
            tracing::info!(table = %self.name, "removed table directory");
        }
        Ok(())
    }
}
