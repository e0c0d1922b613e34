//! Table catalog and the explicit current-table session.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use hv_core::{DocId, Document, EngineConfig, FieldDef, FieldValue};

use crate::error::{Result, VectorDbError};
use crate::query::{Projection, SearchRequest, SearchResponse};
use crate::table::{validate_name, BatchResult, Selector, Table};

/// Owns every open table of one engine instance.
///
/// Create and drop take the catalog entry for that name only; operations on
/// other tables proceed concurrently.
pub struct TableManager {
    config: EngineConfig,
    tables: DashMap<String, Arc<Table>>,
}

impl TableManager {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            tables: DashMap::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn create_table(&self, name: &str, defs: &[FieldDef]) -> Result<Arc<Table>> {
        validate_name(name)?;
        match self.tables.entry(name.to_string()) {
            Entry::Occupied(_) => Err(VectorDbError::TableAlreadyExists(name.to_string())),
            Entry::Vacant(slot) => {
                let table = Arc::new(Table::create(name, defs, self.config.clone())?);
                slot.insert(Arc::clone(&table));
                Ok(table)
            }
        }
    }

    /// Rehydrate `root_dir/<name>` and register it.
    pub fn load_table(&self, name: &str, root_dir: &Path, model_name: Option<&str>) -> Result<Arc<Table>> {
        validate_name(name)?;
        match self.tables.entry(name.to_string()) {
            Entry::Occupied(_) => Err(VectorDbError::TableAlreadyExists(name.to_string())),
            Entry::Vacant(slot) => {
                let table = Arc::new(Table::load(name, &root_dir.join(name), model_name, self.config.clone())?);
                slot.insert(Arc::clone(&table));
                Ok(table)
            }
        }
    }

    /// Table names, sorted.
    pub fn list_tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn table(&self, name: &str) -> Result<Arc<Table>> {
        self.tables
            .get(name)
            .map(|t| Arc::clone(t.value()))
            .ok_or_else(|| VectorDbError::TableNotFound(name.to_string()))
    }

    pub fn with_table<F, R>(&self, name: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Table) -> R,
    {
        let table = self.table(name)?;
        Ok(f(&table))
    }

    /// Unregister a table and remove its directory.
    pub fn drop_table(&self, name: &str) -> Result<()> {
        let (_, table) = self
            .tables
            .remove(name)
            .ok_or_else(|| VectorDbError::TableNotFound(name.to_string()))?;
        table.destroy()?;
        tracing::info!(table = %name, "dropped table");
        Ok(())
    }

    /// Persist every table. All tables are attempted; the first error is returned.
    pub fn close(&self) -> Result<()> {
        let mut first_err = None;
        for table in self.tables() {
            if let Err(e) = table.persist() {
                tracing::warn!(table = %table.name(), error = %e, "persist failed");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Compact every table once. Returns the number of segments rebuilt.
    pub fn compact_all(&self) -> Result<usize> {
        let mut rebuilt = 0;
        for table in self.tables() {
            rebuilt += table.compact()?;
        }
        Ok(rebuilt)
    }

    pub fn session(self: &Arc<Self>) -> Session {
        Session {
            manager: Arc::clone(self),
            current: None,
        }
    }

    fn tables(&self) -> Vec<Arc<Table>> {
        self.tables.iter().map(|e| Arc::clone(e.value())).collect()
    }
}

impl Drop for TableManager {
    fn drop(&mut self) {
        if self.config.storage.persist_on_close {
            let _ = self.close();
        }
    }
}

/// A caller's handle with its own current table.
///
/// Table-less operations target the current table, which is set by
/// `create_table`, `use_table` and `load_table`.
pub struct Session {
    manager: Arc<TableManager>,
    current: Option<String>,
}

impl Session {
    pub fn manager(&self) -> &Arc<TableManager> {
        &self.manager
    }

    pub fn current_table(&self) -> Option<&str> {
        self.current.as_deref()
    }

    fn current(&self) -> Result<Arc<Table>> {
        let name = self.current.as_deref().ok_or(VectorDbError::NoCurrentTable)?;
        self.manager.table(name)
    }

    pub fn create_table(&mut self, name: &str, defs: &[FieldDef]) -> Result<Arc<Table>> {
        let table = self.manager.create_table(name, defs)?;
        self.current = Some(name.to_string());
        Ok(table)
    }

    pub fn use_table(&mut self, name: &str) -> Result<()> {
        if !self.manager.has_table(name) {
            return Err(VectorDbError::TableNotFound(name.to_string()));
        }
        self.current = Some(name.to_string());
        Ok(())
    }

    pub fn load_table(&mut self, name: &str, root_dir: &Path, model_name: Option<&str>) -> Result<Arc<Table>> {
        let table = self.manager.load_table(name, root_dir, model_name)?;
        self.current = Some(name.to_string());
        Ok(table)
    }

    pub fn list_tables(&self) -> Vec<String> {
        self.manager.list_tables()
    }

    pub fn drop_table(&mut self, name: &str) -> Result<()> {
        self.manager.drop_table(name)?;
        if self.current.as_deref() == Some(name) {
            self.current = None;
        }
        Ok(())
    }

    pub fn add(&self, docs: Vec<Document>) -> Result<BatchResult> {
        Ok(self.current()?.add(docs))
    }

    pub fn get(&self, selector: &Selector, projection: &Projection) -> Result<Vec<Document>> {
        self.current()?.get(selector, projection)
    }

    pub fn update(&self, id: &str, partial: BTreeMap<String, FieldValue>) -> Result<()> {
        self.current()?.update(id, partial)
    }

    pub fn upsert(&self, doc: Document) -> Result<DocId> {
        self.current()?.upsert(doc)
    }

    pub fn delete(&self, selector: &Selector) -> Result<usize> {
        self.current()?.delete(selector)
    }

    pub fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        self.current()?.search(request)
    }
}
