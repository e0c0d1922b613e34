//! Per-table field schema, inferred lazily from the documents written.
//!
//! The first write that lands with a field fixes its kind (and dimension,
//! for vectors). Later values must agree; disagreements are rejected before
//! anything is committed.

use std::collections::BTreeMap;

use hv_core::{FieldDef, FieldKind, FieldValue, ID_FIELD};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VectorDbError};
use crate::store::is_path_component;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    #[serde(flatten)]
    pub kind: FieldKind,
}

pub struct SchemaRegistry {
    fields: RwLock<BTreeMap<String, FieldKind>>,
    max_dimension: usize,
}

impl SchemaRegistry {
    pub fn new(max_dimension: usize) -> Self {
        Self {
            fields: RwLock::new(BTreeMap::new()),
            max_dimension,
        }
    }

    /// Registry pre-seeded from declared field definitions.
    pub fn with_fields(defs: &[FieldDef], max_dimension: usize) -> Result<Self> {
        let registry = Self::new(max_dimension);
        {
            let mut fields = registry.fields.write();
            for def in defs {
                check_name(&def.name)?;
                let kind = def.kind()?;
                registry.check_dimension(&def.name, &kind)?;
                if let Some(existing) = fields.get(&def.name) {
                    if *existing != kind {
                        return Err(mismatch(&def.name, existing, &kind));
                    }
                }
                fields.insert(def.name.clone(), kind);
            }
        }
        Ok(registry)
    }

    /// Rebuild from persisted field schemas.
    pub fn from_schemas(schemas: &[FieldSchema], max_dimension: usize) -> Result<Self> {
        let registry = Self::new(max_dimension);
        for schema in schemas {
            check_name(&schema.name)?;
        }
        registry.fields.write().extend(schemas.iter().map(|s| (s.name.clone(), s.kind)));
        Ok(registry)
    }

    /// Validate a document against the registered kinds without changing
    /// anything. Returns the fields it would introduce.
    pub fn check_document(&self, values: &BTreeMap<String, FieldValue>) -> Result<Vec<FieldSchema>> {
        let fields = self.fields.read();
        let mut fresh = Vec::new();
        for (name, value) in values {
            let kind = self.classify(name, value)?;
            match fields.get(name.as_str()) {
                Some(existing) => {
                    check_compatible(name, existing, &kind)?;
                }
                None => fresh.push(FieldSchema { name: name.clone(), kind }),
            }
        }
        Ok(fresh)
    }

    /// Record fields introduced by a committed write. A field registered in
    /// the meantime keeps its existing kind.
    pub fn register(&self, fresh: Vec<FieldSchema>) {
        if fresh.is_empty() {
            return;
        }
        let mut fields = self.fields.write();
        for FieldSchema { name, kind } in fresh {
            fields.entry(name).or_insert_with_key(|name| {
                tracing::debug!(field = %name, kind = %kind, "registered new field");
                kind
            });
        }
    }

    #[cfg(test)]
    pub(crate) fn observe(&self, name: &str, value: &FieldValue) -> Result<()> {
        let doc = BTreeMap::from([(name.to_string(), value.clone())]);
        let fresh = self.check_document(&doc)?;
        self.register(fresh);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<FieldKind> {
        self.fields.read().get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.read().contains_key(name)
    }

    pub fn fields(&self) -> Vec<FieldSchema> {
        self.fields
            .read()
            .iter()
            .map(|(name, kind)| FieldSchema { name: name.clone(), kind: *kind })
            .collect()
    }

    /// `(name, dimension)` for every vector field.
    pub fn vector_fields(&self) -> Vec<(String, usize)> {
        self.fields
            .read()
            .iter()
            .filter_map(|(name, kind)| kind.dimension().map(|d| (name.clone(), d)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.fields.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn classify(&self, name: &str, value: &FieldValue) -> Result<FieldKind> {
        check_name(name)?;
        if let FieldValue::Vector(v) = value {
            if v.iter().any(|x| !x.is_finite()) {
                return Err(VectorDbError::invalid_value(name, "vector components must be finite"));
            }
        }
        if let FieldValue::Float(f) = value {
            if !f.is_finite() {
                return Err(VectorDbError::invalid_value(name, "numbers must be finite"));
            }
        }
        let kind = value.kind();
        self.check_dimension(name, &kind)?;
        Ok(kind)
    }

    fn check_dimension(&self, name: &str, kind: &FieldKind) -> Result<()> {
        if let Some(dim) = kind.dimension() {
            if dim == 0 || dim > self.max_dimension {
                return Err(VectorDbError::invalid_value(
                    name,
                    format!("dimension {dim} outside 1..={}", self.max_dimension),
                ));
            }
        }
        Ok(())
    }
}

/// Field names double as vector file names, so they must be one path component.
fn check_name(name: &str) -> Result<()> {
    if name == ID_FIELD {
        return Err(VectorDbError::invalid_value(ID_FIELD, "the id field is reserved"));
    }
    if !is_path_component(name) {
        return Err(VectorDbError::invalid_value(name, "field names must not be empty or contain path separators"));
    }
    Ok(())
}

fn check_compatible(name: &str, existing: &FieldKind, got: &FieldKind) -> Result<()> {
    if existing.accepts(got) {
        return Ok(());
    }
    Err(mismatch(name, existing, got))
}

fn mismatch(name: &str, existing: &FieldKind, got: &FieldKind) -> VectorDbError {
    match (existing, got) {
        (FieldKind::Vector { dimension: expected }, FieldKind::Vector { dimension: actual }) => {
            VectorDbError::DimensionMismatch {
                field: name.to_string(),
                expected: *expected,
                got: *actual,
            }
        }
        _ => VectorDbError::SchemaMismatch {
            field: name.to_string(),
            expected: existing.to_string(),
            got: got.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hv_core::DataType;

    #[test]
    fn test_first_writer_wins() {
        let reg = SchemaRegistry::new(16);
        reg.observe("price", &FieldValue::Int(3)).unwrap();
        assert!(reg.observe("price", &FieldValue::Float(2.5)).is_ok());
        let err = reg.observe("price", &FieldValue::from("x")).unwrap_err();
        assert!(matches!(err, VectorDbError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_vector_dimension_fixed() {
        let reg = SchemaRegistry::new(16);
        reg.observe("emb", &FieldValue::Vector(vec![1.0, 0.0])).unwrap();
        let err = reg.observe("emb", &FieldValue::Vector(vec![1.0, 0.0, 0.0])).unwrap_err();
        assert!(matches!(err, VectorDbError::DimensionMismatch { expected: 2, got: 3, .. }));
    }

    #[test]
    fn test_document_is_all_or_nothing() {
        let reg = SchemaRegistry::new(16);
        reg.observe("name", &FieldValue::from("a")).unwrap();
        let mut doc = BTreeMap::new();
        doc.insert("fresh".to_string(), FieldValue::Int(1));
        doc.insert("name".to_string(), FieldValue::Int(2));
        assert!(reg.check_document(&doc).is_err());
        assert!(!reg.contains("fresh"));
    }

    #[test]
    fn test_check_reports_fresh_fields_only() {
        let reg = SchemaRegistry::new(16);
        reg.observe("name", &FieldValue::from("a")).unwrap();
        let doc = BTreeMap::from([
            ("name".to_string(), FieldValue::from("b")),
            ("color".to_string(), FieldValue::from("red")),
        ]);
        let fresh = reg.check_document(&doc).unwrap();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].name, "color");
        assert!(!reg.contains("color"));

        reg.register(fresh);
        assert!(reg.contains("color"));
        // a late registration never overrides the committed kind
        reg.register(vec![FieldSchema { name: "color".into(), kind: FieldValue::Int(1).kind() }]);
        assert_eq!(reg.get("color"), Some(FieldValue::from("x").kind()));
    }

    #[test]
    fn test_field_names_are_path_safe() {
        let reg = SchemaRegistry::new(4);
        for bad in ["", ".", "..", "../../escaped", "a/b", "a\\b", "nul\0"] {
            let doc = BTreeMap::from([(bad.to_string(), FieldValue::Vector(vec![1.0]))]);
            assert!(matches!(reg.check_document(&doc), Err(VectorDbError::InvalidValue { .. })), "{bad:?}");
        }
        assert!(SchemaRegistry::with_fields(&[FieldDef::vector("../v", 2)], 4).is_err());
        let persisted = [FieldSchema { name: "a/b".into(), kind: FieldValue::Int(1).kind() }];
        assert!(SchemaRegistry::from_schemas(&persisted, 4).is_err());
        assert!(reg.observe("title.en", &FieldValue::from("ok")).is_ok());
    }

    #[test]
    fn test_rejects_bad_vectors_and_reserved_id() {
        let reg = SchemaRegistry::new(4);
        assert!(reg.observe("v", &FieldValue::Vector(vec![f32::NAN])).is_err());
        assert!(reg.observe("v", &FieldValue::Vector(vec![0.0; 5])).is_err());
        assert!(reg.observe(ID_FIELD, &FieldValue::from("x")).is_err());
        assert!(SchemaRegistry::with_fields(&[FieldDef::new(ID_FIELD, DataType::String)], 4).is_err());
    }

    #[test]
    fn test_declared_fields() {
        let reg = SchemaRegistry::with_fields(
            &[FieldDef::new("tags", DataType::MultiString), FieldDef::vector("emb", 3)],
            16,
        )
        .unwrap();
        assert!(reg.observe("tags", &FieldValue::from("solo")).is_ok());
        assert_eq!(reg.vector_fields(), vec![("emb".to_string(), 3)]);
    }
}
