use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};

/// Reserved document key carrying the document identifier.
pub const ID_FIELD: &str = "_id";

/// Caller-visible document identifier, unique within a table.
pub type DocId = String;

/// Opaque internal row id linking a document version to its index entries.
pub type RowId = u64;

/// A single field value.
///
/// Untagged so that plain JSON documents map directly onto it:
/// integers, floats, strings, string lists and numeric arrays (vectors).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    String(String),
    MultiString(Vec<String>),
    Vector(Vec<f32>),
}

impl FieldValue {
    /// Infer a value from JSON, the way an untyped document is onboarded.
    pub fn from_json(field: &str, v: &Value) -> Result<Self> {
        let invalid = |reason: &str| CoreError::InvalidValue {
            field: field.to_string(),
            reason: reason.to_string(),
        };
        match v {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Self::Int(i))
                } else {
                    n.as_f64().map(Self::Float).ok_or_else(|| invalid("unrepresentable number"))
                }
            }
            Value::String(s) => Ok(Self::String(s.clone())),
            Value::Array(arr) => {
                if arr.is_empty() {
                    return Err(invalid("empty arrays have no inferable type"));
                }
                if arr.iter().all(Value::is_number) {
                    let vector = arr.iter()
                        .filter_map(|x| x.as_f64().map(|f| f as f32))
                        .collect::<Vec<_>>();
                    if vector.iter().any(|x| !x.is_finite()) {
                        return Err(invalid("vector components must be finite"));
                    }
                    Ok(Self::Vector(vector))
                } else if arr.iter().all(Value::is_string) {
                    Ok(Self::MultiString(
                        arr.iter().filter_map(|x| x.as_str().map(str::to_string)).collect(),
                    ))
                } else {
                    Err(invalid("arrays must hold only numbers or only strings"))
                }
            }
            Value::Null => Err(invalid("null values are not supported")),
            Value::Bool(_) => Err(invalid("booleans are not supported")),
            Value::Object(_) => Err(invalid("nested objects are not supported")),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Int(i) => Value::from(*i),
            Self::Float(f) => Value::from(*f),
            Self::String(s) => Value::from(s.as_str()),
            Self::MultiString(items) => Value::from(items.clone()),
            Self::Vector(v) => Value::Array(v.iter().map(|&x| Value::from(x as f64)).collect()),
        }
    }

    /// The kind this value would register for a field seen for the first time.
    pub fn kind(&self) -> FieldKind {
        match self {
            Self::Int(_) | Self::Float(_) => FieldKind::Numeric,
            Self::String(_) => FieldKind::String,
            Self::MultiString(_) => FieldKind::MultiString,
            Self::Vector(v) => FieldKind::Vector { dimension: v.len() },
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[f32]> {
        match self {
            Self::Vector(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, Self::Vector(_))
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self { Self::Int(v) }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self { Self::Int(v as i64) }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self { Self::Float(v) }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self { Self::String(v.to_string()) }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self { Self::String(v) }
}

impl From<Vec<f32>> for FieldValue {
    fn from(v: Vec<f32>) -> Self { Self::Vector(v) }
}

impl From<Vec<String>> for FieldValue {
    fn from(v: Vec<String>) -> Self { Self::MultiString(v) }
}

/// Kind of a field as tracked by a table's schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Numeric,
    MultiString,
    Vector { dimension: usize },
}

impl FieldKind {
    /// Whether a value of kind `other` may be written into a field of this kind.
    pub fn accepts(&self, other: &FieldKind) -> bool {
        match (self, other) {
            (Self::MultiString, Self::String) => true,
            (a, b) => a == b,
        }
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, Self::Vector { .. })
    }

    pub fn is_textual(&self) -> bool {
        matches!(self, Self::String | Self::MultiString)
    }

    pub fn dimension(&self) -> Option<usize> {
        match self {
            Self::Vector { dimension } => Some(*dimension),
            _ => None,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Numeric => write!(f, "numeric"),
            Self::MultiString => write!(f, "multi_string"),
            Self::Vector { dimension } => write!(f, "vector({dimension})"),
        }
    }
}

/// Declared data type of a field in a table creation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    String,
    Int,
    Float,
    MultiString,
    Vector,
}

impl FromStr for DataType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "string" | "str" | "text" => Ok(Self::String),
            "int" | "int64" | "long" | "integer" => Ok(Self::Int),
            "float" | "float32" | "double" => Ok(Self::Float),
            "multi_string" | "list<string>" => Ok(Self::MultiString),
            "vector" => Ok(Self::Vector),
            other => Err(CoreError::InvalidDataType(other.to_string())),
        }
    }
}

/// Field descriptor supplied at table creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub data_type: DataType,
    #[serde(default)]
    pub dimension: Option<usize>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self { name: name.into(), data_type, dimension: None }
    }

    pub fn vector(name: impl Into<String>, dimension: usize) -> Self {
        Self { name: name.into(), data_type: DataType::Vector, dimension: Some(dimension) }
    }

    /// Resolve the schema kind this descriptor declares.
    pub fn kind(&self) -> Result<FieldKind> {
        match self.data_type {
            DataType::String => Ok(FieldKind::String),
            DataType::Int | DataType::Float => Ok(FieldKind::Numeric),
            DataType::MultiString => Ok(FieldKind::MultiString),
            DataType::Vector => match self.dimension {
                Some(d) if d > 0 => Ok(FieldKind::Vector { dimension: d }),
                _ => Err(CoreError::InvalidValue {
                    field: self.name.clone(),
                    reason: "vector fields need a positive dimension".into(),
                }),
            },
        }
    }
}

/// A record: an optional id plus an ordered mapping of field name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub id: Option<DocId>,
    pub fields: BTreeMap<String, FieldValue>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(id: impl Into<DocId>) -> Self {
        Self { id: Some(id.into()), fields: BTreeMap::new() }
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Build a document from a JSON object. `_id` (string or integer) becomes the id.
    pub fn from_json(v: &Value) -> Result<Self> {
        let obj = v.as_object().ok_or_else(|| CoreError::InvalidValue {
            field: ID_FIELD.into(),
            reason: "a document must be a JSON object".into(),
        })?;
        let mut doc = Document::new();
        for (key, value) in obj {
            if key == ID_FIELD {
                doc.id = match value {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => {
                        return Err(CoreError::InvalidValue {
                            field: ID_FIELD.into(),
                            reason: "ids must be strings or integers".into(),
                        })
                    }
                };
                continue;
            }
            doc.fields.insert(key.clone(), FieldValue::from_json(key, value)?);
        }
        Ok(doc)
    }

    pub fn to_json(&self) -> Value {
        let mut obj = serde_json::Map::new();
        if let Some(ref id) = self.id {
            obj.insert(ID_FIELD.into(), Value::from(id.as_str()));
        }
        for (k, v) in &self.fields {
            obj.insert(k.clone(), v.to_json());
        }
        Value::Object(obj)
    }
}

/// Vector comparison function used to rank neighbors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    /// Squared Euclidean distance; smaller is closer.
    L2,
    /// Dot product; larger is closer.
    InnerProduct,
}

impl Default for MetricType {
    fn default() -> Self {
        Self::L2
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::L2 => write!(f, "l2"),
            Self::InnerProduct => write!(f, "inner_product"),
        }
    }
}

impl FromStr for MetricType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "l2" | "euclidean" => Ok(Self::L2),
            "ip" | "inner_product" | "innerproduct" | "dot" => Ok(Self::InnerProduct),
            other => Err(CoreError::InvalidMetric(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_infers_kinds() {
        assert_eq!(FieldValue::from_json("a", &json!(3)).unwrap().kind(), FieldKind::Numeric);
        assert_eq!(FieldValue::from_json("a", &json!(2.5)).unwrap().kind(), FieldKind::Numeric);
        assert_eq!(FieldValue::from_json("a", &json!("x")).unwrap().kind(), FieldKind::String);
        assert_eq!(
            FieldValue::from_json("a", &json!(["x", "y"])).unwrap().kind(),
            FieldKind::MultiString
        );
        assert_eq!(
            FieldValue::from_json("a", &json!([1, 2.5, 3])).unwrap().kind(),
            FieldKind::Vector { dimension: 3 }
        );
    }

    #[test]
    fn test_from_json_rejects_unsupported() {
        assert!(FieldValue::from_json("a", &json!([])).is_err());
        assert!(FieldValue::from_json("a", &json!([1, "x"])).is_err());
        assert!(FieldValue::from_json("a", &json!(null)).is_err());
        assert!(FieldValue::from_json("a", &json!(true)).is_err());
        assert!(FieldValue::from_json("a", &json!({"k": 1})).is_err());
    }

    #[test]
    fn test_multi_string_accepts_string() {
        assert!(FieldKind::MultiString.accepts(&FieldKind::String));
        assert!(!FieldKind::String.accepts(&FieldKind::MultiString));
        assert!(!FieldKind::Vector { dimension: 3 }.accepts(&FieldKind::Vector { dimension: 4 }));
    }

    #[test]
    fn test_document_json_id() {
        let doc = Document::from_json(&json!({"_id": 7, "name": "n", "v": [1.0, 0.0]})).unwrap();
        assert_eq!(doc.id.as_deref(), Some("7"));
        assert_eq!(doc.fields.len(), 2);
        assert!(doc.get("v").unwrap().is_vector());
        assert_eq!(doc.to_json()["_id"], json!("7"));
        assert!(Document::from_json(&json!({"_id": [1]})).is_err());
        assert!(Document::from_json(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_metric_parse() {
        assert_eq!("L2".parse::<MetricType>().unwrap(), MetricType::L2);
        assert_eq!("ip".parse::<MetricType>().unwrap(), MetricType::InnerProduct);
        assert_eq!("inner_product".parse::<MetricType>().unwrap(), MetricType::InnerProduct);
        assert!("cosine".parse::<MetricType>().is_err());
        assert_eq!(MetricType::default(), MetricType::L2);
    }

    #[test]
    fn test_field_def_kind() {
        assert_eq!(FieldDef::vector("v", 4).kind().unwrap(), FieldKind::Vector { dimension: 4 });
        assert!(FieldDef::new("v", DataType::Vector).kind().is_err());
        assert!(FieldDef::vector("v", 0).kind().is_err());
        assert_eq!("int".parse::<DataType>().unwrap(), DataType::Int);
        assert!("blob".parse::<DataType>().is_err());
    }
}
