//! Filter operations for scalar field filtering.
//!
//! Supports: range, term, text (keyword), and/or logic.

mod text;

pub use text::tokenize;

use std::collections::{BTreeMap, HashSet};

use hv_core::{FieldKind, FieldValue, FilterMode};
use serde_json::Value;

use crate::error::{Result, VectorDbError};
use crate::schema::SchemaRegistry;

/// A filter condition tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Numeric bounds; `gte`/`lte` are inclusive, `gt`/`lt` exclusive.
    Range {
        field: String,
        gt: Option<f64>,
        gte: Option<f64>,
        lt: Option<f64>,
        lte: Option<f64>,
    },
    /// Set membership over a string or multi_string field.
    Term { field: String, values: Vec<String> },
    /// Every term must occur among the field's tokens.
    Text { field: String, terms: Vec<String> },
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    /// Inclusive `[low, high]` range.
    pub fn between(field: impl Into<String>, low: f64, high: f64) -> Self {
        Filter::Range { field: field.into(), gt: None, gte: Some(low), lt: None, lte: Some(high) }
    }

    pub fn term<S: Into<String>>(field: impl Into<String>, values: impl IntoIterator<Item = S>) -> Self {
        Filter::Term {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Keyword filter; `query` is tokenized the same way documents are.
    pub fn text(field: impl Into<String>, query: &str) -> Self {
        Filter::Text { field: field.into(), terms: tokenize(query) }
    }

    /// Parse the JSON DSL:
    /// `{"op": "range", "field": f, "gte": .., "lt": ..}`,
    /// `{"op": "term", "field": f, "conds": [..]}`,
    /// `{"op": "text", "field": f, "query": ".."}`,
    /// `{"op": "and" | "or", "conds": [..]}`.
    pub fn from_json(v: &Value) -> Result<Self> {
        let obj = v.as_object().ok_or_else(|| invalid("a filter must be a JSON object"))?;
        let op = obj
            .get("op")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("missing \"op\""))?;
        let field = || -> Result<String> {
            obj.get("field")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| invalid(format!("\"{op}\" needs a \"field\"")))
        };
        match op {
            "range" => {
                let bound = |key: &str| -> Result<Option<f64>> {
                    match obj.get(key) {
                        None | Some(Value::Null) => Ok(None),
                        Some(x) => x
                            .as_f64()
                            .map(Some)
                            .ok_or_else(|| invalid(format!("range bound \"{key}\" must be a number"))),
                    }
                };
                let filter = Filter::Range {
                    field: field()?,
                    gt: bound("gt")?,
                    gte: bound("gte")?,
                    lt: bound("lt")?,
                    lte: bound("lte")?,
                };
                if let Filter::Range { gt: None, gte: None, lt: None, lte: None, .. } = filter {
                    return Err(invalid("range needs at least one bound"));
                }
                Ok(filter)
            }
            "term" => {
                let values = conds(obj, op)?
                    .iter()
                    .map(|c| match c {
                        Value::String(s) => Ok(s.clone()),
                        _ => Err(invalid("term values must be strings")),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Filter::Term { field: field()?, values })
            }
            "text" => {
                let query = obj
                    .get("query")
                    .and_then(Value::as_str)
                    .ok_or_else(|| invalid("\"text\" needs a \"query\" string"))?;
                Ok(Filter::text(field()?, query))
            }
            "and" => Ok(Filter::And(conds(obj, op)?.iter().map(Filter::from_json).collect::<Result<_>>()?)),
            "or" => Ok(Filter::Or(conds(obj, op)?.iter().map(Filter::from_json).collect::<Result<_>>()?)),
            other => Err(invalid(format!("unknown op \"{other}\""))),
        }
    }

    /// Parse the flat metadata convention.
    ///
    /// `{"color": "red"}` is a term, `{"price": 4.2}` an equality range,
    /// and `max_` / `min_` / `maxe_` / `mine_` key prefixes give exclusive
    /// upper, exclusive lower, inclusive upper and inclusive lower bounds.
    /// Bounds on one field merge into a single range.
    pub fn from_meta_filter(v: &Value) -> Result<Self> {
        let obj = v.as_object().ok_or_else(|| invalid("a metadata filter must be a JSON object"))?;
        let mut ranges: BTreeMap<String, [Option<f64>; 4]> = BTreeMap::new();
        let mut terms = Vec::new();

        for (key, value) in obj {
            match value {
                Value::String(s) => terms.push(Filter::Term { field: key.clone(), values: vec![s.clone()] }),
                Value::Array(items) => {
                    let values = items
                        .iter()
                        .map(|x| x.as_str().map(str::to_string))
                        .collect::<Option<Vec<_>>>()
                        .ok_or_else(|| invalid(format!("\"{key}\": list values must be strings")))?;
                    terms.push(Filter::Term { field: key.clone(), values });
                }
                Value::Number(n) => {
                    let x = n.as_f64().ok_or_else(|| invalid(format!("\"{key}\": unrepresentable number")))?;
                    // [gt, gte, lt, lte]
                    let (field, slot) = if let Some(f) = key.strip_prefix("maxe_") {
                        (f, 3)
                    } else if let Some(f) = key.strip_prefix("mine_") {
                        (f, 1)
                    } else if let Some(f) = key.strip_prefix("max_") {
                        (f, 2)
                    } else if let Some(f) = key.strip_prefix("min_") {
                        (f, 0)
                    } else {
                        let bounds = ranges.entry(key.clone()).or_default();
                        bounds[1] = Some(x);
                        bounds[3] = Some(x);
                        continue;
                    };
                    ranges.entry(field.to_string()).or_default()[slot] = Some(x);
                }
                _ => return Err(invalid(format!("\"{key}\": unsupported filter value"))),
            }
        }

        let mut preds: Vec<Filter> = ranges
            .into_iter()
            .map(|(field, [gt, gte, lt, lte])| Filter::Range { field, gt, gte, lt, lte })
            .collect();
        preds.extend(terms);
        Ok(if preds.len() == 1 { preds.remove(0) } else { Filter::And(preds) })
    }

    /// Check field existence and kinds against the schema, and the combinator mode.
    pub fn validate(&self, schema: &SchemaRegistry, mode: FilterMode) -> Result<()> {
        self.validate_fields(schema)?;
        if mode == FilterMode::Exclusive {
            let (mut ranges, mut terms) = (0, 0);
            self.count_predicates(&mut ranges, &mut terms);
            if ranges > 0 && terms > 0 {
                return Err(VectorDbError::InvalidFilter(
                    "range and term predicates cannot be combined in exclusive mode".into(),
                ));
            }
        }
        Ok(())
    }

    fn validate_fields(&self, schema: &SchemaRegistry) -> Result<()> {
        let lookup = |field: &str| schema.get(field).ok_or_else(|| VectorDbError::UnknownField(field.to_string()));
        match self {
            Filter::Range { field, .. } => {
                if lookup(field)? != FieldKind::Numeric {
                    return Err(type_mismatch(field, "range filters need a numeric field"));
                }
            }
            Filter::Term { field, .. } => {
                if !lookup(field)?.is_textual() {
                    return Err(type_mismatch(field, "term filters need a string field"));
                }
            }
            Filter::Text { field, .. } => {
                if !lookup(field)?.is_textual() {
                    return Err(type_mismatch(field, "text filters need a string field"));
                }
            }
            Filter::And(children) | Filter::Or(children) => {
                for child in children {
                    child.validate_fields(schema)?;
                }
            }
        }
        Ok(())
    }

    fn count_predicates(&self, ranges: &mut usize, terms: &mut usize) {
        match self {
            Filter::Range { .. } => *ranges += 1,
            Filter::Term { .. } => *terms += 1,
            Filter::Text { .. } => {}
            Filter::And(children) | Filter::Or(children) => {
                for child in children {
                    child.count_predicates(ranges, terms);
                }
            }
        }
    }

    /// Evaluate the filter against a document's fields. A missing field never matches.
    pub fn matches(&self, fields: &BTreeMap<String, FieldValue>) -> bool {
        match self {
            Filter::Range { field, gt, gte, lt, lte } => {
                let Some(x) = fields.get(field).and_then(FieldValue::as_f64) else {
                    return false;
                };
                gt.map_or(true, |b| x > b)
                    && gte.map_or(true, |b| x >= b)
                    && lt.map_or(true, |b| x < b)
                    && lte.map_or(true, |b| x <= b)
            }
            Filter::Term { field, values } => match fields.get(field) {
                Some(FieldValue::String(s)) => values.iter().any(|v| v == s),
                Some(FieldValue::MultiString(items)) => items.iter().any(|s| values.contains(s)),
                _ => false,
            },
            Filter::Text { field, terms } => {
                let tokens: HashSet<String> = match fields.get(field) {
                    Some(FieldValue::String(s)) => text::token_set(s),
                    Some(FieldValue::MultiString(items)) => items.iter().flat_map(|s| tokenize(s)).collect(),
                    _ => return false,
                };
                terms.iter().all(|t| tokens.contains(t))
            }
            Filter::And(filters) => filters.iter().all(|f| f.matches(fields)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(fields)),
        }
    }
}

fn conds<'a>(obj: &'a serde_json::Map<String, Value>, op: &str) -> Result<&'a Vec<Value>> {
    obj.get("conds")
        .and_then(Value::as_array)
        .ok_or_else(|| invalid(format!("\"{op}\" needs a \"conds\" array")))
}

fn invalid(msg: impl Into<String>) -> VectorDbError {
    VectorDbError::InvalidFilter(msg.into())
}

fn type_mismatch(field: &str, reason: &str) -> VectorDbError {
    VectorDbError::TypeMismatch { field: field.to_string(), reason: reason.to_string() }
}
