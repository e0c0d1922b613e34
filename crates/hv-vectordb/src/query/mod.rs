//! Hybrid search: request/response types, planning and execution.

mod executor;
mod planner;
mod projection;

pub use projection::Projection;

pub(crate) use executor::execute;
pub(crate) use planner::plan;

use std::collections::BTreeMap;
use std::time::Duration;

use hv_core::{DocId, FieldValue, FilterMode, MetricType, MultiVectorLogic};
use serde::Serialize;

use crate::error::{Result, VectorDbError};
use crate::filter::Filter;

/// One `(field, vector, weight)` term of a search.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorQuery {
    pub field: String,
    pub vector: Vec<f32>,
    pub weight: f32,
}

/// A similarity search, optionally over several vector fields.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub queries: Vec<VectorQuery>,
    /// Defaults to the engine's `search.default_top_n`.
    pub top_n: Option<usize>,
    pub metric: MetricType,
    pub filter: Option<Filter>,
    /// Inclusive score bounds.
    pub min_score: Option<f32>,
    pub max_score: Option<f32>,
    pub brute_force: bool,
    pub include_fields: Option<Vec<String>>,
    pub exclude_fields: Option<Vec<String>>,
    pub pack_fields: Option<Vec<String>>,
    pub filter_mode: Option<FilterMode>,
    pub multi_vector_logic: Option<MultiVectorLogic>,
    pub timeout: Option<Duration>,
}

impl SearchRequest {
    pub fn new(field: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            queries: vec![VectorQuery { field: field.into(), vector, weight: 1.0 }],
            top_n: None,
            metric: MetricType::default(),
            filter: None,
            min_score: None,
            max_score: None,
            brute_force: false,
            include_fields: None,
            exclude_fields: None,
            pack_fields: None,
            filter_mode: None,
            multi_vector_logic: None,
            timeout: None,
        }
    }

    /// Set the weight of the most recently added query term.
    pub fn weight(mut self, weight: f32) -> Self {
        if let Some(last) = self.queries.last_mut() {
            last.weight = weight;
        }
        self
    }

    pub fn add_query(mut self, field: impl Into<String>, vector: Vec<f32>, weight: f32) -> Self {
        self.queries.push(VectorQuery { field: field.into(), vector, weight });
        self
    }

    pub fn top_n(mut self, n: usize) -> Self {
        self.top_n = Some(n);
        self
    }

    pub fn metric(mut self, metric: MetricType) -> Self {
        self.metric = metric;
        self
    }

    /// Set the metric by name (`l2`, `ip`, `inner_product`, ...).
    pub fn metric_name(self, name: &str) -> Result<Self> {
        let metric = name
            .parse::<MetricType>()
            .map_err(|_| VectorDbError::InvalidMetric(name.to_string()))?;
        Ok(self.metric(metric))
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn score_range(mut self, min: Option<f32>, max: Option<f32>) -> Self {
        self.min_score = min;
        self.max_score = max;
        self
    }

    pub fn brute_force(mut self, on: bool) -> Self {
        self.brute_force = on;
        self
    }

    pub fn include_fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.include_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn exclude_fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.exclude_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn pack_fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.pack_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn filter_mode(mut self, mode: FilterMode) -> Self {
        self.filter_mode = Some(mode);
        self
    }

    pub fn multi_vector_logic(mut self, logic: MultiVectorLogic) -> Self {
        self.multi_vector_logic = Some(logic);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: DocId,
    pub score: f32,
    pub fields: BTreeMap<String, FieldValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
    /// Candidates that passed score bounds and filters, before truncation to top-n.
    pub total: usize,
}

impl SearchResponse {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.hits.iter().map(|h| h.id.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }
}
