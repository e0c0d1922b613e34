use std::collections::HashSet;
use std::time::Instant;

use hv_core::{FieldKind, MetricType, MultiVectorLogic, SearchConfig};

use super::{Projection, SearchRequest};
use crate::error::{Result, VectorDbError};
use crate::filter::Filter;
use crate::schema::SchemaRegistry;

#[derive(Debug, Clone)]
pub(crate) struct PlannedQuery {
    pub field: String,
    pub vector: Vec<f32>,
    pub weight: f32,
}

/// A validated search, ready to execute.
#[derive(Debug, Clone)]
pub(crate) struct Plan {
    pub queries: Vec<PlannedQuery>,
    pub top_n: usize,
    pub metric: MetricType,
    pub filter: Option<Filter>,
    pub min_score: Option<f32>,
    pub max_score: Option<f32>,
    pub brute_force: bool,
    pub projection: Projection,
    pub logic: MultiVectorLogic,
    pub deadline: Option<Instant>,
    /// Index hits requested per field in the first round.
    pub candidates: usize,
}

/// Validate a request against the table schema. Nothing is mutated.
pub(crate) fn plan(request: &SearchRequest, schema: &SchemaRegistry, config: &SearchConfig) -> Result<Plan> {
    let deadline = request.timeout.map(|t| Instant::now() + t);

    if request.queries.is_empty() {
        return Err(VectorDbError::InvalidRequest("a search needs at least one query vector".into()));
    }
    let mut seen = HashSet::new();
    let mut queries = Vec::with_capacity(request.queries.len());
    for q in &request.queries {
        if !seen.insert(q.field.as_str()) {
            return Err(VectorDbError::InvalidRequest(format!("field '{}' queried twice", q.field)));
        }
        match schema.get(&q.field) {
            None => return Err(VectorDbError::UnknownField(q.field.clone())),
            Some(FieldKind::Vector { dimension }) if dimension != q.vector.len() => {
                return Err(VectorDbError::DimensionMismatch {
                    field: q.field.clone(),
                    expected: dimension,
                    got: q.vector.len(),
                });
            }
            Some(FieldKind::Vector { .. }) => {}
            Some(kind) => {
                return Err(VectorDbError::TypeMismatch {
                    field: q.field.clone(),
                    reason: format!("cannot run a vector search over a {kind} field"),
                });
            }
        }
        if !q.weight.is_finite() {
            return Err(VectorDbError::invalid_value(&q.field, "weights must be finite"));
        }
        if q.vector.iter().any(|x| !x.is_finite()) {
            return Err(VectorDbError::invalid_value(&q.field, "query vectors must be finite"));
        }
        queries.push(PlannedQuery { field: q.field.clone(), vector: q.vector.clone(), weight: q.weight });
    }

    for bound in [request.min_score, request.max_score].into_iter().flatten() {
        if bound.is_nan() {
            return Err(VectorDbError::InvalidRequest("score bounds must not be NaN".into()));
        }
    }

    let projection = Projection::new(
        request.include_fields.clone(),
        request.exclude_fields.clone(),
        request.pack_fields.clone(),
    )?;
    projection.validate(schema)?;

    if let Some(ref filter) = request.filter {
        filter.validate(schema, request.filter_mode.unwrap_or(config.filter_mode))?;
    }

    let top_n = request.top_n.unwrap_or(config.default_top_n);
    let narrowed = request.filter.is_some()
        || request.min_score.is_some()
        || request.max_score.is_some()
        || queries.len() > 1;
    let candidates = if narrowed {
        (top_n.saturating_mul(config.candidate_multiplier)).max(config.min_candidates)
    } else {
        top_n
    };

    Ok(Plan {
        queries,
        top_n,
        metric: request.metric,
        filter: request.filter.clone(),
        min_score: request.min_score,
        max_score: request.max_score,
        brute_force: request.brute_force,
        projection,
        logic: request.multi_vector_logic.unwrap_or(config.multi_vector_logic),
        deadline,
        candidates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hv_core::FieldValue;

    fn schema() -> SchemaRegistry {
        let s = SchemaRegistry::new(8);
        s.observe("emb", &FieldValue::Vector(vec![0.0; 3])).unwrap();
        s.observe("price", &FieldValue::Int(1)).unwrap();
        s
    }

    #[test]
    fn test_validation_errors() {
        let s = schema();
        let cfg = SearchConfig::default();
        let err = |r: SearchRequest| plan(&r, &s, &cfg).unwrap_err();

        assert!(matches!(err(SearchRequest::new("emb", vec![1.0])), VectorDbError::DimensionMismatch { .. }));
        assert!(matches!(err(SearchRequest::new("nope", vec![1.0])), VectorDbError::UnknownField(_)));
        assert!(matches!(err(SearchRequest::new("price", vec![1.0])), VectorDbError::TypeMismatch { .. }));
        assert!(matches!(
            err(SearchRequest::new("emb", vec![0.0; 3]).weight(f32::INFINITY)),
            VectorDbError::InvalidValue { .. }
        ));
        assert!(matches!(
            err(SearchRequest::new("emb", vec![0.0; 3]).include_fields(["price"]).exclude_fields(["emb"])),
            VectorDbError::ConflictingProjection
        ));
        assert!(matches!(
            err(SearchRequest::new("emb", vec![0.0; 3]).include_fields(["ghost"])),
            VectorDbError::UnknownField(_)
        ));
    }

    #[test]
    fn test_defaults_and_candidate_width() {
        let s = schema();
        let cfg = SearchConfig::default();
        let p = plan(&SearchRequest::new("emb", vec![0.0; 3]), &s, &cfg).unwrap();
        assert_eq!(p.top_n, 10);
        assert_eq!(p.candidates, 10);
        assert_eq!(p.metric, MetricType::L2);
        assert_eq!(p.queries[0].weight, 1.0);

        let filtered = SearchRequest::new("emb", vec![0.0; 3])
            .top_n(2)
            .filter(Filter::between("price", 0.0, 1.0));
        assert_eq!(plan(&filtered, &s, &cfg).unwrap().candidates, 32);
    }
}
