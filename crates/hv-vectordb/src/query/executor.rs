use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use dashmap::DashMap;
use hv_core::{MultiVectorLogic, RowId};

use super::planner::Plan;
use super::{SearchHit, SearchResponse};
use crate::distance;
use crate::error::Result;
use crate::index::{check_deadline, SearchParams, SegmentedIndex, VectorIndex, DEADLINE_STRIDE};
use crate::store::{DocumentStore, StoredDocument};

type Ranked = Vec<(Arc<StoredDocument>, f32)>;

/// Run a planned search against one table's store and indexes.
///
/// Each round asks every queried index for `k` candidates, joins them on
/// row id, then applies score bounds and the filter. When too few survive
/// and some index was cut off at `k`, `k` doubles; once it covers every
/// live entry the round is exact, so a page that exists is always found.
pub(crate) fn execute(
    plan: &Plan,
    store: &DocumentStore,
    indexes: &DashMap<String, Arc<SegmentedIndex>>,
) -> Result<SearchResponse> {
    if plan.top_n == 0 {
        return Ok(SearchResponse::empty());
    }
    let fields: Vec<Option<Arc<SegmentedIndex>>> = plan
        .queries
        .iter()
        .map(|q| indexes.get(&q.field).map(|i| Arc::clone(i.value())))
        .collect();
    let live = fields.iter().flatten().map(|i| i.len()).max().unwrap_or(0);
    if live == 0 {
        return Ok(SearchResponse::empty());
    }

    let mut k = plan.candidates.max(plan.top_n);
    loop {
        check_deadline(plan.deadline)?;
        let exhaustive = k >= live;
        let params = SearchParams {
            top_n: k,
            metric: plan.metric,
            brute_force: plan.brute_force || exhaustive,
            deadline: plan.deadline,
        };

        let mut saturated = false;
        let mut per_field = Vec::with_capacity(fields.len());
        for (query, index) in plan.queries.iter().zip(&fields) {
            let hits: HashMap<RowId, f32> = match index {
                Some(index) => {
                    let hits = index.search(&query.vector, &params)?;
                    saturated |= hits.len() >= k;
                    hits.into_iter().map(|n| (n.row, n.score)).collect()
                }
                None => HashMap::new(),
            };
            per_field.push(hits);
        }

        let ranked = rank(plan, store, &per_field)?;
        if ranked.len() >= plan.top_n || !saturated || exhaustive {
            return Ok(page(plan, ranked));
        }
        k = k.saturating_mul(2);
        tracing::debug!(candidates = k, survivors = ranked.len(), "widening search candidates");
    }
}

fn rank(plan: &Plan, store: &DocumentStore, per_field: &[HashMap<RowId, f32>]) -> Result<Ranked> {
    let rows: BTreeSet<RowId> = match plan.logic {
        MultiVectorLogic::Or => per_field.iter().flat_map(|h| h.keys().copied()).collect(),
        MultiVectorLogic::And => match per_field.split_first() {
            Some((first, rest)) => first
                .keys()
                .filter(|row| rest.iter().all(|h| h.contains_key(row)))
                .copied()
                .collect(),
            None => BTreeSet::new(),
        },
    };

    let mut ranked = Vec::new();
    for (i, row) in rows.into_iter().enumerate() {
        if i % DEADLINE_STRIDE == 0 {
            check_deadline(plan.deadline)?;
        }
        // gone if the document was deleted or re-versioned after the index read
        let Some(doc) = store.get_row(row) else {
            continue;
        };
        let Some(score) = combined_score(plan, &doc, per_field) else {
            continue;
        };
        if plan.min_score.is_some_and(|min| score < min) || plan.max_score.is_some_and(|max| score > max) {
            continue;
        }
        if let Some(ref filter) = plan.filter {
            if !filter.matches(&doc.fields) {
                continue;
            }
        }
        ranked.push((doc, score));
    }
    ranked.sort_by(|a, b| distance::compare_ranked(plan.metric, (a.0.row_id, a.1), (b.0.row_id, b.1)));
    Ok(ranked)
}

/// Weighted sum of per-field scores. Fields missing from a hit list are
/// scored exactly from the stored vector; fields the document lacks are skipped.
///
/// A skipped field contributes nothing, so under L2 it counts the same as an
/// exact match: a document lacking a queried vector can outrank one that has
/// every field. Under IP it counts as a zero product.
fn combined_score(plan: &Plan, doc: &StoredDocument, per_field: &[HashMap<RowId, f32>]) -> Option<f32> {
    let mut total = 0.0f32;
    let mut terms = 0;
    for (query, hits) in plan.queries.iter().zip(per_field) {
        let score = match hits.get(&doc.row_id) {
            Some(&s) => s,
            None => match doc.vector(&query.field) {
                Some(v) => distance::score(plan.metric, &query.vector, v),
                None => continue,
            },
        };
        total += query.weight * score;
        terms += 1;
    }
    (terms > 0).then_some(total)
}

fn page(plan: &Plan, ranked: Ranked) -> SearchResponse {
    let total = ranked.len();
    let hits = ranked
        .into_iter()
        .take(plan.top_n)
        .map(|(doc, score)| SearchHit {
            id: doc.id.clone(),
            score,
            fields: plan.projection.apply(&doc.fields),
        })
        .collect();
    SearchResponse { hits, total }
}
