//! Distance metrics for vector similarity search.
//!
//! Scores are reported in the metric's natural orientation: squared L2
//! distance (smaller is closer) and raw inner product (larger is closer).
//! Internally everything is ranked on a "lower is better" key so the
//! graph and scan code paths stay metric-agnostic.

use std::cmp::Ordering;

pub use hv_core::MetricType;

/// Compute inner product (dot product) of two vectors.
#[inline]
pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Compute L2 squared distance.
#[inline]
pub fn l2_squared(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| {
        let d = x - y;
        d * d
    }).sum()
}

/// Caller-visible score of `b` against the query `a`.
#[inline]
pub fn score(metric: MetricType, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        MetricType::L2 => l2_squared(a, b),
        MetricType::InnerProduct => inner_product(a, b),
    }
}

/// Ranking key derived from a score: lower always ranks first.
#[inline]
pub fn rank_key(metric: MetricType, score: f32) -> f32 {
    match metric {
        MetricType::L2 => score,
        MetricType::InnerProduct => -score,
    }
}

/// Graph-internal distance, lower is closer.
#[inline]
pub fn distance(metric: MetricType, a: &[f32], b: &[f32]) -> f32 {
    rank_key(metric, score(metric, a, b))
}

/// Whether `metric` ranks larger scores first.
pub fn higher_is_better(metric: MetricType) -> bool {
    matches!(metric, MetricType::InnerProduct)
}

/// Order two `(row, score)` pairs: best score first, ties by row ascending.
pub fn compare_ranked(metric: MetricType, a: (u64, f32), b: (u64, f32)) -> Ordering {
    rank_key(metric, a.1)
        .total_cmp(&rank_key(metric, b.1))
        .then_with(|| a.0.cmp(&b.0))
}
