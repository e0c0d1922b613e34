use std::time::Instant;

use hv_core::{MetricType, RowId};
use serde::Serialize;

use crate::error::Result;

/// A ranked index hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub row: RowId,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct SearchParams {
    pub top_n: usize,
    pub metric: MetricType,
    /// Scan every live entry instead of using the graph segments.
    pub brute_force: bool,
    pub deadline: Option<Instant>,
}

impl SearchParams {
    pub fn new(top_n: usize, metric: MetricType) -> Self {
        Self { top_n, metric, brute_force: false, deadline: None }
    }

    pub fn exact(mut self) -> Self {
        self.brute_force = true;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub live: usize,
    pub tombstoned: usize,
    pub sealed_segments: usize,
    /// Rows held in flat (not yet sealed) segments, tombstones included.
    pub unsealed_rows: usize,
}

/// Core trait for vector index implementations.
pub trait VectorIndex: Send + Sync {
    /// Insert a vector under a row id that has never been used in this index.
    fn insert(&self, row: RowId, vector: &[f32]) -> Result<()>;

    /// Tombstone a row. Returns false if the row was not live.
    fn delete(&self, row: RowId) -> bool;

    /// Ranked hits, best first, ties by row ascending. Never returns tombstoned rows.
    fn search(&self, query: &[f32], params: &SearchParams) -> Result<Vec<Neighbor>>;

    /// Live entries ordered by row id.
    fn entries(&self) -> Vec<(RowId, Vec<f32>)>;

    /// Number of live entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dimension(&self) -> usize;

    fn needs_compaction(&self) -> bool {
        false
    }

    /// Physically drop tombstoned entries. Returns the number of segments rebuilt.
    fn compact(&self) -> Result<usize> {
        Ok(0)
    }

    fn stats(&self) -> IndexStats;
}
