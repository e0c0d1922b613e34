use std::collections::{HashMap, HashSet};

use hv_core::{MetricType, RowId};
use parking_lot::RwLock;

use super::traits::{IndexStats, Neighbor, SearchParams, VectorIndex};
use super::{check_deadline, DEADLINE_STRIDE};
use crate::distance;
use crate::error::{Result, VectorDbError};

/// Append-only exact segment.
///
/// Vectors are stored contiguously; deleting a row only records a tombstone,
/// so slots never move while a scan is reading them.
#[derive(Debug, Clone)]
pub struct FlatSegment {
    dimension: usize,
    rows: Vec<RowId>,
    data: Vec<f32>,
    slots: HashMap<RowId, usize>,
    tombstones: HashSet<RowId>,
}

impl FlatSegment {
    pub fn new(dimension: usize) -> Self {
        Self::with_capacity(dimension, 0)
    }

    pub fn with_capacity(dimension: usize, capacity: usize) -> Self {
        Self {
            dimension,
            rows: Vec::with_capacity(capacity),
            data: Vec::with_capacity(capacity * dimension),
            slots: HashMap::with_capacity(capacity),
            tombstones: HashSet::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Append a row. Rows are unique per segment.
    pub fn push(&mut self, row: RowId, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(VectorDbError::DimensionMismatch {
                field: String::new(),
                expected: self.dimension,
                got: vector.len(),
            });
        }
        if self.slots.contains_key(&row) {
            return Err(VectorDbError::Storage(format!("row {row} already indexed")));
        }
        self.slots.insert(row, self.rows.len());
        self.rows.push(row);
        self.data.extend_from_slice(vector);
        Ok(())
    }

    pub fn tombstone(&mut self, row: RowId) -> bool {
        self.slots.contains_key(&row) && self.tombstones.insert(row)
    }

    pub fn contains(&self, row: RowId) -> bool {
        self.slots.contains_key(&row)
    }

    /// Slots used, tombstones included.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn live_len(&self) -> usize {
        self.rows.len() - self.tombstones.len()
    }

    pub fn tombstones(&self) -> &HashSet<RowId> {
        &self.tombstones
    }

    fn vector(&self, slot: usize) -> &[f32] {
        &self.data[slot * self.dimension..(slot + 1) * self.dimension]
    }

    pub fn iter_live(&self) -> impl Iterator<Item = (RowId, &[f32])> + '_ {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| !self.tombstones.contains(row))
            .map(|(slot, &row)| (row, self.vector(slot)))
    }

    /// Live rows and their vectors laid out contiguously, ready to build a graph from.
    pub fn live_parts(&self) -> (Vec<RowId>, Vec<f32>) {
        let mut rows = Vec::with_capacity(self.live_len());
        let mut data = Vec::with_capacity(self.live_len() * self.dimension);
        for (row, v) in self.iter_live() {
            rows.push(row);
            data.extend_from_slice(v);
        }
        (rows, data)
    }

    /// Exact scan over live rows.
    pub fn scan(
        &self,
        query: &[f32],
        metric: MetricType,
        top_n: usize,
        deadline: Option<std::time::Instant>,
    ) -> Result<Vec<Neighbor>> {
        scan_rows(self.iter_live(), query, metric, top_n, deadline)
    }
}

/// Score every `(row, vector)` and keep the best `top_n`.
pub(crate) fn scan_rows<'a>(
    rows: impl Iterator<Item = (RowId, &'a [f32])>,
    query: &[f32],
    metric: MetricType,
    top_n: usize,
    deadline: Option<std::time::Instant>,
) -> Result<Vec<Neighbor>> {
    if top_n == 0 {
        return Ok(Vec::new());
    }
    let mut scored: Vec<(RowId, f32)> = Vec::new();
    for (i, (row, v)) in rows.enumerate() {
        if i % DEADLINE_STRIDE == 0 {
            check_deadline(deadline)?;
        }
        scored.push((row, distance::score(metric, query, v)));
    }
    let cmp = |a: &(RowId, f32), b: &(RowId, f32)| distance::compare_ranked(metric, *a, *b);
    if scored.len() > top_n {
        scored.select_nth_unstable_by(top_n - 1, cmp);
        scored.truncate(top_n);
    }
    scored.sort_by(cmp);
    Ok(scored.into_iter().map(|(row, score)| Neighbor { row, score }).collect())
}

/// Brute-force (flat) vector index.
/// Exact nearest-neighbor search by scanning all live vectors.
pub struct FlatIndex {
    inner: RwLock<FlatSegment>,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Self {
        Self { inner: RwLock::new(FlatSegment::new(dimension)) }
    }
}

impl VectorIndex for FlatIndex {
    fn insert(&self, row: RowId, vector: &[f32]) -> Result<()> {
        self.inner.write().push(row, vector)
    }

    fn delete(&self, row: RowId) -> bool {
        self.inner.write().tombstone(row)
    }

    fn search(&self, query: &[f32], params: &SearchParams) -> Result<Vec<Neighbor>> {
        let inner = self.inner.read();
        if query.len() != inner.dimension() {
            return Err(VectorDbError::DimensionMismatch {
                field: String::new(),
                expected: inner.dimension(),
                got: query.len(),
            });
        }
        inner.scan(query, params.metric, params.top_n, params.deadline)
    }

    fn entries(&self) -> Vec<(RowId, Vec<f32>)> {
        let inner = self.inner.read();
        inner.iter_live().map(|(row, v)| (row, v.to_vec())).collect()
    }

    fn len(&self) -> usize {
        self.inner.read().live_len()
    }

    fn dimension(&self) -> usize {
        self.inner.read().dimension()
    }

    fn stats(&self) -> IndexStats {
        let inner = self.inner.read();
        IndexStats {
            live: inner.live_len(),
            tombstoned: inner.tombstones().len(),
            sealed_segments: 0,
            unsealed_rows: inner.len(),
        }
    }
}
