use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashSet;
use hv_core::{IndexConfig, RowId};
use parking_lot::{Mutex, RwLock};

use super::flat::{scan_rows, FlatSegment};
use super::hnsw::{HnswGraph, HnswParams};
use super::traits::{IndexStats, Neighbor, SearchParams, VectorIndex};
use super::check_deadline;
use crate::distance;
use crate::error::{Result, VectorDbError};

/// An immutable graph segment plus its own tombstone set.
struct SealedSegment {
    id: u64,
    graph: HnswGraph,
    tombstones: DashSet<RowId>,
}

impl SealedSegment {
    fn tombstone(&self, row: RowId) -> bool {
        self.graph.contains(row) && self.tombstones.insert(row)
    }

    fn is_dead(&self, row: RowId) -> bool {
        self.tombstones.contains(&row)
    }

    fn live_len(&self) -> usize {
        self.graph.len() - self.tombstones.len()
    }

    fn tombstone_ratio(&self) -> f64 {
        if self.graph.is_empty() {
            return 0.0;
        }
        self.tombstones.len() as f64 / self.graph.len() as f64
    }

    fn live_parts(&self) -> (Vec<RowId>, Vec<f32>, HashSet<RowId>) {
        let seen: HashSet<RowId> = self.tombstones.iter().map(|r| *r).collect();
        let mut rows = Vec::new();
        let mut data = Vec::new();
        for (row, v) in self.graph.iter() {
            if !seen.contains(&row) {
                rows.push(row);
                data.extend_from_slice(v);
            }
        }
        (rows, data, seen)
    }
}

/// Published view of an index. Replaced wholesale, never mutated in place
/// apart from appends to `active` and tombstone inserts.
struct IndexSnapshot {
    sealed: Vec<Arc<SealedSegment>>,
    /// Full flat segments waiting for their graph to be built.
    frozen: Vec<Arc<RwLock<FlatSegment>>>,
    active: Arc<RwLock<FlatSegment>>,
}

/// Realtime vector index for one (table, field) pair.
///
/// Inserts append to a flat active segment. Once it holds
/// `segment_capacity` rows it is frozen and an HNSW graph is built for it
/// outside every lock; the finished segment is swapped into a new snapshot.
/// Searches clone the snapshot pointer and never wait on a build.
pub struct SegmentedIndex {
    field: String,
    dimension: usize,
    config: IndexConfig,
    snapshot: RwLock<Arc<IndexSnapshot>>,
    /// Serializes inserts, deletes and snapshot swaps for this index.
    writer: Mutex<()>,
    /// Held while building graphs (seal or compaction).
    maintenance: Mutex<()>,
    live: AtomicUsize,
    next_segment_id: AtomicU64,
}

impl SegmentedIndex {
    pub fn new(field: impl Into<String>, dimension: usize, config: IndexConfig) -> Self {
        let active = Arc::new(RwLock::new(FlatSegment::with_capacity(dimension, config.segment_capacity)));
        Self {
            field: field.into(),
            dimension,
            config,
            snapshot: RwLock::new(Arc::new(IndexSnapshot {
                sealed: Vec::new(),
                frozen: Vec::new(),
                active,
            })),
            writer: Mutex::new(()),
            maintenance: Mutex::new(()),
            live: AtomicUsize::new(0),
            next_segment_id: AtomicU64::new(0),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    fn current(&self) -> Arc<IndexSnapshot> {
        Arc::clone(&self.snapshot.read())
    }

    fn hnsw_params(&self) -> HnswParams {
        HnswParams {
            m: self.config.hnsw_m,
            ef_construction: self.config.ef_construction,
            ef_search: self.config.ef_search,
            seed: self.config.seed,
        }
    }

    fn check_dimension(&self, got: usize) -> Result<()> {
        if got != self.dimension {
            return Err(VectorDbError::DimensionMismatch {
                field: self.field.clone(),
                expected: self.dimension,
                got,
            });
        }
        Ok(())
    }

    /// Freeze the active segment if it is full and turn it into a graph segment.
    ///
    /// Skipped when another seal or compaction is running; the next insert retries.
    fn maybe_seal(&self) {
        let Some(_maint) = self.maintenance.try_lock() else {
            return;
        };

        let frozen = {
            let _w = self.writer.lock();
            let snap = self.current();
            if snap.active.read().len() < self.config.segment_capacity {
                return;
            }
            let fresh = Arc::new(RwLock::new(FlatSegment::with_capacity(
                self.dimension,
                self.config.segment_capacity,
            )));
            let mut frozen = snap.frozen.clone();
            frozen.push(Arc::clone(&snap.active));
            *self.snapshot.write() = Arc::new(IndexSnapshot {
                sealed: snap.sealed.clone(),
                frozen,
                active: fresh,
            });
            Arc::clone(&snap.active)
        };

        let (rows, data, seen) = {
            let seg = frozen.read();
            let (rows, data) = seg.live_parts();
            (rows, data, seg.tombstones().clone())
        };
        let built = rows.len();
        let graph = HnswGraph::build(self.dimension, self.config.metric, self.hnsw_params(), rows, data);
        let segment = SealedSegment {
            id: self.next_segment_id.fetch_add(1, Ordering::Relaxed),
            graph,
            tombstones: DashSet::new(),
        };

        let _w = self.writer.lock();
        // deletes that landed on the frozen segment while the graph was built
        for row in frozen.read().tombstones() {
            if !seen.contains(row) {
                segment.tombstone(*row);
            }
        }
        let snap = self.current();
        let mut sealed = snap.sealed.clone();
        if segment.live_len() > 0 {
            sealed.push(Arc::new(segment));
        }
        let remaining = snap.frozen.iter().filter(|f| !Arc::ptr_eq(*f, &frozen)).cloned().collect();
        *self.snapshot.write() = Arc::new(IndexSnapshot {
            sealed,
            frozen: remaining,
            active: Arc::clone(&snap.active),
        });
        tracing::debug!(field = %self.field, rows = built, "sealed index segment");
    }

    /// Bulk-load entries, e.g. when a persisted table is reopened.
    pub fn load_entries(&self, entries: Vec<(RowId, Vec<f32>)>) -> Result<()> {
        for (row, vector) in entries {
            self.insert(row, &vector)?;
        }
        Ok(())
    }

    fn exact_search(&self, snap: &IndexSnapshot, query: &[f32], params: &SearchParams) -> Result<Vec<Neighbor>> {
        let mut hits = Vec::new();
        for seg in &snap.sealed {
            check_deadline(params.deadline)?;
            let live = seg.graph.iter().filter(|(row, _)| !seg.is_dead(*row));
            hits.extend(scan_rows(live, query, params.metric, params.top_n, params.deadline)?);
        }
        for seg in snap.frozen.iter().chain(std::iter::once(&snap.active)) {
            let seg = seg.read();
            hits.extend(seg.scan(query, params.metric, params.top_n, params.deadline)?);
        }
        Ok(hits)
    }

    fn graph_search(&self, snap: &IndexSnapshot, query: &[f32], params: &SearchParams) -> Result<Vec<Neighbor>> {
        let mut hits = Vec::new();
        for seg in &snap.sealed {
            check_deadline(params.deadline)?;
            let is_dead = |row: RowId| seg.is_dead(row);
            hits.extend(seg.graph.search(query, params.top_n, self.config.ef_search, &is_dead));
        }
        for seg in snap.frozen.iter().chain(std::iter::once(&snap.active)) {
            let seg = seg.read();
            hits.extend(seg.scan(query, params.metric, params.top_n, params.deadline)?);
        }
        Ok(hits)
    }
}

impl VectorIndex for SegmentedIndex {
    fn insert(&self, row: RowId, vector: &[f32]) -> Result<()> {
        self.check_dimension(vector.len())?;
        let full = {
            let _w = self.writer.lock();
            if self.live.load(Ordering::Relaxed) >= self.config.max_rows_per_index {
                return Err(VectorDbError::CapacityExceeded(format!(
                    "index on '{}' holds {} rows",
                    self.field, self.config.max_rows_per_index
                )));
            }
            let snap = self.current();
            let mut active = snap.active.write();
            active.push(row, vector).map_err(|e| match e {
                VectorDbError::DimensionMismatch { expected, got, .. } => VectorDbError::DimensionMismatch {
                    field: self.field.clone(),
                    expected,
                    got,
                },
                other => other,
            })?;
            self.live.fetch_add(1, Ordering::Relaxed);
            active.len() >= self.config.segment_capacity
        };
        if full {
            self.maybe_seal();
        }
        Ok(())
    }

    fn delete(&self, row: RowId) -> bool {
        let _w = self.writer.lock();
        let snap = self.current();
        let hit = snap.active.write().tombstone(row)
            || snap.frozen.iter().any(|f| f.write().tombstone(row))
            || snap.sealed.iter().any(|s| s.tombstone(row));
        if hit {
            self.live.fetch_sub(1, Ordering::Relaxed);
        }
        hit
    }

    fn search(&self, query: &[f32], params: &SearchParams) -> Result<Vec<Neighbor>> {
        self.check_dimension(query.len())?;
        if params.top_n == 0 {
            return Ok(Vec::new());
        }
        let snap = self.current();
        let exact = params.brute_force
            || self.live.load(Ordering::Relaxed) < self.config.brute_force_threshold
            || params.metric != self.config.metric;
        let mut hits = if exact {
            self.exact_search(&snap, query, params)?
        } else {
            self.graph_search(&snap, query, params)?
        };
        check_deadline(params.deadline)?;
        hits.sort_by(|a, b| distance::compare_ranked(params.metric, (a.row, a.score), (b.row, b.score)));
        hits.truncate(params.top_n);
        Ok(hits)
    }

    fn entries(&self) -> Vec<(RowId, Vec<f32>)> {
        let snap = self.current();
        let mut out = Vec::with_capacity(self.len());
        for seg in &snap.sealed {
            out.extend(
                seg.graph
                    .iter()
                    .filter(|(row, _)| !seg.is_dead(*row))
                    .map(|(row, v)| (row, v.to_vec())),
            );
        }
        for seg in snap.frozen.iter().chain(std::iter::once(&snap.active)) {
            out.extend(seg.read().iter_live().map(|(row, v)| (row, v.to_vec())));
        }
        out.sort_by_key(|(row, _)| *row);
        out
    }

    fn len(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn needs_compaction(&self) -> bool {
        self.current()
            .sealed
            .iter()
            .any(|s| s.tombstone_ratio() >= self.config.compaction_ratio)
    }

    /// Rebuild sealed segments whose tombstone fraction reached the threshold.
    ///
    /// Row ids and vectors are preserved, so scores and ordering are unchanged.
    fn compact(&self) -> Result<usize> {
        let _maint = self.maintenance.lock();
        let targets: Vec<Arc<SealedSegment>> = self
            .current()
            .sealed
            .iter()
            .filter(|s| s.tombstone_ratio() >= self.config.compaction_ratio)
            .cloned()
            .collect();

        let mut rebuilt = 0;
        for old in targets {
            let (rows, data, seen) = old.live_parts();
            let kept = rows.len();
            let replacement = if rows.is_empty() {
                None
            } else {
                Some(SealedSegment {
                    id: self.next_segment_id.fetch_add(1, Ordering::Relaxed),
                    graph: HnswGraph::build(self.dimension, self.config.metric, self.hnsw_params(), rows, data),
                    tombstones: DashSet::new(),
                })
            };

            let _w = self.writer.lock();
            let snap = self.current();
            let mut sealed = Vec::with_capacity(snap.sealed.len());
            for seg in &snap.sealed {
                if seg.id != old.id {
                    sealed.push(Arc::clone(seg));
                    continue;
                }
                if let Some(ref fresh) = replacement {
                    for row in old.tombstones.iter() {
                        if !seen.contains(&*row) {
                            fresh.tombstone(*row);
                        }
                    }
                }
            }
            if let Some(fresh) = replacement {
                if fresh.live_len() > 0 {
                    sealed.push(Arc::new(fresh));
                }
            }
            *self.snapshot.write() = Arc::new(IndexSnapshot {
                sealed,
                frozen: snap.frozen.clone(),
                active: Arc::clone(&snap.active),
            });
            rebuilt += 1;
            tracing::info!(field = %self.field, segment = old.id, kept, "compacted index segment");
        }
        Ok(rebuilt)
    }

    fn stats(&self) -> IndexStats {
        let snap = self.current();
        let mut stats = IndexStats {
            live: self.len(),
            sealed_segments: snap.sealed.len(),
            ..IndexStats::default()
        };
        for seg in &snap.sealed {
            stats.tombstoned += seg.tombstones.len();
        }
        for seg in snap.frozen.iter().chain(std::iter::once(&snap.active)) {
            let seg = seg.read();
            stats.tombstoned += seg.tombstones().len();
            stats.unsealed_rows += seg.len();
        }
        stats
    }
}
