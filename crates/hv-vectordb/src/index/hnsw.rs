use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use hv_core::{MetricType, RowId};
use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::traits::Neighbor;
use crate::distance;

const MAX_LEVEL: usize = 16;

/// HNSW build and search parameters.
///
/// - `m`: connections per node on upper layers (twice that on layer 0)
/// - `ef_construction`: candidate list size while linking
/// - `ef_search`: candidate list size while searching
#[derive(Debug, Clone, Copy)]
pub struct HnswParams {
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    pub seed: u64,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self { m: 16, ef_construction: 200, ef_search: 64, seed: 0x5eed }
    }
}

/// Immutable HNSW (Hierarchical Navigable Small World) graph.
///
/// Built once from a frozen batch of vectors, then only read. Deletions are
/// handled by the caller through the `is_dead` predicate passed to `search`.
pub struct HnswGraph {
    dimension: usize,
    metric: MetricType,
    params: HnswParams,
    rows: Vec<RowId>,
    data: Vec<f32>,
    slots: HashMap<RowId, usize>,
    /// layers[level][node] = neighbor node ids.
    layers: Vec<Vec<Vec<usize>>>,
    entry_point: Option<usize>,
    max_level: usize,
}

impl HnswGraph {
    /// Build a graph over `rows`, whose vectors are laid out contiguously in `data`.
    pub fn build(
        dimension: usize,
        metric: MetricType,
        params: HnswParams,
        rows: Vec<RowId>,
        data: Vec<f32>,
    ) -> Self {
        debug_assert_eq!(rows.len() * dimension, data.len());
        let n = rows.len();
        let slots = rows.iter().enumerate().map(|(i, &r)| (r, i)).collect();
        let mut graph = Self {
            dimension,
            metric,
            params,
            rows,
            data,
            slots,
            layers: Vec::new(),
            entry_point: None,
            max_level: 0,
        };

        let seed = params.seed ^ graph.rows.first().copied().unwrap_or(0);
        let mut rng = StdRng::seed_from_u64(seed);
        let ml = 1.0 / (params.m.max(2) as f64).ln();
        for node in 0..n {
            let level = random_level(&mut rng, ml);
            graph.link(node, level, n);
        }
        graph
    }

    fn link(&mut self, node: usize, level: usize, n: usize) {
        while self.layers.len() <= level {
            self.layers.push(vec![Vec::new(); n]);
        }

        let Some(ep) = self.entry_point else {
            self.entry_point = Some(node);
            self.max_level = level;
            return;
        };

        let query = self.vector(node).to_vec();
        let mut curr_ep = ep;
        for lev in (level + 1..=self.max_level).rev() {
            curr_ep = greedy_closest(self, lev, curr_ep, &query);
        }

        let top = level.min(self.max_level);
        for lev in (0..=top).rev() {
            let candidates = search_layer(self, lev, curr_ep, &query, self.params.ef_construction, &|_| false);
            let max_neighbors = if lev == 0 { self.params.m * 2 } else { self.params.m };
            let neighbors: Vec<usize> = candidates
                .iter()
                .filter(|&&(id, _)| id != node)
                .take(max_neighbors)
                .map(|&(id, _)| id)
                .collect();

            self.layers[lev][node] = neighbors.clone();
            for &neighbor in &neighbors {
                self.layers[lev][neighbor].push(node);
                if self.layers[lev][neighbor].len() > max_neighbors {
                    self.prune(lev, neighbor, max_neighbors);
                }
            }

            if let Some(&(best, _)) = candidates.first() {
                curr_ep = best;
            }
        }

        if level > self.max_level {
            self.entry_point = Some(node);
            self.max_level = level;
        }
    }

    /// Keep only the closest `keep` links of `node` on `lev`.
    fn prune(&mut self, lev: usize, node: usize, keep: usize) {
        let base = self.vector(node);
        let mut scored: Vec<(usize, f32)> = self.layers[lev][node]
            .iter()
            .map(|&n| (n, distance::distance(self.metric, base, self.vector(n))))
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        scored.truncate(keep);
        self.layers[lev][node] = scored.into_iter().map(|(id, _)| id).collect();
    }

    fn vector(&self, node: usize) -> &[f32] {
        &self.data[node * self.dimension..(node + 1) * self.dimension]
    }

    pub fn metric(&self) -> MetricType {
        self.metric
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of nodes, dead ones included.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains(&self, row: RowId) -> bool {
        self.slots.contains_key(&row)
    }

    /// Every node as `(row, vector)` in build order.
    pub fn iter(&self) -> impl Iterator<Item = (RowId, &[f32])> + '_ {
        self.rows.iter().enumerate().map(|(node, &row)| (row, self.vector(node)))
    }

    /// Approximate top-`top_n` under the build metric, skipping rows for which `is_dead` holds.
    ///
    /// Dead nodes are still traversed so the graph stays navigable.
    pub fn search(
        &self,
        query: &[f32],
        top_n: usize,
        ef: usize,
        is_dead: &dyn Fn(RowId) -> bool,
    ) -> Vec<Neighbor> {
        let Some(ep) = self.entry_point else {
            return Vec::new();
        };
        if top_n == 0 {
            return Vec::new();
        }

        let mut curr_ep = ep;
        for lev in (1..=self.max_level).rev() {
            curr_ep = greedy_closest(self, lev, curr_ep, query);
        }

        let ef = ef.max(top_n);
        let candidates = search_layer(self, 0, curr_ep, query, ef, is_dead);
        candidates
            .into_iter()
            .take(top_n)
            .map(|(node, d)| Neighbor {
                row: self.rows[node],
                score: if distance::higher_is_better(self.metric) { -d } else { d },
            })
            .collect()
    }
}

fn random_level(rng: &mut StdRng, ml: f64) -> usize {
    // (0, 1] so the logarithm stays finite
    let r: f64 = 1.0 - rng.gen::<f64>();
    ((-r.ln() * ml).floor() as usize).min(MAX_LEVEL)
}

// -- Helper functions --

fn greedy_closest(graph: &HnswGraph, level: usize, start: usize, query: &[f32]) -> usize {
    let mut current = start;
    let mut current_dist = distance::distance(graph.metric, query, graph.vector(current));

    loop {
        let mut changed = false;
        for &neighbor in &graph.layers[level][current] {
            let d = distance::distance(graph.metric, query, graph.vector(neighbor));
            if d < current_dist {
                current = neighbor;
                current_dist = d;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    current
}

/// Search a single layer, returns live candidates sorted by distance ascending.
fn search_layer(
    graph: &HnswGraph,
    level: usize,
    entry: usize,
    query: &[f32],
    ef: usize,
    is_dead: &dyn Fn(RowId) -> bool,
) -> Vec<(usize, f32)> {
    let adjacency = &graph.layers[level];
    let mut visited = HashSet::new();
    let entry_dist = distance::distance(graph.metric, query, graph.vector(entry));

    // Min-heap of nodes still to expand
    let mut candidates: BinaryHeap<Reverse<(OrderedFloat<f32>, usize)>> = BinaryHeap::new();
    // Max-heap of results, worst on top
    let mut results: BinaryHeap<(OrderedFloat<f32>, usize)> = BinaryHeap::new();

    candidates.push(Reverse((OrderedFloat(entry_dist), entry)));
    if !is_dead(graph.rows[entry]) {
        results.push((OrderedFloat(entry_dist), entry));
    }
    visited.insert(entry);

    while let Some(Reverse((OrderedFloat(cand_dist), cand_id))) = candidates.pop() {
        if results.len() >= ef {
            if let Some(&(OrderedFloat(worst), _)) = results.peek() {
                if cand_dist > worst {
                    break;
                }
            }
        }

        for &neighbor in &adjacency[cand_id] {
            if !visited.insert(neighbor) {
                continue;
            }
            let d = distance::distance(graph.metric, query, graph.vector(neighbor));
            let admit = results.len() < ef
                || results.peek().map_or(true, |&(OrderedFloat(worst), _)| d < worst);
            if admit {
                candidates.push(Reverse((OrderedFloat(d), neighbor)));
                if !is_dead(graph.rows[neighbor]) {
                    results.push((OrderedFloat(d), neighbor));
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }
    }

    let mut result_vec: Vec<(usize, f32)> = results
        .into_iter()
        .map(|(OrderedFloat(d), id)| (id, d))
        .collect();
    result_vec.sort_by(|a, b| a.1.total_cmp(&b.1).then(graph.rows[a.0].cmp(&graph.rows[b.0])));
    result_vec
}
