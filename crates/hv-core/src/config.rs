use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CoreError, Result};
use crate::types::MetricType;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub storage: StorageConfig,
    pub index: IndexConfig,
    pub search: SearchConfig,
    pub compaction: CompactionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one sub-directory per table. `None` keeps tables in memory only.
    pub root_dir: Option<PathBuf>,
    pub persist_on_close: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Rows buffered in the mutable segment before it is sealed into a graph segment.
    pub segment_capacity: usize,
    /// Below this many live entries every search is an exact scan.
    pub brute_force_threshold: usize,
    /// Metric the graph segments are built for.
    pub metric: MetricType,
    pub hnsw_m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    /// Tombstoned fraction of a sealed segment that triggers its rebuild.
    pub compaction_ratio: f64,
    pub max_rows_per_index: usize,
    pub max_dimension: usize,
    pub seed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    /// Every supplied predicate must match.
    Conjunctive,
    /// Range and term predicates may not be combined in one request.
    Exclusive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiVectorLogic {
    /// A candidate must be retrieved through every queried field.
    And,
    /// A candidate retrieved through any queried field is scored on all of them.
    Or,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_top_n: usize,
    pub candidate_multiplier: usize,
    pub min_candidates: usize,
    pub filter_mode: FilterMode,
    pub multi_vector_logic: MultiVectorLogic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionConfig {
    pub interval_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: None,
            persist_on_close: true,
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            segment_capacity: 1024,
            brute_force_threshold: 1024,
            metric: MetricType::L2,
            hnsw_m: 16,
            ef_construction: 200,
            ef_search: 64,
            compaction_ratio: 0.3,
            max_rows_per_index: 10_000_000,
            max_dimension: 4096,
            seed: 0x5eed,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_top_n: 10,
            candidate_multiplier: 4,
            min_candidates: 32,
            filter_mode: FilterMode::Conjunctive,
            multi_vector_logic: MultiVectorLogic::Or,
        }
    }
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self { interval_ms: 30_000 }
    }
}

impl EngineConfig {
    /// In-memory configuration rooted nowhere.
    pub fn volatile() -> Self {
        Self::default()
    }

    /// Configuration persisting tables under `root`.
    pub fn persistent(root: impl Into<PathBuf>) -> Self {
        let mut cfg = Self::default();
        cfg.storage.root_dir = Some(root.into());
        cfg
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let cfg = Self::from_json_str(&data)?;
        tracing::debug!("loaded engine config from {:?}", path);
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let idx = &self.index;
        if idx.segment_capacity == 0 {
            return Err(CoreError::InvalidConfig("index.segment_capacity must be positive".into()));
        }
        if idx.hnsw_m < 2 {
            return Err(CoreError::InvalidConfig("index.hnsw_m must be at least 2".into()));
        }
        if idx.ef_construction == 0 || idx.ef_search == 0 {
            return Err(CoreError::InvalidConfig("index ef parameters must be positive".into()));
        }
        if !(idx.compaction_ratio > 0.0 && idx.compaction_ratio <= 1.0) {
            return Err(CoreError::InvalidConfig("index.compaction_ratio must be in (0, 1]".into()));
        }
        if idx.max_rows_per_index == 0 || idx.max_dimension == 0 {
            return Err(CoreError::InvalidConfig("index capacity limits must be positive".into()));
        }
        if self.search.default_top_n == 0 || self.search.candidate_multiplier == 0 {
            return Err(CoreError::InvalidConfig("search defaults must be positive".into()));
        }
        if self.compaction.interval_ms == 0 {
            return Err(CoreError::InvalidConfig("compaction.interval_ms must be positive".into()));
        }
        Ok(())
    }
}
