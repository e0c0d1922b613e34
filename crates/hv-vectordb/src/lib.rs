//! Hybrid vector database - Pure Rust implementation
//!
//! Schemaless tables of documents with scalar and vector fields, realtime
//! segmented vector indexes (flat + HNSW), filter evaluation, weighted
//! multi-vector search, persistence and background compaction.

pub mod catalog;
pub mod compaction;
pub mod distance;
pub mod error;
pub mod filter;
pub mod index;
pub mod query;
pub mod schema;
pub mod store;
pub mod table;

pub use catalog::{Session, TableManager};
pub use compaction::Compactor;
pub use error::{ErrorKind, Result, ResultCode, Status, VectorDbError};
pub use filter::Filter;
pub use index::{FlatIndex, HnswGraph, IndexStats, SegmentedIndex, VectorIndex};
pub use query::{Projection, SearchHit, SearchRequest, SearchResponse, VectorQuery};
pub use schema::{FieldSchema, SchemaRegistry};
pub use table::{BatchResult, DocOutcome, Selector, Table, TableMeta, TableStats};

pub use hv_core::{
    DataType, DocId, Document, EngineConfig, FieldDef, FieldKind, FieldValue, FilterMode, MetricType,
    MultiVectorLogic,
};
