pub mod config;
pub mod error;
pub mod types;

pub use config::{CompactionConfig, EngineConfig, FilterMode, IndexConfig, MultiVectorLogic, SearchConfig, StorageConfig};
pub use error::{CoreError, Result};
pub use types::{DataType, DocId, Document, FieldDef, FieldKind, FieldValue, MetricType, RowId, ID_FIELD};
