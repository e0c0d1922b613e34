//! Vector indexes: an exact flat segment, an HNSW graph, and the segmented
//! index that combines them for realtime inserts.

mod flat;
mod hnsw;
mod segmented;
mod traits;

pub use flat::{FlatIndex, FlatSegment};
pub use hnsw::{HnswGraph, HnswParams};
pub use segmented::SegmentedIndex;
pub use traits::{IndexStats, Neighbor, SearchParams, VectorIndex};

use std::time::Instant;

use crate::error::{Result, VectorDbError};

/// Rows scanned between deadline checks.
pub(crate) const DEADLINE_STRIDE: usize = 1024;

pub(crate) fn check_deadline(deadline: Option<Instant>) -> Result<()> {
    match deadline {
        Some(d) if Instant::now() >= d => Err(VectorDbError::DeadlineExceeded),
        _ => Ok(()),
    }
}
