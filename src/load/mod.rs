//! Chunked trip loading and single-shot zone loading

pub mod chunk_loader;
pub mod plan;
pub mod zone_loader;

use async_trait::async_trait;

use crate::error::LoadError;
use crate::formats::Batch;

pub use chunk_loader::{ChunkLoader, TripLoadReport};
pub use plan::{ChunkPlan, ChunkSpec};
pub use zone_loader::{ZoneLoadReport, ZoneLoader};

/// How a batch lands in its target table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Drop any existing table, create it from the batch schema, then insert
    Replace,
    /// Insert into the existing table
    Append,
}

/// Destination for batches of rows
#[async_trait]
pub trait TableWriter: Send {
    /// Write every row of `batch` to `table`, returning the number of rows written
    async fn write_batch(
        &mut self,
        table: &str,
        batch: &Batch,
        mode: WriteMode,
    ) -> Result<u64, LoadError>;
}
