use std::num::NonZeroU64;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::plan::ChunkPlan;
use super::{TableWriter, WriteMode};
use crate::db::schema::Schema;
use crate::error::{ChunkPosition, LoadError};
use crate::formats::SourceReader;
use crate::telemetry::{ChunkProgress, ProgressEvent, ProgressSink};

/// Outcome of a completed trip load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripLoadReport {
    pub table: String,
    pub total_rows: u64,
    pub chunks_written: u64,
    pub rows_written: u64,
    pub elapsed: Duration,
}

/// Error from a chunk write, with the position of the chunk that failed
#[derive(Debug)]
pub struct ChunkFailure {
    pub position: ChunkPosition,
    pub error: LoadError,
}

/// Loads a source into one table, chunk by chunk, in ascending order.
///
/// The first chunk replaces the table and fixes its schema; every later
/// chunk is checked against that schema and appended.
pub struct ChunkLoader {
    table: String,
    chunk_size: NonZeroU64,
}

impl ChunkLoader {
    pub fn new(table: impl Into<String>, chunk_size: NonZeroU64) -> Self {
        Self {
            table: table.into(),
            chunk_size,
        }
    }

    pub async fn run(
        &self,
        source: &dyn SourceReader,
        writer: &mut dyn TableWriter,
        progress: &mut dyn ProgressSink,
    ) -> Result<TripLoadReport, ChunkFailure> {
        let start_time = Instant::now();
        let plan = ChunkPlan::new(source.total_rows(), self.chunk_size);

        info!(
            table = %self.table,
            total_rows = plan.total_rows,
            total_chunks = plan.total_chunks(),
            chunk_size = self.chunk_size.get(),
            "starting chunked load"
        );
        progress.record(&ProgressEvent::TripsPlanned {
            table: self.table.clone(),
            total_rows: plan.total_rows,
            total_chunks: plan.total_chunks(),
            chunk_size: self.chunk_size.get(),
        });

        let mut established: Option<Schema> = None;
        let mut rows_written = 0u64;
        let mut chunks_written = 0u64;

        for chunk in plan.chunks() {
            let chunk_start = Instant::now();
            let fail = |error: LoadError| ChunkFailure {
                position: ChunkPosition {
                    index: chunk.index,
                    total: chunk.total,
                },
                error,
            };

            let batch = source.read_rows(chunk.range).await.map_err(fail)?;

            let mode = match &established {
                None => WriteMode::Replace,
                Some(expected) => {
                    if !expected.same_columns(&batch.schema) {
                        return Err(fail(LoadError::SchemaMismatch {
                            table: self.table.clone(),
                            expected: expected.describe_columns(),
                            found: batch.schema.describe_columns(),
                        }));
                    }
                    WriteMode::Append
                }
            };

            debug!(chunk = chunk.index, ?mode, rows = batch.num_rows(), "writing chunk");
            let written = writer
                .write_batch(&self.table, &batch, mode)
                .await
                .map_err(fail)?;

            if established.is_none() {
                established = Some(batch.schema);
            }
            rows_written += written;
            chunks_written += 1;

            progress.record(&ProgressEvent::ChunkWritten(ChunkProgress {
                table: self.table.clone(),
                chunk_index: chunk.index,
                total_chunks: chunk.total,
                range: chunk.range,
                rows_written: written,
                elapsed: chunk_start.elapsed(),
            }));
        }

        let elapsed = start_time.elapsed();
        info!(
            table = %self.table,
            rows = rows_written,
            chunks = chunks_written,
            elapsed_secs = elapsed.as_secs_f64(),
            "chunked load complete"
        );
        progress.record(&ProgressEvent::TripsLoaded {
            table: self.table.clone(),
            rows_written,
            elapsed,
        });

        Ok(TripLoadReport {
            table: self.table.clone(),
            total_rows: plan.total_rows,
            chunks_written,
            rows_written,
            elapsed,
        })
    }
}
