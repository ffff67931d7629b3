use std::time::{Duration, Instant};

use tracing::info;

use super::{TableWriter, WriteMode};
use crate::error::LoadError;
use crate::formats::{RowRange, SourceReader};
use crate::telemetry::{ProgressEvent, ProgressSink, ZoneProgress};

/// Outcome of a zone lookup load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneLoadReport {
    pub table: String,
    pub rows_written: u64,
    pub elapsed: Duration,
}

/// Writes a small lookup source to its table in one replace, with no chunking
pub struct ZoneLoader {
    table: String,
}

impl ZoneLoader {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }

    pub async fn run(
        &self,
        source: &dyn SourceReader,
        writer: &mut dyn TableWriter,
        progress: &mut dyn ProgressSink,
    ) -> Result<ZoneLoadReport, LoadError> {
        progress.record(&ProgressEvent::ZonesStarted {
            table: self.table.clone(),
        });
        let start_time = Instant::now();

        let batch = source
            .read_rows(RowRange::new(0, source.total_rows()))
            .await?;
        let rows_written = writer
            .write_batch(&self.table, &batch, WriteMode::Replace)
            .await?;
        let elapsed = start_time.elapsed();

        info!(table = %self.table, rows = rows_written, "zone lookup loaded");
        progress.record(&ProgressEvent::ZonesWritten(ZoneProgress {
            table: self.table.clone(),
            rows_written,
            elapsed,
        }));

        Ok(ZoneLoadReport {
            table: self.table.clone(),
            rows_written,
            elapsed,
        })
    }
}
