//! Tiny per-month parquet fixture generator

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::Int64Array;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use tracing::info;

/// Write `passengers_month_{month}.parquet` into `out_dir` and return its path.
///
/// The file holds two rows: `day = [1, 2]`, `num_passengers = [3, 4]` and
/// `month` set to `month` on both.
pub fn generate_passengers(month: u32, out_dir: &Path) -> Result<PathBuf> {
    if !(1..=12).contains(&month) {
        anyhow::bail!("Month must be between 1 and 12, got {month}");
    }
    info!(month, out_dir = %out_dir.display(), "generating passenger file");

    let schema = Arc::new(Schema::new(vec![
        Field::new("day", DataType::Int64, false),
        Field::new("num_passengers", DataType::Int64, false),
        Field::new("month", DataType::Int64, false),
    ]));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(Int64Array::from(vec![1, 2])),
            Arc::new(Int64Array::from(vec![3, 4])),
            Arc::new(Int64Array::from(vec![month as i64; 2])),
        ],
    )
    .context("Failed to build record batch")?;

    let path = out_dir.join(format!("passengers_month_{month}.parquet"));
    let file = std::fs::File::create(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    writer
        .write(&batch)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    writer
        .close()
        .with_context(|| format!("Failed to finish {}", path.display()))?;

    info!(path = %path.display(), rows = batch.num_rows(), "running pipeline for month {month}");
    Ok(path)
}
