//! Parquet file reader implementation.

use std::path::Path;

use anyhow::{Context, Result};
use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use parquet::arrow::async_reader::ParquetRecordBatchStreamBuilder;
use tracing::debug;

use crate::config::PARQUET_BATCH_ROWS;
use crate::error::LoadError;
use crate::formats::reader::{Batch, Record, RowRange, SourceMetadata, SourceMode, SourceReader};

use super::conversion::record_batch_to_records;
use super::schema::schema_from_arrow;

enum Storage {
    /// Re-open the file and decode only the requested rows
    Streaming,
    /// Every row decoded on open
    InMemory(RecordBatch),
}

/// Parquet source that serves arbitrary row slices
pub struct ParquetSource {
    metadata: SourceMetadata,
    storage: Storage,
}

impl ParquetSource {
    /// Open a parquet file, reading its footer for schema and row count
    pub async fn open(path: &Path, mode: SourceMode) -> Result<Self, LoadError> {
        Self::load(path, mode)
            .await
            .map_err(|e| LoadError::read(path, e))
    }

    async fn load(path: &Path, mode: SourceMode) -> Result<Self> {
        let builder = stream_builder(path).await?;

        let arrow_schema: SchemaRef = builder.schema().clone();
        let schema = schema_from_arrow(&arrow_schema)?;
        let total_rows: u64 = builder
            .metadata()
            .row_groups()
            .iter()
            .map(|rg| rg.num_rows() as u64)
            .sum();

        let storage = match mode {
            SourceMode::Streaming => Storage::Streaming,
            SourceMode::InMemory => {
                let stream = builder
                    .with_batch_size(PARQUET_BATCH_ROWS)
                    .build()
                    .context("Failed to build Parquet stream")?;
                let batches: Vec<RecordBatch> = stream
                    .try_collect()
                    .await
                    .context("Failed to read record batch")?;
                let all = concat_batches(&arrow_schema, &batches)
                    .context("Failed to combine record batches")?;
                Storage::InMemory(all)
            }
        };

        debug!(
            path = %path.display(),
            rows = total_rows,
            columns = schema.columns.len(),
            ?mode,
            "opened parquet source"
        );

        Ok(Self {
            metadata: SourceMetadata {
                path: path.to_path_buf(),
                total_rows,
                schema,
            },
            storage,
        })
    }

    async fn read_streaming(&self, range: RowRange) -> Result<Vec<Record>> {
        let builder = stream_builder(&self.metadata.path).await?;
        let stream = builder
            .with_offset(range.start as usize)
            .with_limit(range.len() as usize)
            .with_batch_size(PARQUET_BATCH_ROWS)
            .build()
            .context("Failed to build Parquet stream")?;

        let mut records = Vec::with_capacity(range.len() as usize);
        let mut stream = Box::pin(stream);
        while let Some(batch_result) = stream.next().await {
            let batch = batch_result.context("Failed to read record batch")?;
            let batch_records = record_batch_to_records(&batch)
                .context("Failed to convert RecordBatch to Records")?;
            records.extend(batch_records);
        }

        if records.len() as u64 != range.len() {
            anyhow::bail!(
                "Expected {} rows from offset {}, decoded {}",
                range.len(),
                range.start,
                records.len()
            );
        }

        Ok(records)
    }
}

async fn stream_builder(
    path: &Path,
) -> Result<ParquetRecordBatchStreamBuilder<tokio::fs::File>> {
    let file = tokio::fs::File::open(path)
        .await
        .context("Failed to open file for reading")?;
    ParquetRecordBatchStreamBuilder::new(file)
        .await
        .context("Failed to read Parquet metadata")
}

#[async_trait]
impl SourceReader for ParquetSource {
    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    async fn read_rows(&self, range: RowRange) -> Result<Batch, LoadError> {
        let range = range.clamp(self.metadata.total_rows);
        let schema = self.metadata.schema.clone();

        if range.is_empty() {
            return Ok(Batch {
                schema,
                records: Vec::new(),
            });
        }

        let records = match &self.storage {
            Storage::Streaming => self.read_streaming(range).await,
            Storage::InMemory(all) => {
                let slice = all.slice(range.start as usize, range.len() as usize);
                record_batch_to_records(&slice)
                    .context("Failed to convert RecordBatch to Records")
            }
        }
        .map_err(|e| LoadError::read(&self.metadata.path, e))?;

        Ok(Batch { schema, records })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::SqlType;
    use arrow::array::*;
    use arrow::datatypes::{DataType, Field, Schema};
    use parquet::arrow::ArrowWriter;
    use parquet::file::properties::WriterProperties;
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    /// Helper to create a test Parquet file
    fn create_test_parquet_file(num_rows: usize, row_group_size: usize) -> NamedTempFile {
        let temp_file = NamedTempFile::new().unwrap();

        let schema = Schema::new(vec![
            Field::new("id", DataType::Int32, false),
            Field::new("name", DataType::Utf8, true),
            Field::new("value", DataType::Float64, true),
        ]);

        let props = WriterProperties::builder()
            .set_max_row_group_size(row_group_size)
            .build();

        let file = std::fs::File::create(temp_file.path()).unwrap();
        let mut writer = ArrowWriter::try_new(file, Arc::new(schema.clone()), Some(props)).unwrap();

        // Write data in batches
        let batch_size = 100;
        for start in (0..num_rows).step_by(batch_size) {
            let end = std::cmp::min(start + batch_size, num_rows);

            let id_array = Int32Array::from_iter_values(start as i32..end as i32);
            let name_array =
                StringArray::from_iter_values((start..end).map(|i| format!("name_{}", i)));
            let value_array = Float64Array::from_iter_values((start..end).map(|i| i as f64 * 1.5));

            let batch = RecordBatch::try_new(
                Arc::new(schema.clone()),
                vec![
                    Arc::new(id_array),
                    Arc::new(name_array),
                    Arc::new(value_array),
                ],
            )
            .unwrap();

            writer.write(&batch).unwrap();
        }

        writer.close().unwrap();
        temp_file
    }

    #[tokio::test]
    async fn test_open_reads_metadata() {
        let temp_file = create_test_parquet_file(1000, 100);
        let source = ParquetSource::open(temp_file.path(), SourceMode::Streaming)
            .await
            .unwrap();

        assert_eq!(source.total_rows(), 1000);
        let schema = &source.metadata().schema;
        assert_eq!(schema.column_names(), vec!["id", "name", "value"]);
        assert_eq!(schema.columns[0].sql_type, SqlType::Integer);
        assert!(!schema.columns[0].nullable);
        assert_eq!(schema.columns[2].sql_type, SqlType::DoublePrecision);
    }

    #[tokio::test]
    async fn test_streaming_slice_crosses_row_groups() {
        let temp_file = create_test_parquet_file(1000, 100);
        let source = ParquetSource::open(temp_file.path(), SourceMode::Streaming)
            .await
            .unwrap();

        let batch = source.read_rows(RowRange::new(250, 480)).await.unwrap();
        assert_eq!(batch.num_rows(), 230);
        assert_eq!(batch.records[0].fields, vec!["250", "name_250", "375"]);
        assert_eq!(batch.records[229].fields[0], "479");
    }

    #[tokio::test]
    async fn test_streaming_and_in_memory_agree() {
        let temp_file = create_test_parquet_file(550, 200);
        let streaming = ParquetSource::open(temp_file.path(), SourceMode::Streaming)
            .await
            .unwrap();
        let in_memory = ParquetSource::open(temp_file.path(), SourceMode::InMemory)
            .await
            .unwrap();

        for range in [
            RowRange::new(0, 200),
            RowRange::new(190, 410),
            RowRange::new(500, 700),
        ] {
            let a = streaming.read_rows(range).await.unwrap();
            let b = in_memory.read_rows(range).await.unwrap();
            assert_eq!(a.records, b.records);
        }

        let tail = in_memory.read_rows(RowRange::new(500, 700)).await.unwrap();
        assert_eq!(tail.num_rows(), 50);
    }

    #[tokio::test]
    async fn test_empty_range_reads_nothing() {
        let temp_file = create_test_parquet_file(10, 100);
        let source = ParquetSource::open(temp_file.path(), SourceMode::Streaming)
            .await
            .unwrap();

        let batch = source.read_rows(RowRange::new(10, 20)).await.unwrap();
        assert_eq!(batch.num_rows(), 0);
        assert_eq!(batch.schema.columns.len(), 3);
    }

    #[tokio::test]
    async fn test_not_parquet_is_read_error() {
        use std::io::Write;
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "id,name").unwrap();
        temp_file.flush().unwrap();

        let result = ParquetSource::open(temp_file.path(), SourceMode::Streaming).await;
        assert!(matches!(result, Err(LoadError::Read { .. })));
    }
}
