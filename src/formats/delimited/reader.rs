use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::db::schema::SchemaInferrer;
use crate::error::LoadError;
use crate::formats::reader::{
    Batch, DelimitedConfig, Record, RowRange, SourceMetadata, SourceReader,
};

/// Delimited file source held entirely in memory.
///
/// The first record is the header. Column types are inferred from every
/// data row, so the schema is the same for every slice.
pub struct DelimitedSource {
    metadata: SourceMetadata,
    records: Vec<Record>,
}

impl DelimitedSource {
    pub async fn open(path: &Path, config: DelimitedConfig) -> Result<Self, LoadError> {
        Self::load(path, &config)
            .await
            .map_err(|e| LoadError::read(path, e))
    }

    async fn load(path: &Path, config: &DelimitedConfig) -> Result<Self> {
        let buffer = tokio::fs::read(path)
            .await
            .context("Failed to open file for reading")?;

        let mut field_values = parse_records(&buffer, config)?;
        if field_values.is_empty() {
            anyhow::bail!("File is empty, expected a header row");
        }

        let inferrer = SchemaInferrer { has_header: true };
        let schema = inferrer
            .infer_from_data(&field_values)
            .context("Failed to infer schema")?;

        let records: Vec<Record> = field_values
            .drain(1..)
            .map(|fields| Record { fields })
            .collect();

        debug!(
            path = %path.display(),
            rows = records.len(),
            columns = schema.columns.len(),
            "loaded delimited source"
        );

        Ok(Self {
            metadata: SourceMetadata {
                path: path.to_path_buf(),
                total_rows: records.len() as u64,
                schema,
            },
            records,
        })
    }
}

/// Parse raw bytes into field vectors, header included
fn parse_records(buffer: &[u8], config: &DelimitedConfig) -> Result<Vec<Vec<String>>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(config.delimiter)
        .quote(config.quote)
        .has_headers(false) // header is handled by the schema inferrer
        .from_reader(buffer);

    let mut records = Vec::new();
    for result in csv_reader.records() {
        let record = result.context("Failed to parse CSV record")?;
        records.push(record.iter().map(|s| s.to_string()).collect());
    }

    Ok(records)
}

#[async_trait]
impl SourceReader for DelimitedSource {
    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    async fn read_rows(&self, range: RowRange) -> Result<Batch, LoadError> {
        let range = range.clamp(self.metadata.total_rows);
        let records = self.records[range.start as usize..range.end as usize].to_vec();

        Ok(Batch {
            schema: self.metadata.schema.clone(),
            records,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::SqlType;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn zone_csv() -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "LocationID,Borough,Zone,service_zone").unwrap();
        writeln!(temp_file, "1,EWR,Newark Airport,EWR").unwrap();
        writeln!(temp_file, "2,Queens,Jamaica Bay,Boro Zone").unwrap();
        writeln!(temp_file, "3,Bronx,Allerton/Pelham Gardens,Boro Zone").unwrap();
        writeln!(temp_file, "4,Manhattan,Alphabet City,Yellow Zone").unwrap();
        writeln!(temp_file, "5,Staten Island,Arden Heights,Boro Zone").unwrap();
        temp_file.flush().unwrap();
        temp_file
    }

    #[tokio::test]
    async fn test_open_reads_header_and_rows() {
        let temp_file = zone_csv();
        let source = DelimitedSource::open(temp_file.path(), DelimitedConfig::csv())
            .await
            .unwrap();

        assert_eq!(source.total_rows(), 5);
        let schema = &source.metadata().schema;
        assert_eq!(schema.columns[0].name, "LocationID");
        assert_eq!(schema.columns[0].sql_type, SqlType::SmallInt);
        assert_eq!(schema.columns[2].sql_type, SqlType::Text);
    }

    #[tokio::test]
    async fn test_read_rows_clamps_end() {
        let temp_file = zone_csv();
        let source = DelimitedSource::open(temp_file.path(), DelimitedConfig::csv())
            .await
            .unwrap();

        let batch = source.read_rows(RowRange::new(3, 100)).await.unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.records[0].fields[1], "Manhattan");
        assert_eq!(batch.records[1].fields[2], "Arden Heights");
    }

    #[tokio::test]
    async fn test_header_only_file_has_zero_rows() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "LocationID,Borough").unwrap();
        temp_file.flush().unwrap();

        let source = DelimitedSource::open(temp_file.path(), DelimitedConfig::csv())
            .await
            .unwrap();
        assert_eq!(source.total_rows(), 0);

        let batch = source.read_rows(RowRange::new(0, 0)).await.unwrap();
        assert_eq!(batch.num_rows(), 0);
        assert_eq!(batch.schema.columns.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_file_is_read_error() {
        let err = DelimitedSource::open(Path::new("/nonexistent/zones.csv"), DelimitedConfig::csv())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, LoadError::Read { .. }));
    }

    #[tokio::test]
    async fn test_ragged_rows_are_read_error() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "a,b,c").unwrap();
        writeln!(temp_file, "1,2").unwrap();
        temp_file.flush().unwrap();

        let result = DelimitedSource::open(temp_file.path(), DelimitedConfig::csv()).await;
        assert!(matches!(result, Err(LoadError::Read { .. })));
    }

    #[tokio::test]
    async fn test_empty_file_is_read_error() {
        let temp_file = NamedTempFile::new().unwrap();
        let result = DelimitedSource::open(temp_file.path(), DelimitedConfig::csv()).await;
        assert!(matches!(result, Err(LoadError::Read { .. })));
    }
}
