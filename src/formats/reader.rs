use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use super::delimited::DelimitedSource;
use super::parquet::ParquetSource;
use crate::db::schema::Schema;
use crate::error::LoadError;

/// A single record (row) from the source
///
/// Nulls are represented as empty strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub fields: Vec<String>,
}

/// Half-open row interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowRange {
    pub start: u64,
    pub end: u64,
}

impl RowRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clamp both ends to `total_rows`
    pub fn clamp(&self, total_rows: u64) -> Self {
        let end = self.end.min(total_rows);
        Self {
            start: self.start.min(end),
            end,
        }
    }
}

/// Rows read from a source, along with the schema they carry
#[derive(Debug, Clone)]
pub struct Batch {
    pub schema: Schema,
    pub records: Vec<Record>,
}

impl Batch {
    pub fn num_rows(&self) -> u64 {
        self.records.len() as u64
    }
}

/// Metadata about an opened source
#[derive(Debug, Clone)]
pub struct SourceMetadata {
    pub path: PathBuf,
    pub total_rows: u64,
    pub schema: Schema,
}

/// Random-access reader over a tabular artifact
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Metadata captured when the source was opened
    fn metadata(&self) -> &SourceMetadata;

    /// Read the rows in `range`; the end is clamped to the total row count
    async fn read_rows(&self, range: RowRange) -> Result<Batch, LoadError>;

    fn total_rows(&self) -> u64 {
        self.metadata().total_rows
    }
}

/// Configuration for delimited file reading (CSV, TSV, etc.)
#[derive(Debug, Clone)]
pub struct DelimitedConfig {
    pub delimiter: u8,
    pub quote: u8,
}

impl Default for DelimitedConfig {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
        }
    }
}

impl DelimitedConfig {
    pub fn csv() -> Self {
        Self::default()
    }

    pub fn tsv() -> Self {
        Self {
            delimiter: b'\t',
            quote: b'"',
        }
    }
}

/// Supported file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Csv,
    Tsv,
    Parquet,
}

impl Format {
    /// Parse format from string (case-insensitive)
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(Format::Csv),
            "tsv" => Ok(Format::Tsv),
            "parquet" => Ok(Format::Parquet),
            _ => Err(anyhow::anyhow!(
                "Unsupported format: {}. Supported formats: csv, tsv, parquet",
                s
            )),
        }
    }

    /// Auto-detect file format from the path's extension
    pub fn detect(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "csv" => Some(Format::Csv),
            "tsv" => Some(Format::Tsv),
            "parquet" => Some(Format::Parquet),
            _ => None,
        }
    }
}

impl std::str::FromStr for Format {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        Format::parse(s)
    }
}

/// How a columnar source serves slices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceMode {
    /// Decode only the requested rows on every slice
    #[default]
    Streaming,
    /// Load the whole artifact on open, then slice in memory
    InMemory,
}

/// Open a source reader for `path`, using `format` or the file extension
pub async fn open_source(
    path: &Path,
    format: Option<Format>,
    mode: SourceMode,
) -> Result<Arc<dyn SourceReader>, LoadError> {
    let format = match format.or_else(|| Format::detect(path)) {
        Some(format) => format,
        None => {
            return Err(LoadError::read(
                path,
                anyhow::anyhow!(
                    "Could not detect format from file extension. \
                     Supported extensions: .csv, .tsv, .parquet"
                ),
            ));
        }
    };

    let reader: Arc<dyn SourceReader> = match format {
        Format::Csv => Arc::new(DelimitedSource::open(path, DelimitedConfig::csv()).await?),
        Format::Tsv => Arc::new(DelimitedSource::open(path, DelimitedConfig::tsv()).await?),
        Format::Parquet => Arc::new(ParquetSource::open(path, mode).await?),
    };

    Ok(reader)
}
