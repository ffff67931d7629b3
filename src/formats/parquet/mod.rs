//! Parquet file format support.
//!
//! This module provides functionality to read Apache Parquet files and load them into tables.
//! It includes:
//! - Schema mapping from Arrow types to SQL types
//! - Conversion from Arrow RecordBatches to row-based Records
//! - ParquetSource, a SourceReader that slices by row range

mod conversion;
mod reader;
mod schema;

pub use reader::ParquetSource;
