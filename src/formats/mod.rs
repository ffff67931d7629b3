//! File format readers: parquet and delimited text behind one slicing interface

pub mod delimited;
pub mod parquet;
pub mod reader;

pub use reader::{
    Batch, DelimitedConfig, Format, Record, RowRange, SourceMetadata, SourceMode, SourceReader,
    open_source,
};
