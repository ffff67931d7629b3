//! Delimited text (CSV/TSV) sources

pub mod reader;

pub use reader::DelimitedSource;
