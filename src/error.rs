//! Typed errors for the load pipeline.
//!
//! Components return [`LoadError`]; the runner wraps it in a [`RunError`]
//! that names the failing stage and, for chunk writes, the chunk position.
//! Internals that are not part of this contract use `anyhow` and are boxed
//! into the matching variant at the component boundary.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum LoadError {
    /// Input artifact is missing, corrupt, unreadable or unsupported
    #[error("failed to read '{}'", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    /// The store could not be reached
    #[error("failed to connect to {target}")]
    Connection {
        target: String,
        #[source]
        source: sqlx::Error,
    },

    /// The store rejected a write, or a value did not fit its column type
    #[error("write to table '{table}' failed")]
    Write {
        table: String,
        #[source]
        source: BoxError,
    },

    /// A later chunk does not have the columns the first chunk established
    #[error(
        "schema mismatch for table '{table}': expected columns [{}], found [{}]",
        .expected.join(", "),
        .found.join(", ")
    )]
    SchemaMismatch {
        table: String,
        expected: Vec<String>,
        found: Vec<String>,
    },
}

impl LoadError {
    pub fn read(path: impl Into<PathBuf>, source: impl Into<BoxError>) -> Self {
        LoadError::Read {
            path: path.into(),
            source: source.into(),
        }
    }

    pub fn write(table: impl Into<String>, source: impl Into<BoxError>) -> Self {
        LoadError::Write {
            table: table.into(),
            source: source.into(),
        }
    }
}

/// Pipeline stage an error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Connect,
    SourceReader,
    ChunkLoader,
    ZoneLoader,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Connect => "connect",
            Stage::SourceReader => "source reader",
            Stage::ChunkLoader => "chunk loader",
            Stage::ZoneLoader => "zone loader",
        };
        f.write_str(name)
    }
}

/// 1-based chunk index and the total chunk count of the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPosition {
    pub index: u64,
    pub total: u64,
}

impl fmt::Display for ChunkPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.total)
    }
}

/// A failed run: the stage, the chunk (if any), and the underlying error
#[derive(Debug, Error)]
#[error("{stage} failed{}", .chunk.map(|c| format!(" at chunk {c}")).unwrap_or_default())]
pub struct RunError {
    pub stage: Stage,
    pub chunk: Option<ChunkPosition>,
    #[source]
    pub error: LoadError,
}

impl RunError {
    pub fn new(stage: Stage, error: LoadError) -> Self {
        Self {
            stage,
            chunk: None,
            error,
        }
    }

    pub fn at_chunk(stage: Stage, chunk: ChunkPosition, error: LoadError) -> Self {
        Self {
            stage,
            chunk: Some(chunk),
            error,
        }
    }
}
