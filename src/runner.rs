//! High-level runner API for the taxi loader.
//!
//! This module provides the public entry point that connects to the
//! database, opens both sources, loads the trip data in chunks and then
//! replaces the zone lookup table.
//!
//! This is the primary API for external users and for the CLI.

use std::fmt;
use std::num::NonZeroU64;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use derive_builder::Builder;
use indicatif::HumanCount;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{
    ConnectionArgs, DEFAULT_CHUNK_SIZE, DEFAULT_INSERT_BATCH_ROWS, DEFAULT_TRIPS_TABLE,
    DEFAULT_ZONES_TABLE,
};
use crate::db::Store;
use crate::error::{RunError, Stage};
use crate::formats::{Format, SourceMode, open_source};
use crate::load::{ChunkLoader, TableWriter, TripLoadReport, ZoneLoadReport, ZoneLoader};
use crate::telemetry::{ProgressSink, ProgressStats, Tee, rows_per_second};

/// Arguments for running a load
#[derive(Debug, Clone, Builder)]
pub struct LoadConfig {
    pub connection: ConnectionArgs,

    /// Trip data file (parquet, csv or tsv)
    #[builder(setter(into))]
    pub trips_path: PathBuf,
    /// Zone lookup file (csv, tsv or parquet)
    #[builder(setter(into))]
    pub zones_path: PathBuf,

    #[builder(setter(into), default = "DEFAULT_TRIPS_TABLE.to_string()")]
    pub trips_table: String,
    #[builder(setter(into), default = "DEFAULT_ZONES_TABLE.to_string()")]
    pub zones_table: String,

    #[builder(default = "DEFAULT_CHUNK_SIZE")]
    pub chunk_size: NonZeroU64,
    #[builder(default = "DEFAULT_INSERT_BATCH_ROWS")]
    pub insert_batch_rows: usize,

    /// Explicit formats; detected from the file extension when `None`
    #[builder(default)]
    pub trips_format: Option<Format>,
    #[builder(default)]
    pub zones_format: Option<Format>,

    #[builder(default)]
    pub source_mode: SourceMode,
}

/// Result of a completed load run
#[derive(Debug, Clone)]
pub struct LoadSummary {
    pub run_id: Uuid,
    pub trips: TripLoadReport,
    pub zones: ZoneLoadReport,
    pub elapsed: Duration,
    /// p50, p90 and p99 of chunk write times in milliseconds
    pub chunk_percentiles_ms: (Option<u64>, Option<u64>, Option<u64>),
}

impl LoadSummary {
    /// Trip rows per second over the trip load, `None` when nothing can be measured
    pub fn throughput(&self) -> Option<f64> {
        rows_per_second(self.trips.rows_written, self.trips.elapsed)
    }
}

impl fmt::Display for LoadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let banner = "=".repeat(60);
        writeln!(f, "{banner}")?;
        writeln!(f, "Load Summary")?;
        writeln!(f, "{banner}")?;
        writeln!(f, "Run ID: {}", self.run_id)?;
        writeln!(
            f,
            "Trip rows loaded: {} into {} ({} chunks)",
            HumanCount(self.trips.rows_written),
            self.trips.table,
            self.trips.chunks_written
        )?;
        writeln!(
            f,
            "Zone rows loaded: {} into {}",
            HumanCount(self.zones.rows_written),
            self.zones.table
        )?;
        writeln!(
            f,
            "Trip load time: {:.2} seconds",
            self.trips.elapsed.as_secs_f64()
        )?;
        writeln!(f, "Total time: {:.2} seconds", self.elapsed.as_secs_f64())?;
        match self.throughput() {
            Some(rate) => writeln!(f, "Average speed: {} rows/second", HumanCount(rate.round() as u64))?,
            None => writeln!(f, "Average speed: n/a")?,
        }
        if let (Some(p50), Some(p90), Some(p99)) = self.chunk_percentiles_ms {
            writeln!(f, "Chunk time: p50 {p50}ms, p90 {p90}ms, p99 {p99}ms")?;
        }
        write!(f, "{banner}")
    }
}

/// Run a full load: trips in chunks, then the zone lookup
///
/// The database connection is closed on every exit path.
///
/// # Example
///
/// ```no_run
/// use taxi_loader::config::ConnectionArgsBuilder;
/// use taxi_loader::runner::{LoadConfigBuilder, run_load};
/// use taxi_loader::telemetry::LogProgress;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = LoadConfigBuilder::default()
///     .connection(ConnectionArgsBuilder::default().build()?)
///     .trips_path("green_tripdata_2025-11.parquet")
///     .zones_path("taxi_zone_lookup.csv")
///     .build()?;
///
/// let summary = run_load(&config, &mut LogProgress).await?;
/// println!("{summary}");
/// # Ok(())
/// # }
/// ```
pub async fn run_load(
    config: &LoadConfig,
    progress: &mut dyn ProgressSink,
) -> Result<LoadSummary, RunError> {
    let run_id = Uuid::new_v4();
    info!(
        %run_id,
        target = %config.connection.redacted(),
        trips = %config.trips_path.display(),
        zones = %config.zones_path.display(),
        "starting load run"
    );

    let mut store = Store::connect(&config.connection, config.insert_batch_rows)
        .await
        .map_err(|e| RunError::new(Stage::Connect, e))?;

    let result = run_with_writer(run_id, config, &mut store, progress).await;

    if let Err(e) = store.close().await {
        warn!(error = %e, "failed to close database connection");
    }

    result
}

/// Load both sources through `writer`
pub(crate) async fn run_with_writer(
    run_id: Uuid,
    config: &LoadConfig,
    writer: &mut dyn TableWriter,
    progress: &mut dyn ProgressSink,
) -> Result<LoadSummary, RunError> {
    let start_time = Instant::now();
    let mut stats = ProgressStats::new();
    let mut sink = Tee {
        first: &mut stats,
        second: progress,
    };

    let trips_source = open_source(&config.trips_path, config.trips_format, config.source_mode)
        .await
        .map_err(|e| RunError::new(Stage::SourceReader, e))?;

    let trips = ChunkLoader::new(&config.trips_table, config.chunk_size)
        .run(trips_source.as_ref(), writer, &mut sink)
        .await
        .map_err(|f| RunError::at_chunk(Stage::ChunkLoader, f.position, f.error))?;

    let zones_source = open_source(&config.zones_path, config.zones_format, SourceMode::InMemory)
        .await
        .map_err(|e| RunError::new(Stage::ZoneLoader, e))?;

    let zones = ZoneLoader::new(&config.zones_table)
        .run(zones_source.as_ref(), writer, &mut sink)
        .await
        .map_err(|e| RunError::new(Stage::ZoneLoader, e))?;

    let summary = LoadSummary {
        run_id,
        trips,
        zones,
        elapsed: start_time.elapsed(),
        chunk_percentiles_ms: stats.get_percentiles(),
    };

    info!(
        %run_id,
        trip_rows = summary.trips.rows_written,
        zone_rows = summary.zones.rows_written,
        elapsed_secs = summary.elapsed.as_secs_f64(),
        "load run complete"
    );

    Ok(summary)
}
