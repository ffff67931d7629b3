//! Progress events emitted by the loaders, and the sinks that consume them

use std::time::Duration;

use indicatif::{HumanCount, ProgressBar, ProgressStyle};
use tracing::info;

use crate::formats::RowRange;

/// Progress record for one written trip chunk
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkProgress {
    pub table: String,
    pub chunk_index: u64,
    pub total_chunks: u64,
    pub range: RowRange,
    pub rows_written: u64,
    pub elapsed: Duration,
}

/// Progress record for the zone lookup write
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneProgress {
    pub table: String,
    pub rows_written: u64,
    pub elapsed: Duration,
}

/// Events sent from the loaders to the progress sink
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Trip source opened and chunk plan computed
    TripsPlanned {
        table: String,
        total_rows: u64,
        total_chunks: u64,
        chunk_size: u64,
    },
    ChunkWritten(ChunkProgress),
    /// Every trip chunk written
    TripsLoaded {
        table: String,
        rows_written: u64,
        elapsed: Duration,
    },
    /// Zone lookup about to be read and written
    ZonesStarted { table: String },
    ZonesWritten(ZoneProgress),
}

/// Rows per second, `None` when there are no rows or no measurable time
pub fn rows_per_second(rows: u64, elapsed: Duration) -> Option<f64> {
    let secs = elapsed.as_secs_f64();
    if rows == 0 || secs == 0.0 {
        return None;
    }
    Some(rows as f64 / secs)
}

/// Observer of load progress
pub trait ProgressSink: Send {
    fn record(&mut self, event: &ProgressEvent);
}

/// Statistics aggregated from progress events
#[derive(Debug, Default, Clone)]
pub struct ProgressStats {
    pub chunks_written: u64,
    pub trip_rows_written: u64,
    pub zone_rows_written: u64,
    pub chunk_durations_ms: Vec<u64>,
}

impl ProgressStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update stats with a progress event
    pub fn update(&mut self, event: &ProgressEvent) {
        match event {
            ProgressEvent::TripsPlanned { .. }
            | ProgressEvent::TripsLoaded { .. }
            | ProgressEvent::ZonesStarted { .. } => {}
            ProgressEvent::ChunkWritten(chunk) => {
                self.chunks_written += 1;
                self.trip_rows_written += chunk.rows_written;
                self.chunk_durations_ms
                    .push(chunk.elapsed.as_millis() as u64);
            }
            ProgressEvent::ZonesWritten(zones) => {
                self.zone_rows_written += zones.rows_written;
            }
        }
    }

    /// Calculate percentile from chunk durations
    pub fn percentile(&self, p: f64) -> Option<u64> {
        if self.chunk_durations_ms.is_empty() {
            return None;
        }

        let mut sorted = self.chunk_durations_ms.clone();
        sorted.sort_unstable();

        let index = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
        let index = index.saturating_sub(1).min(sorted.len() - 1);

        Some(sorted[index])
    }

    /// Get p50, p90, p99 percentiles
    pub fn get_percentiles(&self) -> (Option<u64>, Option<u64>, Option<u64>) {
        (
            self.percentile(50.0),
            self.percentile(90.0),
            self.percentile(99.0),
        )
    }
}

impl ProgressSink for ProgressStats {
    fn record(&mut self, event: &ProgressEvent) {
        self.update(event);
    }
}

/// Forwards every event to two sinks
pub struct Tee<'a> {
    pub first: &'a mut dyn ProgressSink,
    pub second: &'a mut dyn ProgressSink,
}

impl ProgressSink for Tee<'_> {
    fn record(&mut self, event: &ProgressEvent) {
        self.first.record(event);
        self.second.record(event);
    }
}

/// Discards every event
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn record(&mut self, _event: &ProgressEvent) {}
}

/// Emits every event as a structured tracing event
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn record(&mut self, event: &ProgressEvent) {
        match event {
            ProgressEvent::TripsPlanned {
                table,
                total_rows,
                total_chunks,
                chunk_size,
            } => info!(table, total_rows, total_chunks, chunk_size, "trip load planned"),
            ProgressEvent::ChunkWritten(chunk) => info!(
                table = chunk.table,
                chunk = chunk.chunk_index,
                total_chunks = chunk.total_chunks,
                start = chunk.range.start,
                end = chunk.range.end,
                rows = chunk.rows_written,
                elapsed_secs = chunk.elapsed.as_secs_f64(),
                "chunk written"
            ),
            ProgressEvent::TripsLoaded {
                table,
                rows_written,
                elapsed,
            } => info!(
                table,
                rows = rows_written,
                elapsed_secs = elapsed.as_secs_f64(),
                rows_per_sec = rows_per_second(*rows_written, *elapsed).unwrap_or(0.0),
                "trip load finished"
            ),
            ProgressEvent::ZonesStarted { table } => info!(table, "loading zones"),
            ProgressEvent::ZonesWritten(zones) => info!(
                table = zones.table,
                rows = zones.rows_written,
                elapsed_secs = zones.elapsed.as_secs_f64(),
                "zones written"
            ),
        }
    }
}

/// Human-readable console output with a chunk progress bar
#[derive(Default)]
pub struct ConsoleProgress {
    bar: Option<ProgressBar>,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn println(&self, line: String) {
        match &self.bar {
            Some(bar) if !bar.is_hidden() => bar.println(line),
            _ => println!("{line}"),
        }
    }
}

impl ProgressSink for ConsoleProgress {
    fn record(&mut self, event: &ProgressEvent) {
        for line in console_lines(event) {
            self.println(line);
        }

        match event {
            ProgressEvent::TripsPlanned { total_chunks, .. } if *total_chunks > 0 => {
                let bar = ProgressBar::new(*total_chunks);
                if let Ok(style) = ProgressStyle::default_bar().template(
                    "[{elapsed_precise}] Chunks: [{bar:30.cyan/blue}] {pos}/{len} ({percent}%)",
                ) {
                    bar.set_style(style.progress_chars("=>-"));
                }
                self.bar = Some(bar);
            }
            ProgressEvent::ChunkWritten(chunk) => {
                if let Some(bar) = &self.bar {
                    bar.inc(1);
                }
                if chunk.chunk_index == chunk.total_chunks
                    && let Some(bar) = self.bar.take()
                {
                    bar.finish_and_clear();
                }
            }
            _ => {}
        }
    }
}

/// Status lines printed by [`ConsoleProgress`] for one event
fn console_lines(event: &ProgressEvent) -> Vec<String> {
    let rule = "-".repeat(60);
    let banner = "=".repeat(60);
    match event {
        ProgressEvent::TripsPlanned {
            table,
            total_rows,
            total_chunks,
            chunk_size,
        } => vec![
            String::new(),
            format!("[1/2] Loading {table} in chunks..."),
            rule,
            format!("Total rows to load: {}", HumanCount(*total_rows)),
            format!(
                "Processing in {} chunks of {} rows each",
                total_chunks,
                HumanCount(*chunk_size)
            ),
            String::new(),
        ],
        ProgressEvent::ChunkWritten(chunk) => {
            let action = if chunk.chunk_index == 1 {
                "Created table and loaded"
            } else {
                "Loaded"
            };
            vec![
                format!(
                    "✓ Chunk {}/{}: {} rows {} to {}",
                    chunk.chunk_index,
                    chunk.total_chunks,
                    action,
                    HumanCount(chunk.range.start + 1),
                    HumanCount(chunk.range.end)
                ),
                format!("  Time taken: {:.2} seconds", chunk.elapsed.as_secs_f64()),
            ]
        }
        ProgressEvent::TripsLoaded {
            table,
            rows_written,
            elapsed,
        } => {
            let speed = match rows_per_second(*rows_written, *elapsed) {
                Some(rate) => format!("{} rows/second", HumanCount(rate.round() as u64)),
                None => "n/a".to_string(),
            };
            vec![
                String::new(),
                banner.clone(),
                format!("{table} loading complete!"),
                format!("Total rows loaded: {}", HumanCount(*rows_written)),
                format!("Total time: {:.2} seconds", elapsed.as_secs_f64()),
                format!("Average speed: {speed}"),
                banner,
            ]
        }
        ProgressEvent::ZonesStarted { table } => vec![
            String::new(),
            format!("[2/2] Loading {table} lookup data..."),
            rule,
        ],
        ProgressEvent::ZonesWritten(zones) => vec![
            format!(
                "✓ Loaded {} rows into {} table",
                HumanCount(zones.rows_written),
                zones.table
            ),
            format!("  Time taken: {:.2} seconds", zones.elapsed.as_secs_f64()),
        ],
    }
}
