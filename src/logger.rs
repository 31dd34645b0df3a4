//! Structured logging for the ingestion pipeline.
//!
//! Installs a `tracing` subscriber (console plus an optional JSON file
//! layer) and provides named helpers for the events every run emits, so
//! log lines stay greppable across modules.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::types::TaxiVendor;

/// Global run id counter.
static RUN_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Allocate a new run id for correlating one ingestion run's events.
pub fn new_run_id() -> u64 {
    RUN_ID_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Initialise the global subscriber.
///
/// `default_level` applies to this crate unless `RUST_LOG` says otherwise.
/// When `log_dir` is given, a JSON copy of every event is written to
/// `<log_dir>/pipeline.log`; keep the returned guard alive until exit so
/// the file layer flushes.
pub fn init_logging(default_level: &str, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("taxi_ingest={}", default_level)));

    let console_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    match log_dir {
        Some(dir) if std::fs::create_dir_all(dir).is_ok() => {
            let file_appender = tracing_appender::rolling::never(dir, "pipeline.log");
            let (writer, guard) = tracing_appender::non_blocking(file_appender);
            let file_layer = fmt::layer().json().with_writer(writer);
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(console_layer)
                .with(file_layer)
                .try_init();
            Some(guard)
        }
        _ => {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(console_layer)
                .try_init();
            None
        }
    }
}

// Named events

pub fn log_month_start(vendor: TaxiVendor, year: i32, month: u32, total_rows: usize) {
    info!(%vendor, year, month, total_rows, "MONTH_START");
}

pub fn log_month_missing(vendor: TaxiVendor, year: i32, month: u32, path: &Path) {
    warn!(%vendor, year, month, path = %path.display(), "MONTH_MISSING: source file not found");
}

pub fn log_chunk_progress(vendor: TaxiVendor, year: i32, month: u32, rows_done: usize, total_rows: usize) {
    info!(%vendor, year, month, rows_done, total_rows, "CHUNK_PROGRESS");
}

pub fn log_month_done(vendor: TaxiVendor, year: i32, month: u32, rows_kept: usize, filtered: u64) {
    info!(%vendor, year, month, rows_kept, filtered, "MONTH_DONE");
}

pub fn log_ghost_trips_filtered(rows_in: usize, filtered: u64) {
    debug!(rows_in, filtered, "GHOST_TRIPS_FILTERED");
}

pub fn log_audit_write_failed(path: &Path, reason: &str) {
    warn!(path = %path.display(), reason, "AUDIT_WRITE_FAILED: cleaned data kept");
}

pub fn log_year_written(year: i32, rows: usize, filtered: u64, path: &Path) {
    info!(year, rows, filtered, path = %path.display(), "YEAR_WRITTEN");
}
