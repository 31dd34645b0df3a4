//! Chunked ingestion driver.
//!
//! Turns a year of monthly source files into one cleaned yearly dataset and
//! one consolidated audit log:
//! - each vendor month is read in fixed-size row slices
//! - every slice is unified onto the canonical schema, then ghost-filtered
//! - cleaned slices are concatenated per month, months per year
//! - the month audit is written once per month, the year audit once per year
//!
//! Missing months are skipped with a warning. For the configured current
//! year, a missing imputation month is synthesised first and then read like
//! any other source file. Row order holds within a slice only.

use std::path::{Path, PathBuf};

use polars::prelude::*;
use tracing::{info, info_span, warn};

use crate::audit::AuditLog;
use crate::config::PipelineConfig;
use crate::data_loader::ChunkedParquetReader;
use crate::error::{PipelineError, PipelineResult};
use crate::ghost_filter::GhostTripFilter;
use crate::imputer::MonthImputer;
use crate::logger;
use crate::schema::{empty_canonical_frame, SchemaUnifier};
use crate::store::TripDataStore;
use crate::types::TaxiVendor;

/// Cleaned rows and audit for one source file.
#[derive(Debug, Clone)]
pub struct MonthOutcome {
    pub cleaned: DataFrame,
    pub audit: AuditLog,
    pub rows_read: usize,
    pub chunks: usize,
}

/// What a yearly run produced.
#[derive(Debug, Clone, Default)]
pub struct YearSummary {
    pub year: i32,
    pub months_processed: usize,
    /// Vendor months with no source file
    pub months_missing: Vec<(TaxiVendor, u32)>,
    pub rows_read: usize,
    pub rows_kept: usize,
    pub audit: AuditLog,
    /// `None` when no month had data
    pub output_path: Option<PathBuf>,
    /// Vendors whose imputation month was synthesised in this run
    pub imputed: Vec<TaxiVendor>,
}

/// Orchestrates unification, filtering and persistence for a year.
pub struct IngestionDriver<S: TripDataStore> {
    config: PipelineConfig,
    store: S,
    unifier: SchemaUnifier,
    filter: GhostTripFilter,
}

impl<S: TripDataStore> IngestionDriver<S> {
    pub fn new(config: PipelineConfig, store: S) -> Self {
        let filter = GhostTripFilter::new(config.ghost.clone());
        Self {
            config,
            store,
            unifier: SchemaUnifier::default(),
            filter,
        }
    }

    /// Replace the default column mapping table.
    pub fn with_unifier(mut self, unifier: SchemaUnifier) -> Self {
        self.unifier = unifier;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Read one source file slice by slice, unifying and filtering each.
    pub fn process_file(
        &self,
        path: &Path,
        vendor: TaxiVendor,
        year: i32,
        month: u32,
    ) -> PipelineResult<MonthOutcome> {
        let reader = ChunkedParquetReader::open(path, self.config.chunk_size)?;
        let total_rows = reader.total_rows();
        logger::log_month_start(vendor, year, month, total_rows);

        let progress_every = self.config.progress_every_chunks.max(1);
        let mut cleaned_slices = Vec::with_capacity(reader.chunk_count());
        let mut audit = AuditLog::new();
        let mut rows_read = 0;
        let mut chunks = 0;

        for slice in reader {
            let slice = slice?;
            rows_read += slice.height();

            let unified = self.unifier.unify(slice)?;
            let outcome = self.filter.filter(unified)?;
            cleaned_slices.push(outcome.cleaned);
            audit.merge(outcome.audit);

            chunks += 1;
            if chunks % progress_every == 0 {
                logger::log_chunk_progress(vendor, year, month, rows_read, total_rows);
            }
        }

        Ok(MonthOutcome {
            cleaned: concat_frames(cleaned_slices)?,
            audit,
            rows_read,
            chunks,
        })
    }

    /// Process one vendor month from the store.
    ///
    /// Returns `Ok(None)` if the source file is absent. The month audit is
    /// written once; a failed write is logged and the rows are kept.
    pub fn process_month(
        &self,
        vendor: TaxiVendor,
        year: i32,
        month: u32,
    ) -> PipelineResult<Option<MonthOutcome>> {
        let path = self.store.source_path(vendor, year, month);
        if !path.exists() {
            logger::log_month_missing(vendor, year, month, &path);
            return Ok(None);
        }

        let outcome = self.process_file(&path, vendor, year, month)?;

        let audit_path = self.store.month_audit_path(vendor, year, month);
        if let Err(e) = outcome.audit.write_json(&audit_path) {
            logger::log_audit_write_failed(&audit_path, &e.to_string());
        }
        logger::log_month_done(
            vendor,
            year,
            month,
            outcome.cleaned.height(),
            outcome.audit.total_filtered,
        );
        Ok(Some(outcome))
    }

    /// Synthesise the imputation month for `year` if it is the current year
    /// and the month is absent. Failures degrade to a warning.
    fn impute_if_needed(&self, vendor: TaxiVendor, year: i32) -> bool {
        let month = self.config.imputation.month;
        if year != self.config.current_year || self.store.has_month(vendor, year, month) {
            return false;
        }

        let imputer = MonthImputer::new(&self.store, self.config.imputation.clone());
        match imputer.impute(vendor, year) {
            Ok(outcome) => outcome.is_some(),
            Err(e) => {
                warn!(%vendor, year, month, error = %e, "IMPUTATION_FAILED: month left missing");
                false
            }
        }
    }

    /// Ingest every month of `year` for the given vendors.
    ///
    /// Writes the cleaned yearly dataset and the consolidated audit log,
    /// replacing earlier outputs for the year. When no month had data the
    /// earlier outputs are removed and nothing new is written.
    pub fn process_year(&self, year: i32, vendors: &[TaxiVendor]) -> PipelineResult<YearSummary> {
        if vendors.is_empty() {
            return Err(PipelineError::invalid_param("vendors", "at least one vendor is required"));
        }

        let run_id = logger::new_run_id();
        let span = info_span!("ingest", run_id, year);
        let _enter = span.enter();
        info!(vendors = ?vendors, chunk_size = self.config.chunk_size, "INGEST_START");

        let mut summary = YearSummary {
            year,
            ..YearSummary::default()
        };
        let mut months = Vec::new();

        for &vendor in vendors {
            if self.impute_if_needed(vendor, year) {
                summary.imputed.push(vendor);
            }

            for month in 1..=12 {
                match self.process_month(vendor, year, month)? {
                    Some(outcome) => {
                        summary.months_processed += 1;
                        summary.rows_read += outcome.rows_read;
                        summary.audit.merge(outcome.audit);
                        months.push(outcome.cleaned);
                    }
                    None => summary.months_missing.push((vendor, month)),
                }
            }
        }

        if months.is_empty() {
            let removed = self.store.clear_year(year)?;
            warn!(year, removed_stale = removed, "NO_DATA: no source months found, nothing written");
            return Ok(summary);
        }

        let mut year_df = concat_frames(months)?;
        summary.rows_kept = year_df.height();
        let output_path = self.store.save_year(year, &mut year_df)?;

        let audit_path = self.store.year_audit_path(year);
        if let Err(e) = summary.audit.write_json(&audit_path) {
            logger::log_audit_write_failed(&audit_path, &e.to_string());
        }

        logger::log_year_written(year, summary.rows_kept, summary.audit.total_filtered, &output_path);
        summary.output_path = Some(output_path);
        Ok(summary)
    }
}

/// Stack canonical frames; no frames gives an empty canonical frame.
pub fn concat_frames(frames: Vec<DataFrame>) -> PipelineResult<DataFrame> {
    if frames.is_empty() {
        return Ok(empty_canonical_frame());
    }
    let lazy: Vec<LazyFrame> = frames.into_iter().map(|df| df.lazy()).collect();
    concat(lazy, UnionArgs::default())
        .and_then(|lf| lf.collect())
        .map_err(|e| PipelineError::PolarsError(format!("Failed to concatenate batches: {}", e)))
}
