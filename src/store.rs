//! Storage abstraction for trip data.
//!
//! Monthly source files, the cleaned yearly dataset and audit logs are
//! addressed through [`TripDataStore`]. [`ParquetTripStore`] lays them out
//! on the local filesystem:
//!
//! ```text
//! raw/<vendor>/<vendor>_tripdata_<YYYY>-<MM>.parquet
//! processed/processed_<YYYY>.parquet
//! audit_logs/<vendor>_<YYYY>_<MM>_audit.json
//! audit_logs/combined_audit_<YYYY>.json
//! ```
//!
//! Writes replace whole files; concurrent runs against the same year are
//! not safe.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use polars::prelude::*;

use crate::config::PipelineConfig;
use crate::data_loader;
use crate::error::{PipelineError, PipelineResult};
use crate::types::TaxiVendor;

/// Abstract storage interface for monthly sources and yearly outputs.
pub trait TripDataStore: Send + Sync {
    /// Location of a monthly source file.
    fn source_path(&self, vendor: TaxiVendor, year: i32, month: u32) -> PathBuf;

    /// Location of the cleaned dataset for a year.
    fn year_path(&self, year: i32) -> PathBuf;

    /// Location of the audit log for one vendor month.
    fn month_audit_path(&self, vendor: TaxiVendor, year: i32, month: u32) -> PathBuf;

    /// Location of the consolidated audit log for a year.
    fn year_audit_path(&self, year: i32) -> PathBuf;

    /// Write a monthly source file (used for imputed months).
    fn save_month(
        &self,
        vendor: TaxiVendor,
        year: i32,
        month: u32,
        df: &mut DataFrame,
    ) -> PipelineResult<PathBuf>;

    /// Write the cleaned dataset for a year, replacing any earlier one.
    fn save_year(&self, year: i32, df: &mut DataFrame) -> PipelineResult<PathBuf>;

    /// Lazy scan of the cleaned dataset for a year.
    fn load_year(&self, year: i32) -> PipelineResult<LazyFrame>;

    /// Delete the cleaned dataset and consolidated audit log of a year.
    /// Returns whether anything was removed.
    fn clear_year(&self, year: i32) -> PipelineResult<bool>;

    fn has_month(&self, vendor: TaxiVendor, year: i32, month: u32) -> bool {
        self.source_path(vendor, year, month).exists()
    }

    fn has_year(&self, year: i32) -> bool {
        self.year_path(year).exists()
    }

    /// Months (1-12) with a source file present.
    fn available_months(&self, vendor: TaxiVendor, year: i32) -> Vec<u32> {
        (1..=12)
            .filter(|m| self.has_month(vendor, year, *m))
            .collect()
    }
}

/// Parquet file store on the local filesystem.
#[derive(Debug, Clone)]
pub struct ParquetTripStore {
    raw_dir: PathBuf,
    processed_dir: PathBuf,
    audit_dir: PathBuf,
}

impl ParquetTripStore {
    pub fn new(
        raw_dir: impl Into<PathBuf>,
        processed_dir: impl Into<PathBuf>,
        audit_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            raw_dir: raw_dir.into(),
            processed_dir: processed_dir.into(),
            audit_dir: audit_dir.into(),
        }
    }

    /// Store using the directories of a pipeline configuration.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.raw_dir(), config.processed_dir(), config.audit_dir())
    }

    pub fn raw_dir(&self) -> &Path {
        &self.raw_dir
    }

    pub fn audit_dir(&self) -> &Path {
        &self.audit_dir
    }
}

/// TLC file name for a vendor month.
pub fn source_file_name(vendor: TaxiVendor, year: i32, month: u32) -> String {
    format!("{}_tripdata_{}-{:02}.parquet", vendor.as_str(), year, month)
}

fn write_parquet(path: &Path, df: &mut DataFrame) -> PipelineResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| PipelineError::io(format!("Failed to create directory: {}", e)))?;
    }

    let file = File::create(path)
        .map_err(|e| PipelineError::io(format!("Failed to create file: {}", e)))?;

    ParquetWriter::new(file)
        .finish(df)
        .map_err(|e| PipelineError::PolarsError(format!("Failed to write Parquet: {}", e)))?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> PipelineResult<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(PipelineError::io(format!(
            "Failed to remove {}: {}",
            path.display(),
            e
        ))),
    }
}

impl TripDataStore for ParquetTripStore {
    fn source_path(&self, vendor: TaxiVendor, year: i32, month: u32) -> PathBuf {
        self.raw_dir
            .join(vendor.as_str())
            .join(source_file_name(vendor, year, month))
    }

    fn year_path(&self, year: i32) -> PathBuf {
        self.processed_dir.join(format!("processed_{}.parquet", year))
    }

    fn month_audit_path(&self, vendor: TaxiVendor, year: i32, month: u32) -> PathBuf {
        self.audit_dir
            .join(format!("{}_{}_{:02}_audit.json", vendor.as_str(), year, month))
    }

    fn year_audit_path(&self, year: i32) -> PathBuf {
        self.audit_dir.join(format!("combined_audit_{}.json", year))
    }

    fn save_month(
        &self,
        vendor: TaxiVendor,
        year: i32,
        month: u32,
        df: &mut DataFrame,
    ) -> PipelineResult<PathBuf> {
        let path = self.source_path(vendor, year, month);
        write_parquet(&path, df)?;
        Ok(path)
    }

    fn save_year(&self, year: i32, df: &mut DataFrame) -> PipelineResult<PathBuf> {
        let path = self.year_path(year);
        write_parquet(&path, df)?;
        Ok(path)
    }

    fn load_year(&self, year: i32) -> PipelineResult<LazyFrame> {
        data_loader::scan_parquet(self.year_path(year))
    }

    fn clear_year(&self, year: i32) -> PipelineResult<bool> {
        let dataset = remove_if_exists(&self.year_path(year))?;
        let audit = remove_if_exists(&self.year_audit_path(year))?;
        Ok(dataset || audit)
    }
}
