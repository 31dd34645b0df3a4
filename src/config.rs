//! Pipeline configuration.
//!
//! All paths and tunables are carried in [`PipelineConfig`] and handed to
//! the pipeline entry points. Nothing is created on disk until
//! [`PipelineConfig::prepare_directories`] is called.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::{PipelineError, PipelineResult};
use crate::types::TaxiVendor;

/// Thresholds for the ghost-trip rules.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GhostTripThresholds {
    /// Average speed above which a trip is physically impossible
    pub max_speed_mph: f64,
    /// Trips shorter than this many minutes are teleporter candidates
    pub teleporter_max_minutes: f64,
    /// Teleporter candidates charging more than this fare are rejected
    pub teleporter_min_fare: f64,
}

impl Default for GhostTripThresholds {
    fn default() -> Self {
        Self {
            max_speed_mph: 65.0,
            teleporter_max_minutes: 1.0,
            teleporter_min_fare: 20.0,
        }
    }
}

/// Settings for synthesising a missing month.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ImputationConfig {
    /// Month (1-12) that is imputed for the current year
    pub month: u32,
    /// Sample fraction drawn from the month two years back
    pub older_weight: f64,
    /// Sample fraction drawn from the month one year back
    pub newer_weight: f64,
    /// Sampling seed; fixed so reruns produce the same month
    pub seed: u64,
}

impl Default for ImputationConfig {
    fn default() -> Self {
        Self {
            month: 12,
            older_weight: 0.3,
            newer_weight: 0.7,
            seed: 42,
        }
    }
}

/// Configuration for the ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root data directory
    pub data_dir: PathBuf,
    /// Monthly source files; defaults to `<data_dir>/raw`
    pub raw_dir: Option<PathBuf>,
    /// Cleaned yearly output; defaults to `<data_dir>/processed`
    pub processed_dir: Option<PathBuf>,
    /// Audit logs; defaults to `<data_dir>/audit_logs`
    pub audit_dir: Option<PathBuf>,
    /// Log files; defaults to `<data_dir>/logs`
    pub log_dir: Option<PathBuf>,
    /// Rows per slice when reading a monthly file
    pub chunk_size: usize,
    /// Emit a progress line every N slices
    pub progress_every_chunks: usize,
    /// Most recent year; its missing imputation month is synthesised
    pub current_year: i32,
    /// Vendor categories processed when none are given explicitly
    pub vendors: Vec<TaxiVendor>,
    /// Date the congestion toll took effect
    pub policy_start: NaiveDate,
    pub ghost: GhostTripThresholds,
    pub imputation: ImputationConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            raw_dir: None,
            processed_dir: None,
            audit_dir: None,
            log_dir: None,
            chunk_size: 100_000,
            progress_every_chunks: 10,
            current_year: 2025,
            vendors: TaxiVendor::ALL.to_vec(),
            policy_start: NaiveDate::from_ymd_opt(2025, 1, 5).unwrap_or_default(),
            ghost: GhostTripThresholds::default(),
            imputation: ImputationConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Configuration rooted at the given data directory.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file and validate it.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> PipelineResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text and validate it.
    pub fn from_toml_str(content: &str) -> PipelineResult<Self> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.chunk_size == 0 {
            return Err(PipelineError::invalid_param("chunk_size", "must be positive"));
        }
        if self.progress_every_chunks == 0 {
            return Err(PipelineError::invalid_param(
                "progress_every_chunks",
                "must be positive",
            ));
        }
        if !(1..=12).contains(&self.imputation.month) {
            return Err(PipelineError::invalid_param(
                "imputation.month",
                format!("{} is not a calendar month", self.imputation.month),
            ));
        }
        for (name, weight) in [
            ("imputation.older_weight", self.imputation.older_weight),
            ("imputation.newer_weight", self.imputation.newer_weight),
        ] {
            if !(weight > 0.0 && weight <= 1.0) {
                return Err(PipelineError::invalid_param(
                    name,
                    format!("{} is outside (0, 1]", weight),
                ));
            }
        }
        if self.ghost.max_speed_mph <= 0.0 {
            return Err(PipelineError::invalid_param("ghost.max_speed_mph", "must be positive"));
        }
        Ok(())
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.raw_dir.clone().unwrap_or_else(|| self.data_dir.join("raw"))
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.processed_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("processed"))
    }

    pub fn audit_dir(&self) -> PathBuf {
        self.audit_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("audit_logs"))
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| self.data_dir.join("logs"))
    }

    /// Create the raw, processed, audit and log directories.
    pub fn prepare_directories(&self) -> PipelineResult<()> {
        for dir in [
            self.raw_dir(),
            self.processed_dir(),
            self.audit_dir(),
            self.log_dir(),
        ] {
            fs::create_dir_all(&dir).map_err(|e| {
                PipelineError::io(format!(
                    "Failed to create directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }
        for vendor in &self.vendors {
            let dir = self.raw_dir().join(vendor.as_str());
            fs::create_dir_all(&dir).map_err(|e| {
                PipelineError::io(format!(
                    "Failed to create directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }
}
