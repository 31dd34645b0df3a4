//! Imputation of a missing reporting month.
//!
//! The month is synthesised from the same month one and two years earlier:
//! a seeded random fraction of each source is drawn (older weight 0.3,
//! newer weight 0.7 by default), every datetime column is shifted forward
//! by the calendar distance in days to the target month, and the two
//! samples are stacked. The result is written as an ordinary source file
//! and goes through the normal ingestion path.

use std::path::PathBuf;

use chrono::NaiveDate;
use polars::prelude::*;
use tracing::{info, warn};

use crate::config::ImputationConfig;
use crate::data_loader;
use crate::error::{PipelineError, PipelineResult};
use crate::store::TripDataStore;
use crate::types::TaxiVendor;

/// Summary of a synthesised month.
#[derive(Debug, Clone, PartialEq)]
pub struct ImputationOutcome {
    pub path: PathBuf,
    pub rows_from_older: usize,
    pub rows_from_newer: usize,
}

impl ImputationOutcome {
    pub fn total_rows(&self) -> usize {
        self.rows_from_older + self.rows_from_newer
    }
}

/// Days between the first of `month` in `source_year` and in `target_year`.
pub fn month_shift_days(source_year: i32, target_year: i32, month: u32) -> PipelineResult<i64> {
    let start = |year: i32| {
        NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
            PipelineError::invalid_param("month", format!("{}-{:02} is not a valid month", year, month))
        })
    };
    Ok((start(target_year)? - start(source_year)?).num_days())
}

fn units_per_day(unit: TimeUnit) -> i64 {
    match unit {
        TimeUnit::Nanoseconds => 86_400_000_000_000,
        TimeUnit::Microseconds => 86_400_000_000,
        TimeUnit::Milliseconds => 86_400_000,
    }
}

/// Shift every datetime column forward by `days`, keeping its unit and zone.
pub fn shift_datetime_columns(df: DataFrame, days: i64) -> PipelineResult<DataFrame> {
    let shifts: Vec<Expr> = df
        .get_columns()
        .iter()
        .filter_map(|column| match column.dtype() {
            DataType::Datetime(unit, tz) => {
                let name = column.name().as_str();
                let delta = days * units_per_day(*unit);
                Some(
                    (col(name).cast(DataType::Int64) + lit(delta))
                        .cast(DataType::Datetime(*unit, tz.clone()))
                        .alias(name),
                )
            }
            _ => None,
        })
        .collect();

    if shifts.is_empty() {
        return Ok(df);
    }
    df.lazy()
        .with_columns(shifts)
        .collect()
        .map_err(|e| PipelineError::PolarsError(format!("Date shift failed: {}", e)))
}

/// Seeded sample of a fraction of the rows, without replacement.
pub fn sample_fraction(df: &DataFrame, fraction: f64, seed: u64) -> PipelineResult<DataFrame> {
    if !(fraction > 0.0 && fraction <= 1.0) {
        return Err(PipelineError::invalid_param(
            "fraction",
            format!("{} is outside (0, 1]", fraction),
        ));
    }
    let frac = Series::new("frac".into(), &[fraction]);
    df.sample_frac(&frac, false, false, Some(seed))
        .map_err(|e| PipelineError::PolarsError(format!("Sampling failed: {}", e)))
}

/// Sample one source month and move it onto the target year.
pub fn sample_and_shift(
    source: &DataFrame,
    fraction: f64,
    source_year: i32,
    target_year: i32,
    config: &ImputationConfig,
) -> PipelineResult<DataFrame> {
    shift_datetime_columns(
        sample_fraction(source, fraction, config.seed)?,
        month_shift_days(source_year, target_year, config.month)?,
    )
}

/// Stack the older and newer samples. Columns present in only one sample
/// are null in the rows drawn from the other.
pub fn stack_samples(older: DataFrame, newer: DataFrame) -> PipelineResult<DataFrame> {
    concat_lf_diagonal(
        [older.lazy(), newer.lazy()],
        UnionArgs {
            to_supertypes: true,
            ..Default::default()
        },
    )
    .and_then(|lf| lf.collect())
    .map_err(|e| PipelineError::PolarsError(format!("Failed to combine samples: {}", e)))
}

/// Blend two historical months into the target month.
///
/// `older` and `newer` are the raw source frames for `target_year - 2` and
/// `target_year - 1`.
pub fn blend_months(
    older: &DataFrame,
    newer: &DataFrame,
    target_year: i32,
    config: &ImputationConfig,
) -> PipelineResult<(DataFrame, usize, usize)> {
    let older_sample =
        sample_and_shift(older, config.older_weight, target_year - 2, target_year, config)?;
    let newer_sample =
        sample_and_shift(newer, config.newer_weight, target_year - 1, target_year, config)?;

    let rows_from_older = older_sample.height();
    let rows_from_newer = newer_sample.height();
    let blended = stack_samples(older_sample, newer_sample)?;
    Ok((blended, rows_from_older, rows_from_newer))
}

/// Synthesises a missing month from the two preceding years.
pub struct MonthImputer<'a> {
    store: &'a dyn TripDataStore,
    config: ImputationConfig,
}

impl<'a> MonthImputer<'a> {
    pub fn new(store: &'a dyn TripDataStore, config: ImputationConfig) -> Self {
        Self { store, config }
    }

    fn load_sample(
        &self,
        vendor: TaxiVendor,
        source_year: i32,
        target_year: i32,
        fraction: f64,
    ) -> PipelineResult<DataFrame> {
        let path = self.store.source_path(vendor, source_year, self.config.month);
        let source = data_loader::load_parquet(path)?;
        sample_and_shift(&source, fraction, source_year, target_year, &self.config)
    }

    /// Impute the configured month of `target_year` for one vendor.
    ///
    /// Returns `Ok(None)` with a warning when either source month is not
    /// available locally; the year then has a one-month gap.
    pub fn impute(
        &self,
        vendor: TaxiVendor,
        target_year: i32,
    ) -> PipelineResult<Option<ImputationOutcome>> {
        let month = self.config.month;
        let older_year = target_year - 2;
        let newer_year = target_year - 1;
        let older_present = self.store.has_month(vendor, older_year, month);
        let newer_present = self.store.has_month(vendor, newer_year, month);

        if !older_present || !newer_present {
            warn!(
                %vendor,
                target_year,
                month,
                older_year,
                older_present,
                newer_year,
                newer_present,
                "IMPUTATION_SKIPPED: source month missing"
            );
            return Ok(None);
        }

        info!(%vendor, target_year, month, "IMPUTATION_START");
        // Sampling needs the whole month; only one source is resident at a time.
        let older_sample =
            self.load_sample(vendor, older_year, target_year, self.config.older_weight)?;
        let newer_sample =
            self.load_sample(vendor, newer_year, target_year, self.config.newer_weight)?;
        let rows_from_older = older_sample.height();
        let rows_from_newer = newer_sample.height();
        let mut blended = stack_samples(older_sample, newer_sample)?;

        let path = self
            .store
            .save_month(vendor, target_year, month, &mut blended)?;
        info!(
            %vendor,
            target_year,
            month,
            rows_from_older,
            rows_from_newer,
            path = %path.display(),
            "IMPUTATION_DONE"
        );

        Ok(Some(ImputationOutcome {
            path,
            rows_from_older,
            rows_from_newer,
        }))
    }
}
