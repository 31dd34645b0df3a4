//! Ghost-trip detection.
//!
//! Three independent plausibility rules, each a pure predicate over a
//! [`TripRecord`]:
//! - impossible physics: average speed above the speed limit threshold
//! - teleporter: trip under a minute that still charged a large fare
//! - stationary: zero distance with a positive fare
//!
//! A row is removed if any rule holds and is listed in the audit once per
//! rule that holds. Elapsed time and speed are computed on the side and
//! never added to the batch, so the cleaned output keeps the canonical
//! schema. Rows with missing or non-positive elapsed time are kept unless
//! one of the rules explicitly fires.

use std::path::Path;

use polars::prelude::*;

use crate::audit::{AuditEntry, AuditLog, GhostCategory};
use crate::config::GhostTripThresholds;
use crate::error::{PipelineError, PipelineResult};
use crate::logger;
use crate::types::{CanonicalField, TripRecord};

/// Result of filtering one batch.
#[derive(Debug, Clone)]
pub struct FilterOutcome {
    /// Rows matching none of the rules, in input order
    pub cleaned: DataFrame,
    /// Rejected rows by category
    pub audit: AuditLog,
}

/// Ghost-trip filter over canonical batches.
#[derive(Debug, Clone, Default)]
pub struct GhostTripFilter {
    thresholds: GhostTripThresholds,
}

impl GhostTripFilter {
    pub fn new(thresholds: GhostTripThresholds) -> Self {
        Self { thresholds }
    }

    pub fn with_defaults() -> Self {
        Self::default()
    }

    pub fn thresholds(&self) -> &GhostTripThresholds {
        &self.thresholds
    }

    /// Average speed exceeds the configured maximum.
    pub fn is_impossible_physics(&self, trip: &TripRecord) -> bool {
        trip.avg_speed_mph()
            .map(|mph| mph > self.thresholds.max_speed_mph)
            .unwrap_or(false)
    }

    /// Near-zero duration with a large fare.
    pub fn is_teleporter(&self, trip: &TripRecord) -> bool {
        match (trip.elapsed_minutes(), trip.fare) {
            (Some(minutes), Some(fare)) => {
                minutes < self.thresholds.teleporter_max_minutes
                    && fare > self.thresholds.teleporter_min_fare
            }
            _ => false,
        }
    }

    /// Zero distance but charged.
    pub fn is_stationary(&self, trip: &TripRecord) -> bool {
        matches!((trip.trip_distance, trip.fare), (Some(d), Some(f)) if d == 0.0 && f > 0.0)
    }

    /// Every category whose rule holds for the trip.
    pub fn classify(&self, trip: &TripRecord) -> Vec<GhostCategory> {
        GhostCategory::ALL
            .iter()
            .copied()
            .filter(|category| self.matches(*category, trip))
            .collect()
    }

    /// Whether a single rule holds for the trip.
    pub fn matches(&self, category: GhostCategory, trip: &TripRecord) -> bool {
        match category {
            GhostCategory::ImpossiblePhysics => self.is_impossible_physics(trip),
            GhostCategory::Teleporter => self.is_teleporter(trip),
            GhostCategory::Stationary => self.is_stationary(trip),
        }
    }

    /// True if any rule rejects the trip.
    pub fn is_ghost(&self, trip: &TripRecord) -> bool {
        GhostCategory::ALL.iter().any(|c| self.matches(*c, trip))
    }

    /// Split a canonical batch into cleaned rows and an audit log.
    pub fn filter(&self, df: DataFrame) -> PipelineResult<FilterOutcome> {
        let trips = trip_records(&df)?;
        let mut audit = AuditLog::new();
        let mut keep = Vec::with_capacity(trips.len());

        for trip in &trips {
            let categories = self.classify(trip);
            for category in &categories {
                audit.record(*category, audit_entry(*category, trip));
            }
            if !categories.is_empty() {
                audit.total_filtered += 1;
            }
            keep.push(categories.is_empty());
        }

        let mask_series = Series::new("keep".into(), keep);
        let mask = mask_series
            .bool()
            .map_err(|e| PipelineError::PolarsError(e.to_string()))?;
        let cleaned = df
            .filter(mask)
            .map_err(|e| PipelineError::PolarsError(format!("Filter failed: {}", e)))?;

        logger::log_ghost_trips_filtered(trips.len(), audit.total_filtered);
        Ok(FilterOutcome { cleaned, audit })
    }

    /// Filter a batch and persist its audit log to `audit_path`, if given.
    ///
    /// A failed write is logged and does not affect the returned batch.
    pub fn filter_with_audit(
        &self,
        df: DataFrame,
        audit_path: Option<&Path>,
    ) -> PipelineResult<FilterOutcome> {
        let outcome = self.filter(df)?;
        if let Some(path) = audit_path {
            if let Err(e) = outcome.audit.write_json(path) {
                logger::log_audit_write_failed(path, &e.to_string());
            }
        }
        Ok(outcome)
    }
}

fn audit_entry(category: GhostCategory, trip: &TripRecord) -> AuditEntry {
    let base = AuditEntry {
        pickup_time: trip.pickup_time(),
        dropoff_time: trip.dropoff_time(),
        ..AuditEntry::default()
    };
    match category {
        GhostCategory::ImpossiblePhysics => AuditEntry {
            trip_distance: trip.trip_distance,
            avg_speed_mph: trip.avg_speed_mph().filter(|s| s.is_finite()),
            trip_time_min: trip.elapsed_minutes(),
            ..base
        },
        GhostCategory::Teleporter => AuditEntry {
            trip_time_min: trip.elapsed_minutes(),
            fare: trip.fare,
            ..base
        },
        GhostCategory::Stationary => AuditEntry {
            trip_distance: trip.trip_distance,
            fare: trip.fare,
            ..base
        },
    }
}

/// Extract the fields the rules need from a canonical batch.
pub fn trip_records(df: &DataFrame) -> PipelineResult<Vec<TripRecord>> {
    let pickup = datetime_micros(df, CanonicalField::PickupTime.name())?;
    let dropoff = datetime_micros(df, CanonicalField::DropoffTime.name())?;
    let distance = float_values(df, CanonicalField::TripDistance.name())?;
    let fare = float_values(df, CanonicalField::Fare.name())?;

    Ok(pickup
        .into_iter()
        .zip(dropoff)
        .zip(distance)
        .zip(fare)
        .map(|(((pickup_us, dropoff_us), trip_distance), fare)| TripRecord {
            pickup_us,
            dropoff_us,
            trip_distance,
            fare,
        })
        .collect())
}

/// Timestamp column as epoch microseconds.
pub(crate) fn datetime_micros(df: &DataFrame, name: &str) -> PipelineResult<Vec<Option<i64>>> {
    let column = df
        .column(name)
        .map_err(|_| PipelineError::missing_column(name))?;
    let micros = column
        .cast(&DataType::Datetime(TimeUnit::Microseconds, None))?
        .cast(&DataType::Int64)?;
    let values = micros.i64().map_err(|_| {
        PipelineError::type_mismatch(name, "datetime", format!("{:?}", column.dtype()))
    })?;
    Ok(values.into_iter().collect())
}

/// Numeric column as f64 values.
pub(crate) fn float_values(df: &DataFrame, name: &str) -> PipelineResult<Vec<Option<f64>>> {
    let column = df
        .column(name)
        .map_err(|_| PipelineError::missing_column(name))?;
    let floats = column.cast(&DataType::Float64)?;
    let values = floats.f64().map_err(|_| {
        PipelineError::type_mismatch(name, "f64", format!("{:?}", column.dtype()))
    })?;
    Ok(values.into_iter().collect())
}
