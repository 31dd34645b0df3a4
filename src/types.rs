//! Canonical trip schema and the small value types shared across the pipeline.
//!
//! Every batch leaving the schema unifier has exactly the eight columns of
//! [`CanonicalField::ALL`], in that order, with the dtypes given by
//! [`CanonicalField::dtype`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime};
use polars::prelude::{DataType, TimeUnit};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// One column of the canonical trip schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalField {
    PickupTime,
    DropoffTime,
    PickupLoc,
    DropoffLoc,
    TripDistance,
    Fare,
    TotalAmount,
    CongestionSurcharge,
}

impl CanonicalField {
    /// All canonical fields in output column order.
    pub const ALL: [CanonicalField; 8] = [
        CanonicalField::PickupTime,
        CanonicalField::DropoffTime,
        CanonicalField::PickupLoc,
        CanonicalField::DropoffLoc,
        CanonicalField::TripDistance,
        CanonicalField::Fare,
        CanonicalField::TotalAmount,
        CanonicalField::CongestionSurcharge,
    ];

    /// Column name in the canonical schema.
    pub fn name(&self) -> &'static str {
        match self {
            CanonicalField::PickupTime => "pickup_time",
            CanonicalField::DropoffTime => "dropoff_time",
            CanonicalField::PickupLoc => "pickup_loc",
            CanonicalField::DropoffLoc => "dropoff_loc",
            CanonicalField::TripDistance => "trip_distance",
            CanonicalField::Fare => "fare",
            CanonicalField::TotalAmount => "total_amount",
            CanonicalField::CongestionSurcharge => "congestion_surcharge",
        }
    }

    /// Storage dtype of the column after unification.
    pub fn dtype(&self) -> DataType {
        match self {
            CanonicalField::PickupTime | CanonicalField::DropoffTime => {
                DataType::Datetime(TimeUnit::Microseconds, None)
            }
            CanonicalField::PickupLoc | CanonicalField::DropoffLoc => DataType::Int32,
            _ => DataType::Float64,
        }
    }
}

/// Canonical column names in output order.
pub fn canonical_columns() -> Vec<&'static str> {
    CanonicalField::ALL.iter().map(|f| f.name()).collect()
}

/// Vendor category of a source file (the TLC file-name prefix).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaxiVendor {
    Yellow,
    Green,
}

impl TaxiVendor {
    pub const ALL: [TaxiVendor; 2] = [TaxiVendor::Yellow, TaxiVendor::Green];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaxiVendor::Yellow => "yellow",
            TaxiVendor::Green => "green",
        }
    }
}

impl fmt::Display for TaxiVendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaxiVendor {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yellow" => Ok(TaxiVendor::Yellow),
            "green" => Ok(TaxiVendor::Green),
            other => Err(PipelineError::invalid_param(
                "vendor",
                format!("unknown vendor category '{}'", other),
            )),
        }
    }
}

/// A single canonical trip, as seen by the ghost-trip predicates.
///
/// Timestamps are microseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TripRecord {
    pub pickup_us: Option<i64>,
    pub dropoff_us: Option<i64>,
    pub trip_distance: Option<f64>,
    pub fare: Option<f64>,
}

impl TripRecord {
    /// Elapsed trip time in seconds, if both timestamps are present.
    pub fn elapsed_secs(&self) -> Option<f64> {
        match (self.pickup_us, self.dropoff_us) {
            (Some(p), Some(d)) => Some((d as f64 - p as f64) / 1_000_000.0),
            _ => None,
        }
    }

    /// Elapsed trip time in minutes.
    pub fn elapsed_minutes(&self) -> Option<f64> {
        self.elapsed_secs().map(|s| s / 60.0)
    }

    /// Average speed in miles per hour.
    ///
    /// Follows IEEE division: a zero elapsed time yields an infinite or NaN
    /// speed, never a panic.
    pub fn avg_speed_mph(&self) -> Option<f64> {
        let distance = self.trip_distance?;
        let hours = self.elapsed_secs()? / 3600.0;
        Some(distance / hours)
    }

    pub fn pickup_time(&self) -> Option<NaiveDateTime> {
        self.pickup_us.and_then(micros_to_naive)
    }

    pub fn dropoff_time(&self) -> Option<NaiveDateTime> {
        self.dropoff_us.and_then(micros_to_naive)
    }
}

/// Convert epoch microseconds into a naive (wall-clock) timestamp.
pub fn micros_to_naive(us: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_micros(us).map(|dt| dt.naive_utc())
}

/// Convert a naive timestamp into epoch microseconds.
pub fn naive_to_micros(ts: NaiveDateTime) -> i64 {
    ts.and_utc().timestamp_micros()
}
