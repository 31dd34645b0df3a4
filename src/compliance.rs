//! Congestion surcharge compliance over the cleaned yearly dataset.
//!
//! A trip qualifies when it was picked up on or after the policy start,
//! outside the congestion zone, and dropped off inside it. The compliance
//! rate is the percentage of qualifying trips carrying a positive surcharge.
//! Zone membership uses the static id set, evaluated row by row.

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate, NaiveTime};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::ghost_filter::{datetime_micros, float_values};
use crate::store::TripDataStore;
use crate::types::{micros_to_naive, naive_to_micros, CanonicalField};
use crate::zones::is_in_congestion_zone;

/// Number of pickup zones reported as the worst offenders.
pub const TOP_MISSING_LOCATIONS: usize = 3;

/// Non-compliant trip count for one pickup zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationCount {
    pub pickup_loc: i32,
    pub count: u64,
}

/// Surcharge compliance for outside-to-inside trips.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LeakageReport {
    pub total_trips: u64,
    pub with_surcharge: u64,
    pub without_surcharge: u64,
    /// Percentage in [0, 100]; 0.0 when no trip qualifies
    pub compliance_rate: f64,
    /// Pickup zones with the most trips lacking a surcharge, descending
    pub top_missing_locations: Vec<LocationCount>,
}

/// Q1 congestion-zone trip volume of two years.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Q1Comparison {
    pub baseline_year: i32,
    pub current_year: i32,
    /// `None` when the year has no cleaned dataset
    pub baseline_entering: Option<u64>,
    pub current_entering: Option<u64>,
    pub percent_change: Option<f64>,
}

fn zone_ids(df: &DataFrame, field: CanonicalField) -> PipelineResult<Vec<Option<i32>>> {
    let name = field.name();
    let column = df
        .column(name)
        .map_err(|_| PipelineError::missing_column(name))?;
    let ids = column.cast(&DataType::Int32)?;
    let values = ids.i32().map_err(|_| {
        PipelineError::type_mismatch(name, "i32", format!("{:?}", column.dtype()))
    })?;
    Ok(values.into_iter().collect())
}

fn day_start_micros(date: NaiveDate) -> i64 {
    naive_to_micros(date.and_time(NaiveTime::MIN))
}

/// Compute the leakage report for a canonical frame.
pub fn audit_leakage(df: &DataFrame, policy_start: NaiveDate) -> PipelineResult<LeakageReport> {
    let start_us = day_start_micros(policy_start);
    let pickup_time = datetime_micros(df, CanonicalField::PickupTime.name())?;
    let pickup_loc = zone_ids(df, CanonicalField::PickupLoc)?;
    let dropoff_loc = zone_ids(df, CanonicalField::DropoffLoc)?;
    let surcharge = float_values(df, CanonicalField::CongestionSurcharge.name())?;

    let mut report = LeakageReport::default();
    let mut missing_by_zone: HashMap<i32, u64> = HashMap::new();

    for (((time, pickup), dropoff), fee) in pickup_time
        .into_iter()
        .zip(pickup_loc)
        .zip(dropoff_loc)
        .zip(surcharge)
    {
        let (Some(time), Some(pickup), Some(dropoff)) = (time, pickup, dropoff) else {
            continue;
        };
        if time < start_us || is_in_congestion_zone(pickup) || !is_in_congestion_zone(dropoff) {
            continue;
        }

        report.total_trips += 1;
        if fee.is_some_and(|f| f > 0.0) {
            report.with_surcharge += 1;
        } else {
            report.without_surcharge += 1;
            *missing_by_zone.entry(pickup).or_insert(0) += 1;
        }
    }

    if report.total_trips == 0 {
        warn!("No outside->inside trips found");
        return Ok(report);
    }

    report.compliance_rate = report.with_surcharge as f64 / report.total_trips as f64 * 100.0;

    let mut ranked: Vec<LocationCount> = missing_by_zone
        .into_iter()
        .map(|(pickup_loc, count)| LocationCount { pickup_loc, count })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then(a.pickup_loc.cmp(&b.pickup_loc)));
    ranked.truncate(TOP_MISSING_LOCATIONS);
    report.top_missing_locations = ranked;

    Ok(report)
}

/// Leakage report for a stored year.
pub fn audit_leakage_for_year(
    store: &dyn TripDataStore,
    year: i32,
    policy_start: NaiveDate,
) -> PipelineResult<LeakageReport> {
    if !store.has_year(year) {
        return Err(PipelineError::file_not_found(
            store.year_path(year).display().to_string(),
        ));
    }
    let df = store
        .load_year(year)?
        .select([
            col(CanonicalField::PickupTime.name()),
            col(CanonicalField::PickupLoc.name()),
            col(CanonicalField::DropoffLoc.name()),
            col(CanonicalField::CongestionSurcharge.name()),
        ])
        .collect()?;

    let report = audit_leakage(&df, policy_start)?;
    info!(
        year,
        total_trips = report.total_trips,
        compliance_rate = report.compliance_rate,
        top_missing = ?report
            .top_missing_locations
            .iter()
            .map(|l| l.pickup_loc)
            .collect::<Vec<_>>(),
        "LEAKAGE_AUDIT"
    );
    Ok(report)
}

/// Trips in January-March of `year` touching the congestion zone at either end.
pub fn count_q1_zone_trips(df: &DataFrame, year: i32) -> PipelineResult<u64> {
    let pickup_time = datetime_micros(df, CanonicalField::PickupTime.name())?;
    let pickup_loc = zone_ids(df, CanonicalField::PickupLoc)?;
    let dropoff_loc = zone_ids(df, CanonicalField::DropoffLoc)?;
    let in_zone = |loc: Option<i32>| loc.is_some_and(is_in_congestion_zone);

    let count = pickup_time
        .into_iter()
        .zip(pickup_loc)
        .zip(dropoff_loc)
        .filter(|((time, pickup), dropoff)| {
            let in_q1 = time
                .and_then(micros_to_naive)
                .is_some_and(|t| t.year() == year && (1..=3).contains(&t.month()));
            in_q1 && (in_zone(*pickup) || in_zone(*dropoff))
        })
        .count();
    Ok(count as u64)
}

/// Percentage change from `baseline` to `current`; undefined for a zero baseline.
pub fn percent_change(baseline: u64, current: u64) -> Option<f64> {
    if baseline == 0 {
        return None;
    }
    Some((current as f64 - baseline as f64) / baseline as f64 * 100.0)
}

fn q1_volume(store: &dyn TripDataStore, year: i32) -> PipelineResult<Option<u64>> {
    if !store.has_year(year) {
        warn!(year, "Cleaned data not found; skipping year");
        return Ok(None);
    }
    let df = store
        .load_year(year)?
        .select([
            col(CanonicalField::PickupTime.name()),
            col(CanonicalField::PickupLoc.name()),
            col(CanonicalField::DropoffLoc.name()),
        ])
        .collect()?;
    count_q1_zone_trips(&df, year).map(Some)
}

/// Compare Q1 zone trip volume between two stored years.
pub fn compare_q1_volumes(
    store: &dyn TripDataStore,
    baseline_year: i32,
    current_year: i32,
) -> PipelineResult<Q1Comparison> {
    let baseline_entering = q1_volume(store, baseline_year)?;
    let current_entering = q1_volume(store, current_year)?;
    let percent_change = match (baseline_entering, current_entering) {
        (Some(b), Some(c)) => percent_change(b, c),
        _ => None,
    };

    info!(
        baseline_year,
        current_year,
        baseline_entering = ?baseline_entering,
        current_entering = ?current_entering,
        percent_change = ?percent_change,
        "Q1_COMPARISON"
    );
    Ok(Q1Comparison {
        baseline_year,
        current_year,
        baseline_entering,
        current_entering,
        percent_change,
    })
}
