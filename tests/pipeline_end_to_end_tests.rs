//! End-to-end tests: source files on disk through to the cleaned year,
//! audit logs and the downstream compliance queries.

mod common;

use chrono::NaiveDate;
use taxi_ingest::compliance::{audit_leakage_for_year, compare_q1_volumes};
use taxi_ingest::types::canonical_columns;
use taxi_ingest::{AuditLog, PipelineError, TaxiVendor, TripDataStore};

use common::{at, driver_in, f64_values, green_2025_frame, yellow_frame, RawTrip};

/// The five-trip scenario: three ghosts, two ordinary trips.
fn scenario(day: u32) -> Vec<RawTrip> {
    let base = RawTrip::ordinary(at(2025, 1, day, 9));
    vec![
        RawTrip { minutes: 5.0, distance: 10.0, fare: 40.0, ..base },
        RawTrip { minutes: 12.0, distance: 0.0, fare: 8.0, ..base },
        RawTrip { minutes: 0.5, distance: 0.2, fare: 25.0, ..base },
        RawTrip { fare: 18.5, ..base },
        RawTrip { fare: 12.0, ..base },
    ]
}

#[test]
fn five_trip_scenario_through_the_driver() {
    let dir = tempfile::tempdir().unwrap();
    let driver = driver_in(dir.path(), 2);
    driver
        .store()
        .save_month(TaxiVendor::Yellow, 2025, 1, &mut yellow_frame(&scenario(10)))
        .unwrap();

    let outcome = driver
        .process_month(TaxiVendor::Yellow, 2025, 1)
        .unwrap()
        .unwrap();

    assert_eq!(outcome.audit.total_filtered, 3);
    assert_eq!(outcome.audit.impossible_physics.len(), 1);
    assert_eq!(outcome.audit.stationary.len(), 1);
    assert_eq!(outcome.audit.teleporter.len(), 1);
    assert_eq!(
        f64_values(&outcome.cleaned, "fare"),
        vec![Some(18.5), Some(12.0)]
    );
}

#[test]
fn mixed_vendor_year_is_written_with_canonical_schema() {
    let dir = tempfile::tempdir().unwrap();
    let driver = driver_in(dir.path(), 3);
    let store = driver.store();
    store
        .save_month(TaxiVendor::Yellow, 2024, 1, &mut yellow_frame(&scenario(10)))
        .unwrap();
    store
        .save_month(TaxiVendor::Green, 2024, 2, &mut green_2025_frame(&scenario(11)))
        .unwrap();

    let summary = driver
        .process_year(2024, &[TaxiVendor::Yellow, TaxiVendor::Green])
        .unwrap();

    assert_eq!(summary.months_processed, 2);
    assert_eq!(summary.months_missing.len(), 22);
    assert_eq!(summary.rows_read, 10);
    assert_eq!(summary.rows_kept, 4);
    assert_eq!(summary.audit.total_filtered, 6);

    let year = store.load_year(2024).unwrap().collect().unwrap();
    let names: Vec<String> = year.get_column_names().iter().map(|n| n.to_string()).collect();
    assert_eq!(names, canonical_columns());
    assert_eq!(year.height(), 4);

    // the green file carried its fee as cbd_congestion_fee
    assert_eq!(year.column("congestion_surcharge").unwrap().null_count(), 0);

    let combined = AuditLog::read_json(store.year_audit_path(2024)).unwrap();
    assert_eq!(combined.total_filtered, 6);
    assert_eq!(combined.teleporter.len(), 2);

    let yellow_jan = AuditLog::read_json(store.month_audit_path(TaxiVendor::Yellow, 2024, 1)).unwrap();
    assert_eq!(yellow_jan.total_filtered, 3);
}

#[test]
fn rerun_replaces_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let driver = driver_in(dir.path(), 10);
    let store = driver.store();
    store
        .save_month(TaxiVendor::Yellow, 2024, 6, &mut yellow_frame(&scenario(10)))
        .unwrap();

    driver.process_year(2024, &[TaxiVendor::Yellow]).unwrap();
    driver.process_year(2024, &[TaxiVendor::Yellow]).unwrap();

    let year = store.load_year(2024).unwrap().collect().unwrap();
    assert_eq!(year.height(), 2);
    let combined = AuditLog::read_json(store.year_audit_path(2024)).unwrap();
    assert_eq!(combined.total_filtered, 3);
}

#[test]
fn rerun_without_sources_removes_stale_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let driver = driver_in(dir.path(), 10);
    let store = driver.store();
    let source = store
        .save_month(TaxiVendor::Yellow, 2024, 6, &mut yellow_frame(&scenario(10)))
        .unwrap();
    driver.process_year(2024, &[TaxiVendor::Yellow]).unwrap();
    assert!(store.has_year(2024));

    std::fs::remove_file(source).unwrap();
    let summary = driver.process_year(2024, &[TaxiVendor::Yellow]).unwrap();

    assert_eq!(summary.output_path, None);
    assert!(!store.has_year(2024));
    assert!(!store.year_audit_path(2024).exists());
}

#[test]
fn leakage_audit_on_processed_year() {
    let dir = tempfile::tempdir().unwrap();
    let driver = driver_in(dir.path(), 4);
    let store = driver.store();

    // 10 outside -> inside trips after the toll start, 4 surcharged
    let trips: Vec<RawTrip> = (0..10)
        .map(|i| RawTrip {
            pickup_loc: [1, 1, 1, 7, 7, 3, 129, 129, 129, 129][i as usize],
            dropoff_loc: 161,
            surcharge: if i >= 6 { Some(0.75) } else { None },
            ..RawTrip::ordinary(at(2025, 2, 3, i))
        })
        .collect();
    store
        .save_month(TaxiVendor::Yellow, 2025, 2, &mut yellow_frame(&trips))
        .unwrap();
    driver.process_year(2025, &[TaxiVendor::Yellow]).unwrap();

    let report = audit_leakage_for_year(
        store,
        2025,
        NaiveDate::from_ymd_opt(2025, 1, 5).unwrap(),
    )
    .unwrap();

    assert_eq!(report.total_trips, 10);
    assert!((report.compliance_rate - 40.0).abs() < 1e-9);
    assert_eq!(report.top_missing_locations.len(), 3);
    assert_eq!(report.top_missing_locations[0].pickup_loc, 1);
    let missing: u64 = report.top_missing_locations.iter().map(|l| l.count).sum();
    assert!(missing <= 6);
}

#[test]
fn leakage_audit_requires_processed_year() {
    let dir = tempfile::tempdir().unwrap();
    let driver = driver_in(dir.path(), 4);
    let result = audit_leakage_for_year(
        driver.store(),
        2019,
        NaiveDate::from_ymd_opt(2025, 1, 5).unwrap(),
    );
    assert!(matches!(result, Err(PipelineError::FileNotFound { .. })));
}

#[test]
fn q1_volume_comparison() {
    let dir = tempfile::tempdir().unwrap();
    let driver = driver_in(dir.path(), 50);
    let store = driver.store();

    let in_zone = |year: i32, n: u32| -> Vec<RawTrip> {
        (0..n)
            .map(|h| RawTrip {
                dropoff_loc: 236,
                ..RawTrip::ordinary(at(year, 3, 2, h))
            })
            .collect()
    };
    store
        .save_month(TaxiVendor::Yellow, 2024, 3, &mut yellow_frame(&in_zone(2024, 20)))
        .unwrap();
    store
        .save_month(TaxiVendor::Yellow, 2025, 3, &mut yellow_frame(&in_zone(2025, 15)))
        .unwrap();
    driver.process_year(2024, &[TaxiVendor::Yellow]).unwrap();
    driver.process_year(2025, &[TaxiVendor::Yellow]).unwrap();

    let comparison = compare_q1_volumes(store, 2024, 2025).unwrap();
    assert_eq!(comparison.baseline_entering, Some(20));
    assert_eq!(comparison.current_entering, Some(15));
    assert_eq!(comparison.percent_change, Some(-25.0));

    let missing = compare_q1_volumes(store, 2020, 2025).unwrap();
    assert_eq!(missing.baseline_entering, None);
    assert_eq!(missing.percent_change, None);
}
