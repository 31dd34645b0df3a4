//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use taxi_ingest::types::naive_to_micros;
use taxi_ingest::{IngestionDriver, ParquetTripStore, PipelineConfig};

/// One synthetic trip in source (vendor) terms.
#[derive(Debug, Clone, Copy)]
pub struct RawTrip {
    pub pickup: NaiveDateTime,
    pub minutes: f64,
    pub distance: f64,
    pub fare: f64,
    pub pickup_loc: i32,
    pub dropoff_loc: i32,
    pub surcharge: Option<f64>,
}

impl RawTrip {
    pub fn ordinary(pickup: NaiveDateTime) -> Self {
        Self {
            pickup,
            minutes: 15.0,
            distance: 2.5,
            fare: 14.0,
            pickup_loc: 48,
            dropoff_loc: 68,
            surcharge: Some(2.5),
        }
    }
}

pub fn at(year: i32, month: u32, day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

pub fn datetime_series(name: &str, micros: Vec<i64>) -> Series {
    Series::new(name.into(), micros)
        .cast(&DataType::Datetime(TimeUnit::Microseconds, None))
        .unwrap()
}

/// Frame with the column names of a yellow-cab source file.
pub fn yellow_frame(trips: &[RawTrip]) -> DataFrame {
    let pickups: Vec<i64> = trips.iter().map(|t| naive_to_micros(t.pickup)).collect();
    let dropoffs: Vec<i64> = trips
        .iter()
        .map(|t| naive_to_micros(t.pickup) + (t.minutes * 60_000_000.0) as i64)
        .collect();

    DataFrame::new(vec![
        Series::new("VendorID".into(), vec![2i32; trips.len()]).into(),
        datetime_series("tpep_pickup_datetime", pickups).into(),
        datetime_series("tpep_dropoff_datetime", dropoffs).into(),
        Series::new(
            "trip_distance".into(),
            trips.iter().map(|t| t.distance).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            "PULocationID".into(),
            trips.iter().map(|t| t.pickup_loc).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            "DOLocationID".into(),
            trips.iter().map(|t| t.dropoff_loc).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            "fare_amount".into(),
            trips.iter().map(|t| t.fare).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            "total_amount".into(),
            trips.iter().map(|t| t.fare + 5.0).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            "congestion_surcharge".into(),
            trips.iter().map(|t| t.surcharge).collect::<Vec<_>>(),
        )
        .into(),
    ])
    .unwrap()
}

/// Frame with the column names of a green-cab file from 2025 on.
pub fn green_2025_frame(trips: &[RawTrip]) -> DataFrame {
    let mut df = yellow_frame(trips);
    df.rename("tpep_pickup_datetime", "lpep_pickup_datetime".into())
        .unwrap();
    df.rename("tpep_dropoff_datetime", "lpep_dropoff_datetime".into())
        .unwrap();
    df.rename("congestion_surcharge", "cbd_congestion_fee".into())
        .unwrap();
    df
}

pub fn driver_in(dir: &Path, chunk_size: usize) -> IngestionDriver<ParquetTripStore> {
    let mut config = PipelineConfig::with_data_dir(dir);
    config.chunk_size = chunk_size;
    config.current_year = 2025;
    config.prepare_directories().unwrap();
    let store = ParquetTripStore::from_config(&config);
    IngestionDriver::new(config, store)
}

pub fn f64_values(df: &DataFrame, name: &str) -> Vec<Option<f64>> {
    df.column(name)
        .unwrap()
        .f64()
        .unwrap()
        .into_iter()
        .collect()
}
