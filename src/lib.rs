//! Taxi trip ingestion core.
//!
//! Unifies heterogeneous monthly trip files onto one canonical schema,
//! removes physically implausible trips with an audit trail, imputes a
//! missing month from prior years, and audits congestion surcharge
//! compliance on the cleaned result.

pub mod audit;
pub mod compliance;
pub mod config;
pub mod data_loader;
pub mod data_pipeline;
pub mod error;
pub mod ghost_filter;
pub mod imputer;
pub mod logger;
pub mod schema;
pub mod store;
pub mod types;
pub mod zones;

pub use audit::{AuditEntry, AuditLog, GhostCategory};
pub use compliance::{audit_leakage, compare_q1_volumes, LeakageReport, Q1Comparison};
pub use config::{GhostTripThresholds, ImputationConfig, PipelineConfig};
pub use data_loader::ChunkedParquetReader;
pub use data_pipeline::{IngestionDriver, MonthOutcome, YearSummary};
pub use error::{PipelineError, PipelineResult};
pub use ghost_filter::{FilterOutcome, GhostTripFilter};
pub use imputer::{ImputationOutcome, MonthImputer};
pub use schema::{unify_schema, MappingRule, SchemaUnifier};
pub use store::{ParquetTripStore, TripDataStore};
pub use types::{CanonicalField, TaxiVendor, TripRecord};
