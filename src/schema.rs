//! Schema unification across vendor and year variants.
//!
//! Source files name the same quantity differently (`tpep_pickup_datetime`,
//! `lpep_pickup_datetime`, `PULocationID`, `cbd_congestion_fee`, ...). The
//! unifier maps them onto the canonical eight columns using an ordered
//! table of [`MappingRule`]s. New vendor formats are supported by adding a
//! rule, not by editing the matching code.
//!
//! Resolution for each canonical field:
//! 1. a source column whose lowercase name equals the canonical name wins
//!    outright;
//! 2. otherwise the field takes the first unclaimed source column, in column
//!    order, that satisfies any rule targeting it;
//! 3. a field nothing matches is filled with typed nulls.
//!
//! A source column is claimed by at most one canonical field. Unification
//! never fails on schema grounds.

use std::collections::HashSet;

use polars::prelude::*;
use tracing::debug;

use crate::error::PipelineResult;
use crate::types::CanonicalField;

/// Predicate over a lowercased source column name.
pub type ColumnMatcher = fn(&str) -> bool;

/// One (predicate, canonical target) entry of the mapping table.
#[derive(Clone, Copy)]
pub struct MappingRule {
    pub target: CanonicalField,
    pub description: &'static str,
    pub matches: ColumnMatcher,
}

impl std::fmt::Debug for MappingRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingRule")
            .field("target", &self.target)
            .field("description", &self.description)
            .finish()
    }
}

fn is_pickup_time(name: &str) -> bool {
    name.contains("pickup") && name.contains("time")
}

fn is_dropoff_time(name: &str) -> bool {
    name.contains("dropoff") && name.contains("time")
}

fn is_pickup_loc(name: &str) -> bool {
    name.contains("pulocationid") || name.contains("pickup_location")
}

fn is_dropoff_loc(name: &str) -> bool {
    name.contains("dolocationid") || name.contains("dropoff_location")
}

fn is_trip_distance(name: &str) -> bool {
    name.contains("trip_distance")
}

fn is_fare_amount(name: &str) -> bool {
    name == "fare_amount"
}

fn is_total_amount(name: &str) -> bool {
    name.contains("total_amount")
}

fn is_cbd_congestion_fee(name: &str) -> bool {
    name == "cbd_congestion_fee"
}

fn is_congestion_surcharge(name: &str) -> bool {
    name.contains("congestion") && name.contains("surcharge")
}

/// The built-in mapping table. Rules sharing a target act as one predicate;
/// tpep/lpep datetime names are covered by the 'time' substring rules.
pub const DEFAULT_RULES: [MappingRule; 9] = [
    MappingRule {
        target: CanonicalField::PickupTime,
        description: "contains 'pickup' and 'time'",
        matches: is_pickup_time,
    },
    MappingRule {
        target: CanonicalField::DropoffTime,
        description: "contains 'dropoff' and 'time'",
        matches: is_dropoff_time,
    },
    MappingRule {
        target: CanonicalField::PickupLoc,
        description: "contains 'pulocationid' or 'pickup_location'",
        matches: is_pickup_loc,
    },
    MappingRule {
        target: CanonicalField::DropoffLoc,
        description: "contains 'dolocationid' or 'dropoff_location'",
        matches: is_dropoff_loc,
    },
    MappingRule {
        target: CanonicalField::TripDistance,
        description: "contains 'trip_distance'",
        matches: is_trip_distance,
    },
    MappingRule {
        target: CanonicalField::Fare,
        description: "equals 'fare_amount'",
        matches: is_fare_amount,
    },
    MappingRule {
        target: CanonicalField::TotalAmount,
        description: "contains 'total_amount'",
        matches: is_total_amount,
    },
    MappingRule {
        target: CanonicalField::CongestionSurcharge,
        description: "equals 'cbd_congestion_fee'",
        matches: is_cbd_congestion_fee,
    },
    MappingRule {
        target: CanonicalField::CongestionSurcharge,
        description: "contains 'congestion' and 'surcharge'",
        matches: is_congestion_surcharge,
    },
];

/// Maps arbitrary source schemas onto the canonical trip schema.
#[derive(Debug, Clone)]
pub struct SchemaUnifier {
    rules: Vec<MappingRule>,
}

impl Default for SchemaUnifier {
    fn default() -> Self {
        Self {
            rules: DEFAULT_RULES.to_vec(),
        }
    }
}

impl SchemaUnifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unifier using exactly the given rules.
    pub fn with_rules(rules: Vec<MappingRule>) -> Self {
        Self { rules }
    }

    /// Add a rule; it widens the predicate of its target field.
    pub fn push_rule(&mut self, rule: MappingRule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[MappingRule] {
        &self.rules
    }

    fn matches_field(&self, field: CanonicalField, name: &str) -> bool {
        self.rules
            .iter()
            .any(|rule| rule.target == field && (rule.matches)(name))
    }

    /// Decide which source column feeds each canonical field.
    ///
    /// Returns one entry per canonical field, in canonical order; `None`
    /// means the field will be null-filled.
    pub fn resolve_columns<S: AsRef<str>>(
        &self,
        columns: &[S],
    ) -> Vec<(CanonicalField, Option<String>)> {
        let lowered: Vec<String> = columns
            .iter()
            .map(|c| c.as_ref().to_lowercase())
            .collect();
        let mut claimed: HashSet<usize> = HashSet::new();
        let mut resolved: Vec<Option<usize>> = vec![None; CanonicalField::ALL.len()];

        for (slot, field) in CanonicalField::ALL.iter().enumerate() {
            if let Some(idx) = lowered.iter().position(|c| c == field.name()) {
                resolved[slot] = Some(idx);
                claimed.insert(idx);
            }
        }

        for (slot, field) in CanonicalField::ALL.iter().enumerate() {
            if resolved[slot].is_some() {
                continue;
            }
            let hit = lowered
                .iter()
                .enumerate()
                .find(|(idx, name)| !claimed.contains(idx) && self.matches_field(*field, name));
            if let Some((idx, _)) = hit {
                resolved[slot] = Some(idx);
                claimed.insert(idx);
            }
        }

        CanonicalField::ALL
            .iter()
            .zip(resolved)
            .map(|(field, idx)| (*field, idx.map(|i| columns[i].as_ref().to_string())))
            .collect()
    }

    /// Produce a batch with exactly the canonical columns.
    ///
    /// Matched columns are renamed and cast (non-strictly) to the canonical
    /// dtype; unmatched fields become typed null columns.
    pub fn unify(&self, df: DataFrame) -> PipelineResult<DataFrame> {
        if df.height() == 0 || df.width() == 0 {
            return Ok(empty_canonical_frame());
        }

        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();
        let resolution = self.resolve_columns(&names);

        let mut null_fills = Vec::new();
        let mut selection = Vec::with_capacity(resolution.len());
        for (field, source) in &resolution {
            match source {
                Some(source) => {
                    selection.push(col(source.as_str()).cast(field.dtype()).alias(field.name()))
                }
                None => {
                    debug!(field = field.name(), "no source column; filling with nulls");
                    null_fills.push(lit(NULL).cast(field.dtype()).alias(field.name()));
                    selection.push(col(field.name()));
                }
            }
        }

        let mut lf = df.lazy();
        if !null_fills.is_empty() {
            lf = lf.with_columns(null_fills);
        }
        Ok(lf.select(selection).collect()?)
    }
}

/// A zero-row frame with the canonical schema.
pub fn empty_canonical_frame() -> DataFrame {
    let schema = Schema::from_iter(
        CanonicalField::ALL
            .iter()
            .map(|f| Field::new(f.name().into(), f.dtype())),
    );
    DataFrame::empty_with_schema(&schema)
}

/// Unify a batch with the built-in rules.
pub fn unify_schema(df: DataFrame) -> PipelineResult<DataFrame> {
    SchemaUnifier::default().unify(df)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::canonical_columns;

    fn yellow_2024_frame() -> DataFrame {
        df! {
            "VendorID" => &[1i32, 2],
            "tpep_pickup_datetime" => &[1_704_067_200_000_000i64, 1_704_070_800_000_000],
            "tpep_dropoff_datetime" => &[1_704_068_100_000_000i64, 1_704_071_700_000_000],
            "passenger_count" => &[1i64, 2],
            "trip_distance" => &[2.5, 3.1],
            "PULocationID" => &[132i32, 161],
            "DOLocationID" => &[161i32, 236],
            "fare_amount" => &[14.2, 17.0],
            "total_amount" => &[20.5, 24.0],
            "congestion_surcharge" => &[2.5, 2.5]
        }
        .unwrap()
    }

    fn resolved_source(
        resolution: &[(CanonicalField, Option<String>)],
        field: CanonicalField,
    ) -> Option<String> {
        resolution
            .iter()
            .find(|(f, _)| *f == field)
            .and_then(|(_, s)| s.clone())
    }

    #[test]
    fn test_resolve_yellow_columns() {
        let unifier = SchemaUnifier::new();
        let frame = yellow_2024_frame();
        let names: Vec<String> = frame
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect();
        let resolution = unifier.resolve_columns(&names);

        assert_eq!(
            resolved_source(&resolution, CanonicalField::PickupTime).as_deref(),
            Some("tpep_pickup_datetime")
        );
        assert_eq!(
            resolved_source(&resolution, CanonicalField::PickupLoc).as_deref(),
            Some("PULocationID")
        );
        assert_eq!(
            resolved_source(&resolution, CanonicalField::Fare).as_deref(),
            Some("fare_amount")
        );
        assert_eq!(
            resolved_source(&resolution, CanonicalField::CongestionSurcharge).as_deref(),
            Some("congestion_surcharge")
        );
    }

    #[test]
    fn test_unify_yellow_frame() {
        let out = unify_schema(yellow_2024_frame()).unwrap();
        let names: Vec<String> = out.get_column_names().iter().map(|n| n.to_string()).collect();
        assert_eq!(names, canonical_columns());
        assert_eq!(out.height(), 2);
        assert_eq!(
            out.column("pickup_time").unwrap().dtype(),
            &DataType::Datetime(TimeUnit::Microseconds, None)
        );
        assert_eq!(out.column("pickup_loc").unwrap().dtype(), &DataType::Int32);
    }

    #[test]
    fn test_cbd_fee_used_when_no_surcharge_column() {
        let unifier = SchemaUnifier::new();
        let resolution =
            unifier.resolve_columns(&["airport_fee", "cbd_congestion_fee", "fare_amount"]);
        assert_eq!(
            resolved_source(&resolution, CanonicalField::CongestionSurcharge).as_deref(),
            Some("cbd_congestion_fee")
        );
    }

    #[test]
    fn test_fee_columns_resolve_in_column_order() {
        let unifier = SchemaUnifier::new();
        let resolution =
            unifier.resolve_columns(&["old_congestion_surcharge_x", "cbd_congestion_fee"]);
        assert_eq!(
            resolved_source(&resolution, CanonicalField::CongestionSurcharge).as_deref(),
            Some("old_congestion_surcharge_x")
        );
        let resolution =
            unifier.resolve_columns(&["cbd_congestion_fee", "old_congestion_surcharge_x"]);
        assert_eq!(
            resolved_source(&resolution, CanonicalField::CongestionSurcharge).as_deref(),
            Some("cbd_congestion_fee")
        );
    }

    #[test]
    fn test_pickup_time_takes_first_column_not_legacy_name() {
        let unifier = SchemaUnifier::new();
        let resolution = unifier.resolve_columns(&[
            "request_pickup_time",
            "tpep_pickup_datetime",
            "tpep_dropoff_datetime",
        ]);
        assert_eq!(
            resolved_source(&resolution, CanonicalField::PickupTime).as_deref(),
            Some("request_pickup_time")
        );
        assert_eq!(
            resolved_source(&resolution, CanonicalField::DropoffTime).as_deref(),
            Some("tpep_dropoff_datetime")
        );
    }

    #[test]
    fn test_first_matching_column_wins() {
        let unifier = SchemaUnifier::new();
        let resolution = unifier.resolve_columns(&["Trip_Distance_km", "trip_distance_mi"]);
        assert_eq!(
            resolved_source(&resolution, CanonicalField::TripDistance).as_deref(),
            Some("Trip_Distance_km")
        );
    }

    #[test]
    fn test_verbatim_column_case_insensitive() {
        let unifier = SchemaUnifier::new();
        let resolution = unifier.resolve_columns(&["Pickup_Time", "tpep_pickup_datetime"]);
        assert_eq!(
            resolved_source(&resolution, CanonicalField::PickupTime).as_deref(),
            Some("Pickup_Time")
        );
    }

    #[test]
    fn test_missing_fields_are_null() {
        let frame = df! {
            "lpep_pickup_datetime" => &[1_704_067_200_000_000i64],
            "fare_amount" => &[9.5]
        }
        .unwrap();
        let out = unify_schema(frame).unwrap();

        assert_eq!(out.width(), 8);
        assert_eq!(out.height(), 1);
        assert_eq!(out.column("dropoff_time").unwrap().null_count(), 1);
        assert_eq!(out.column("congestion_surcharge").unwrap().null_count(), 1);
        assert_eq!(out.column("fare").unwrap().null_count(), 0);
    }

    #[test]
    fn test_unify_is_idempotent() {
        let once = unify_schema(yellow_2024_frame()).unwrap();
        let twice = unify_schema(once.clone()).unwrap();
        assert!(once.equals_missing(&twice));
    }

    #[test]
    fn test_empty_frame() {
        let out = unify_schema(DataFrame::empty()).unwrap();
        assert_eq!(out.width(), 8);
        assert_eq!(out.height(), 0);
    }

    #[test]
    fn test_custom_rule_is_applied() {
        let mut unifier = SchemaUnifier::new();
        unifier.push_rule(MappingRule {
            target: CanonicalField::Fare,
            description: "base_fare from a for-hire feed",
            matches: |name| name == "base_passenger_fare",
        });
        let resolution = unifier.resolve_columns(&["base_passenger_fare"]);
        assert_eq!(
            resolved_source(&resolution, CanonicalField::Fare).as_deref(),
            Some("base_passenger_fare")
        );
    }
}
