//! Audit log for rejected ghost trips.
//!
//! An [`AuditLog`] lists, per rejection category, the minimal identifying
//! fields of each rejected row, plus a count of rows removed. A row that
//! trips several rules appears once in each matching list but is counted
//! once in `total_filtered`.
//!
//! Logs are built per chunk, merged into a month and then into a year.
//! Writing a log replaces any earlier file for the same period.

use std::fmt;
use std::fs;
use std::io::BufWriter;
use std::path::Path;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

/// Ghost-trip rejection category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GhostCategory {
    ImpossiblePhysics,
    Teleporter,
    Stationary,
}

impl GhostCategory {
    pub const ALL: [GhostCategory; 3] = [
        GhostCategory::ImpossiblePhysics,
        GhostCategory::Teleporter,
        GhostCategory::Stationary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GhostCategory::ImpossiblePhysics => "impossible_physics",
            GhostCategory::Teleporter => "teleporter",
            GhostCategory::Stationary => "stationary",
        }
    }
}

impl fmt::Display for GhostCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Minimal identifying fields of a rejected row.
///
/// Which optional fields are filled depends on the category: distance,
/// speed and trip minutes for impossible physics, trip minutes and fare for
/// teleporters, distance and fare for stationary trips. A speed that is not
/// finite (zero elapsed time) is omitted; the trip minutes still show why
/// the row was rejected.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AuditEntry {
    pub pickup_time: Option<NaiveDateTime>,
    pub dropoff_time: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trip_distance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_speed_mph: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trip_time_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fare: Option<f64>,
}

/// Rejected rows grouped by category.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AuditLog {
    pub impossible_physics: Vec<AuditEntry>,
    pub teleporter: Vec<AuditEntry>,
    pub stationary: Vec<AuditEntry>,
    pub total_filtered: u64,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries recorded for one category.
    pub fn entries(&self, category: GhostCategory) -> &[AuditEntry] {
        match category {
            GhostCategory::ImpossiblePhysics => &self.impossible_physics,
            GhostCategory::Teleporter => &self.teleporter,
            GhostCategory::Stationary => &self.stationary,
        }
    }

    /// Append an entry to a category list.
    pub fn record(&mut self, category: GhostCategory, entry: AuditEntry) {
        match category {
            GhostCategory::ImpossiblePhysics => self.impossible_physics.push(entry),
            GhostCategory::Teleporter => self.teleporter.push(entry),
            GhostCategory::Stationary => self.stationary.push(entry),
        }
    }

    /// Merge another log into this one. Category lists are appended in
    /// order and counts are summed.
    pub fn merge(&mut self, other: AuditLog) {
        self.impossible_physics.extend(other.impossible_physics);
        self.teleporter.extend(other.teleporter);
        self.stationary.extend(other.stationary);
        self.total_filtered += other.total_filtered;
    }

    /// Total number of category entries, counting multi-category rows once
    /// per category.
    pub fn entry_count(&self) -> usize {
        self.impossible_physics.len() + self.teleporter.len() + self.stationary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_filtered == 0 && self.entry_count() == 0
    }

    /// Write the log as pretty-printed JSON, replacing any existing file.
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> PipelineResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    PipelineError::io(format!("Failed to create directory: {}", e))
                })?;
            }
        }

        let file = fs::File::create(path).map_err(|e| {
            PipelineError::io(format!("Failed to create {}: {}", path.display(), e))
        })?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Read a log previously written with [`AuditLog::write_json`].
    pub fn read_json<P: AsRef<Path>>(path: P) -> PipelineResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|_| PipelineError::file_not_found(path.display().to_string()))?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn entry(minute: u32) -> AuditEntry {
        let t = NaiveDate::from_ymd_opt(2025, 1, 10)
            .unwrap()
            .and_hms_opt(9, minute, 0)
            .unwrap();
        AuditEntry {
            pickup_time: Some(t),
            dropoff_time: Some(t),
            trip_distance: Some(0.0),
            fare: Some(8.0),
            ..AuditEntry::default()
        }
    }

    #[test]
    fn test_merge_is_additive() {
        let mut month = AuditLog::new();
        let mut chunk_a = AuditLog::new();
        chunk_a.record(GhostCategory::Stationary, entry(1));
        chunk_a.total_filtered = 1;

        let mut chunk_b = AuditLog::new();
        chunk_b.record(GhostCategory::Teleporter, entry(2));
        chunk_b.record(GhostCategory::ImpossiblePhysics, entry(2));
        chunk_b.total_filtered = 1;

        month.merge(chunk_a);
        month.merge(chunk_b);

        assert_eq!(month.total_filtered, 2);
        assert_eq!(month.entry_count(), 3);
        assert_eq!(month.entries(GhostCategory::Stationary).len(), 1);
    }

    #[test]
    fn test_json_keys() {
        let mut log = AuditLog::new();
        log.record(GhostCategory::Stationary, entry(5));
        log.total_filtered = 1;

        let value = serde_json::to_value(&log).unwrap();
        let obj = value.as_object().unwrap();
        for key in ["impossible_physics", "teleporter", "stationary", "total_filtered"] {
            assert!(obj.contains_key(key), "missing key {}", key);
        }
        let stationary = &obj["stationary"][0];
        assert!(stationary.get("avg_speed_mph").is_none());
        assert_eq!(stationary["fare"], 8.0);
    }

    #[test]
    fn test_write_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit").join("yellow_2025_01_audit.json");

        let mut first = AuditLog::new();
        first.record(GhostCategory::Stationary, entry(1));
        first.total_filtered = 1;
        first.write_json(&path).unwrap();

        let second = AuditLog::new();
        second.write_json(&path).unwrap();

        let read = AuditLog::read_json(&path).unwrap();
        assert_eq!(read, second);
        assert!(read.is_empty());
    }

    #[test]
    fn test_category_names() {
        let names: Vec<&str> = GhostCategory::ALL.iter().map(|c| c.as_str()).collect();
        assert_eq!(names, vec!["impossible_physics", "teleporter", "stationary"]);
    }
}
