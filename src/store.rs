//! The canonical reading-activity store and the raw snapshot archive.
//!
//! The canonical file is the single source of truth: the next run's fetch
//! window is derived from its newest date. Saves are atomic (temp write,
//! then rename) so a crash mid-write never corrupts existing data. Snapshots
//! are append-only diagnostics and are never read back.

use crate::fetch::{RawWeekPayload, SkippedWindow};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// One book's aggregate for one day. `asin` is the natural key within a day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookEntry {
    pub title: String,
    pub asin: String,
    pub duration_seconds: u64,
    pub sessions: u32,
    pub thumbnail: Option<String>,
}

/// One calendar day's household reading, books ordered longest-read first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayRecord {
    pub date: NaiveDate,
    pub total_seconds: u64,
    pub total_minutes: f64,
    pub books: Vec<BookEntry>,
}

/// The persisted canonical record; dates are unique, kept sorted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalStore {
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reading_activity: Vec<DayRecord>,
}

impl CanonicalStore {
    /// Loads the store, empty when no file exists yet. A present-but-broken
    /// file is an error: never silently clobber history.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read canonical store: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse canonical store: {}", path.display()))
    }

    /// Atomic save: write to a temporary path, then rename over the
    /// canonical path.
    pub fn save_atomic(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self)
            .context("Failed to serialize canonical store to JSON")?;

        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, &content)
            .with_context(|| format!("Failed to write temp store file: {}", temp_path.display()))?;
        fs::rename(&temp_path, path)
            .with_context(|| format!("Failed to rename temp file to: {}", path.display()))?;
        Ok(())
    }

    /// The newest recorded date, the anchor for the next incremental window.
    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.reading_activity.iter().map(|r| r.date).max()
    }
}

/// One run's raw fetch results, archived verbatim for audit.
#[derive(Debug, Serialize)]
pub struct RunSnapshot<'a> {
    pub fetched_at: DateTime<Utc>,
    pub responses: &'a [RawWeekPayload],
    pub retention_skipped: &'a [SkippedWindow],
}

/// Writes a new snapshot file; refuses to touch an existing one.
pub fn archive_snapshot(path: &Path, snapshot: &RunSnapshot<'_>) -> Result<()> {
    if path.exists() {
        anyhow::bail!(
            "snapshot file already exists, refusing to overwrite: {}",
            path.display()
        );
    }
    let content =
        serde_json::to_string_pretty(snapshot).context("Failed to serialize run snapshot")?;
    fs::write(path, content)
        .with_context(|| format!("Failed to write snapshot: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_store() -> CanonicalStore {
        CanonicalStore {
            last_updated: Some("2026-01-21T08:00:00Z".parse().unwrap()),
            reading_activity: vec![DayRecord {
                date: date(2026, 1, 20),
                total_seconds: 3600,
                total_minutes: 60.0,
                books: vec![BookEntry {
                    title: "The Hobbit".to_string(),
                    asin: "B007978NPG".to_string(),
                    duration_seconds: 3600,
                    sessions: 2,
                    thumbnail: None,
                }],
            }],
        }
    }

    #[test]
    fn test_load_missing_file_returns_empty_store() {
        let dir = tempdir().unwrap();
        let store = CanonicalStore::load(&dir.path().join("reading_data.json")).unwrap();
        assert!(store.last_updated.is_none());
        assert!(store.reading_activity.is_empty());
        assert_eq!(store.latest_date(), None);
    }

    #[test]
    fn test_load_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reading_data.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(CanonicalStore::load(&path).is_err());
    }

    #[test]
    fn test_save_atomic_roundtrip_and_no_temp_leftover() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reading_data.json");

        let store = sample_store();
        store.save_atomic(&path).unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());

        let loaded = CanonicalStore::load(&path).unwrap();
        assert_eq!(loaded, store);
    }

    #[test]
    fn test_save_atomic_replaces_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reading_data.json");

        let mut store = sample_store();
        store.save_atomic(&path).unwrap();

        store.reading_activity[0].total_seconds = 5400;
        store.reading_activity[0].total_minutes = 90.0;
        store.save_atomic(&path).unwrap();

        let loaded = CanonicalStore::load(&path).unwrap();
        assert_eq!(loaded.reading_activity[0].total_seconds, 5400);
    }

    #[test]
    fn test_canonical_file_shape() {
        let value = serde_json::to_value(sample_store()).unwrap();
        assert_eq!(value["last_updated"], "2026-01-21T08:00:00Z");
        let day = &value["reading_activity"][0];
        assert_eq!(day["date"], "2026-01-20");
        assert_eq!(day["total_seconds"], 3600);
        assert_eq!(day["total_minutes"], 60.0);
        assert_eq!(day["books"][0]["asin"], "B007978NPG");
        assert_eq!(day["books"][0]["thumbnail"], serde_json::Value::Null);
    }

    #[test]
    fn test_latest_date_takes_maximum() {
        let mut store = sample_store();
        store.reading_activity.push(DayRecord {
            date: date(2026, 1, 18),
            total_seconds: 0,
            total_minutes: 0.0,
            books: Vec::new(),
        });
        assert_eq!(store.latest_date(), Some(date(2026, 1, 20)));
    }

    #[test]
    fn test_archive_snapshot_refuses_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fetch_2026-01-21T080000.json");

        let snapshot = RunSnapshot {
            fetched_at: "2026-01-21T08:00:00Z".parse().unwrap(),
            responses: &[],
            retention_skipped: &[],
        };
        archive_snapshot(&path, &snapshot).unwrap();
        assert!(path.exists());

        let again = archive_snapshot(&path, &snapshot);
        assert!(again.is_err());
    }
}
