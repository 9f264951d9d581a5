//! Centralized home-based storage paths for all kindle-stats persistence.
//!
//! Everything lives under `~/.kindle-stats/`:
//! - `config.json` - 1Password vault/item configuration
//! - `data/reading_data.json` - canonical merged reading activity
//! - `data/fetch_<timestamp>.json` - append-only raw snapshot archive
//! - `data/debug/` - screenshots captured in `--debug` runs
//!
//! The `KINDLE_STATS_HOME` environment variable overrides the home directory
//! (used by `--data-home` and by tests).

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// Environment variable overriding the storage home.
pub const HOME_ENV: &str = "KINDLE_STATS_HOME";

/// The name of the kindle-stats directory under `$HOME`.
const KINDLE_STATS_DIR: &str = ".kindle-stats";

/// Returns the storage home: `$KINDLE_STATS_HOME` or `~/.kindle-stats/`.
///
/// Creates the directory if it doesn't exist.
pub fn home_dir() -> Result<PathBuf> {
    let dir = match std::env::var(HOME_ENV) {
        Ok(overridden) => PathBuf::from(overridden),
        Err(_) => dirs::home_dir()
            .context("Could not determine home directory for kindle-stats storage")?
            .join(KINDLE_STATS_DIR),
    };
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create storage directory: {}", dir.display()))?;
    Ok(dir)
}

/// Returns the config file path: `<home>/config.json`.
pub fn config_path() -> Result<PathBuf> {
    Ok(home_dir()?.join("config.json"))
}

/// Returns the data directory: `<home>/data/`.
///
/// Creates the directory if it doesn't exist.
pub fn data_dir() -> Result<PathBuf> {
    let dir = home_dir()?.join("data");
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create data directory: {}", dir.display()))?;
    Ok(dir)
}

/// Returns the canonical store path: `<home>/data/reading_data.json`.
pub fn canonical_path() -> Result<PathBuf> {
    Ok(data_dir()?.join("reading_data.json"))
}

/// Returns the snapshot path for a run stamp: `<home>/data/fetch_<stamp>.json`.
pub fn snapshot_path(stamp: &str) -> Result<PathBuf> {
    Ok(data_dir()?.join(format!("fetch_{}.json", stamp)))
}

/// Returns the debug artifact directory: `<home>/data/debug/`.
///
/// Creates the directory if it doesn't exist.
pub fn debug_dir() -> Result<PathBuf> {
    let dir = data_dir()?.join("debug");
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create debug directory: {}", dir.display()))?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::tempdir;

    #[test]
    #[serial]
    fn test_home_env_override_is_respected() {
        let dir = tempdir().unwrap();
        std::env::set_var(HOME_ENV, dir.path());

        let home = home_dir().unwrap();
        assert_eq!(home, dir.path());
        assert!(home.exists());

        assert_eq!(config_path().unwrap(), dir.path().join("config.json"));
        assert_eq!(
            canonical_path().unwrap(),
            dir.path().join("data/reading_data.json")
        );
        assert_eq!(
            snapshot_path("2026-01-20T120000").unwrap(),
            dir.path().join("data/fetch_2026-01-20T120000.json")
        );

        std::env::remove_var(HOME_ENV);
    }

    #[test]
    #[serial]
    fn test_data_and_debug_dirs_are_created() {
        let dir = tempdir().unwrap();
        std::env::set_var(HOME_ENV, dir.path());

        assert!(data_dir().unwrap().is_dir());
        assert!(debug_dir().unwrap().is_dir());

        std::env::remove_var(HOME_ENV);
    }
}
