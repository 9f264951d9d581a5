//! Run configuration: which 1Password vault and item hold the dashboard
//! credentials.
//!
//! Created interactively on first run, persisted to `<home>/config.json`,
//! read-only thereafter.

use crate::paths;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// 1Password vault holding the dashboard login item.
    #[serde(default)]
    pub vault: String,
    /// 1Password item with username/password (and optionally an OTP field).
    #[serde(default)]
    pub item: String,
}

impl Config {
    /// Loads the config, prompting on stdin for any missing value and
    /// persisting the result.
    pub fn load_or_init() -> Result<Self> {
        let path = paths::config_path()?;
        let mut config = Self::load(&path)?;

        let mut changed = false;
        if config.vault.is_empty() {
            config.vault = prompt("1Password vault name: ")?;
            changed = true;
        }
        if config.item.is_empty() {
            config.item = prompt("1Password item name for Amazon: ")?;
            changed = true;
        }

        if changed {
            config.save(&path)?;
            eprintln!("[kindle-stats] Config saved to {}", path.display());
        }

        Ok(config)
    }

    fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize config to JSON")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }
}

fn prompt(label: &str) -> Result<String> {
    eprint!("{}", label);
    std::io::stderr().flush().ok();
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(line.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::tempdir;

    #[test]
    #[serial]
    fn test_existing_config_is_loaded_without_prompting() {
        let dir = tempdir().unwrap();
        std::env::set_var(paths::HOME_ENV, dir.path());

        std::fs::write(
            dir.path().join("config.json"),
            r#"{"vault": "Private", "item": "Amazon"}"#,
        )
        .unwrap();

        // Both fields present, so load_or_init never touches stdin.
        let config = Config::load_or_init().unwrap();
        assert_eq!(config.vault, "Private");
        assert_eq!(config.item, "Amazon");

        std::env::remove_var(paths::HOME_ENV);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config = Config {
            vault: "Family".to_string(),
            item: "amazon.com".to_string(),
        };
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.vault, "Family");
        assert_eq!(loaded.item, "amazon.com");
    }

    #[test]
    fn test_missing_file_loads_as_empty() {
        let dir = tempdir().unwrap();
        let config = Config::load(&dir.path().join("config.json")).unwrap();
        assert!(config.vault.is_empty());
        assert!(config.item.is_empty());
    }

    #[test]
    fn test_partial_config_keeps_known_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"vault": "Private"}"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.vault, "Private");
        assert!(config.item.is_empty());
    }
}
