//! Credential retrieval through the 1Password CLI.
//!
//! The login flow only sees the narrow [`CredentialProvider`] interface; the
//! `op` subprocess details stay here.

use crate::config::Config;
use anyhow::{Context, Result};
use std::process::Command;

/// Supplies login credentials on demand.
pub trait CredentialProvider {
    fn email(&self) -> Result<String>;
    fn password(&self) -> Result<String>;
    /// Returns `Ok(None)` when the item has no one-time password configured.
    fn otp(&self) -> Result<Option<String>>;
}

/// [`CredentialProvider`] backed by the 1Password CLI (`op`).
pub struct OpCli {
    vault: String,
    item: String,
}

impl OpCli {
    pub fn new(config: &Config) -> Result<Self> {
        which::which("op").context(
            "1Password CLI (`op`) not found in PATH; install it and sign in before running",
        )?;
        Ok(Self {
            vault: config.vault.clone(),
            item: config.item.clone(),
        })
    }

    /// Reads one field via a 1Password secret reference.
    fn read_field(&self, field: &str) -> Result<String> {
        let reference = secret_reference(&self.vault, &self.item, field);
        let output = Command::new("op")
            .args(["read", reference.as_str()])
            .output()
            .context("Failed to run `op read`")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("op read failed for '{}': {}", reference, stderr.trim());
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl CredentialProvider for OpCli {
    fn email(&self) -> Result<String> {
        self.read_field("username")
    }

    fn password(&self) -> Result<String> {
        self.read_field("password")
    }

    fn otp(&self) -> Result<Option<String>> {
        let output = Command::new("op")
            .args(["item", "get", self.item.as_str(), "--otp"])
            .output()
            .context("Failed to run `op item get --otp`")?;
        if !output.status.success() {
            // The item simply may not carry a TOTP field.
            tracing::debug!(
                "op item get --otp failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Ok(None);
        }
        let code = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if code.is_empty() {
            return Ok(None);
        }
        Ok(Some(code))
    }
}

fn secret_reference(vault: &str, item: &str, field: &str) -> String {
    format!("op://{}/{}/{}", vault, item, field)
}
