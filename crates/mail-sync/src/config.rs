//! Configuration loading for the sync subsystem
//!
//! Settings are resolved in order of priority:
//! 1. Runtime environment variables (`MAILSYNC_INTERVAL_SECS`, `MAILSYNC_RETENTION_CAP`)
//! 2. JSON file (`~/.config/mailsync/sync.json`)
//! 3. Built-in defaults

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sync::SyncOptions;

/// Settings filename in the mailsync config directory
const SYNC_CONFIG_FILE: &str = "sync.json";

const INTERVAL_ENV: &str = "MAILSYNC_INTERVAL_SECS";
const RETENTION_CAP_ENV: &str = "MAILSYNC_RETENTION_CAP";

/// Tunables for the scheduler, coordinator and engines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between scheduled sync passes
    pub interval_secs: u64,
    /// Maximum emails kept locally per account
    pub retention_cap: usize,
    /// Page size of the first ("quick") full-sync list call
    pub quick_sync_count: usize,
    /// Page size of subsequent full-sync list calls
    pub page_size: usize,
    /// Ids per batch-get call
    pub batch_size: usize,
    /// Consume every page of a history response instead of only the first
    pub follow_history_pages: bool,
    /// Upper bound on accounts syncing at once; `None` is unbounded
    pub max_concurrent_accounts: Option<usize>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            retention_cap: 1000,
            quick_sync_count: 100,
            page_size: 100,
            batch_size: 50,
            follow_history_pages: true,
            max_concurrent_accounts: None,
        }
    }
}

impl SyncConfig {
    /// Load the file from the config directory, then apply environment overrides
    pub fn load() -> Result<Self> {
        let mut cfg: SyncConfig = config::load_json_or_default(SYNC_CONFIG_FILE)?;
        cfg.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(cfg)
    }

    /// Load settings from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        config::load_json_file(path)
    }

    /// Parse settings from a JSON string; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse sync config JSON")
    }

    /// Persist to the config directory
    pub fn save(&self) -> Result<()> {
        config::save_json(SYNC_CONFIG_FILE, self)
    }

    /// Get the default settings path (~/.config/mailsync/sync.json)
    pub fn default_path() -> Option<PathBuf> {
        config::config_path(SYNC_CONFIG_FILE)
    }

    /// Apply overrides from a key lookup (the process environment in `load`)
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(value) = lookup(INTERVAL_ENV) {
            self.interval_secs = value
                .trim()
                .parse()
                .with_context(|| format!("{} must be a number of seconds", INTERVAL_ENV))?;
        }
        if let Some(value) = lookup(RETENTION_CAP_ENV) {
            self.retention_cap = value
                .trim()
                .parse()
                .with_context(|| format!("{} must be a positive integer", RETENTION_CAP_ENV))?;
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Per-engine options derived from these settings
    pub fn engine_options(&self) -> SyncOptions {
        SyncOptions {
            retention_cap: self.retention_cap,
            quick_sync_count: self.quick_sync_count,
            page_size: self.page_size,
            batch_size: self.batch_size.max(1),
            follow_history_pages: self.follow_history_pages,
        }
    }
}
