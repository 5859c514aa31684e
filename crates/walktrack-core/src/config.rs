//! Engine configuration.
//!
//! Stored at `~/.config/walktrack/config.json`. A missing file yields the
//! defaults; individual values can be overridden through `WALKTRACK_*`
//! environment variables.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Application name used for the config directory path
const APP_NAME: &str = "walktrack";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const ENV_CACHE_TTL: &str = "WALKTRACK_CACHE_TTL_MINUTES";
const ENV_MAX_TEAM_SIZE: &str = "WALKTRACK_MAX_TEAM_SIZE";
const ENV_OVERDUE: &str = "WALKTRACK_OVERDUE_MINUTES";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Lifetime of a cached person record.
    pub cache_ttl_minutes: u64,
    /// Largest roster a submitted team may grow to.
    pub max_team_size: u8,
    /// Idle time after which an active team is reported overdue.
    pub overdue_minutes: u32,
    /// Name prefix marking rehearsal teams.
    pub test_team_prefix: String,
    /// Id prefix marking rehearsal persons.
    pub test_person_prefix: String,
    pub test_team_size: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl_minutes: 20,
            max_team_size: 6,
            overdue_minutes: 60,
            test_team_prefix: "测试队伍".to_string(),
            test_person_prefix: "test".to_string(),
            test_team_size: 4,
        }
    }
}

impl EngineConfig {
    /// Load from the default location, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = parse_override(&lookup, ENV_CACHE_TTL) {
            self.cache_ttl_minutes = v;
        }
        if let Some(v) = parse_override(&lookup, ENV_MAX_TEAM_SIZE) {
            self.max_team_size = v;
        }
        if let Some(v) = parse_override(&lookup, ENV_OVERDUE) {
            self.overdue_minutes = v;
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_minutes.saturating_mul(60))
    }
}

fn parse_override<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(var = name, value = %raw, "Ignoring unparsable config override");
            None
        }
    }
}
