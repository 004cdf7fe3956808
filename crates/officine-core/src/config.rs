//! Application configuration management.
//!
//! This module handles loading and saving the console configuration: the
//! API location, the last selected database folder, and the tuning knobs
//! of the synchronization layer (cache TTLs, staged-load delays and batch
//! sizes).
//!
//! Configuration is stored at `~/.config/officine/config.json`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::api::DEFAULT_API_BASE_URL;

/// Application name used for config directory paths
const APP_NAME: &str = "officine";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding the configured API location
pub const API_URL_ENV: &str = "OFFICINE_API_URL";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub api_base_url: Option<String>,
    pub last_folder: Option<String>,
    #[serde(default)]
    pub sync: SyncSettings,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
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

    /// API location: environment, then config file, then the local default
    pub fn api_base_url(&self) -> String {
        std::env::var(API_URL_ENV)
            .ok()
            .filter(|url| !url.trim().is_empty())
            .or_else(|| self.api_base_url.clone())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
    }
}

/// Tuning of caches and staged loading. Durations are in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Article searches: 15 minutes
    pub articles_ttl_ms: u64,
    /// Medication, doctor and prescription searches: 30 minutes
    pub search_ttl_ms: u64,
    /// Dashboard aggregates: 5 minutes
    pub stats_ttl_ms: u64,
    pub cache_max_entries: usize,
    pub eviction_batch: usize,
    /// Period of the expired-entry sweep: 10 minutes
    pub sweep_interval_ms: u64,
    pub page_size: u32,
    pub medicaments_batch: u32,
    pub medecins_batch: u32,
    pub ordonnances_batch: u32,
    /// Limit used by the "load full" variants
    pub full_limit: u32,
    pub delays: StageDelays,
    pub http_timeout_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            articles_ttl_ms: 15 * 60 * 1000,
            search_ttl_ms: 30 * 60 * 1000,
            stats_ttl_ms: 5 * 60 * 1000,
            cache_max_entries: 100,
            eviction_batch: 10,
            sweep_interval_ms: 10 * 60 * 1000,
            page_size: 20,
            medicaments_batch: 50,
            medecins_batch: 30,
            ordonnances_batch: 20,
            full_limit: 1000,
            delays: StageDelays::default(),
            http_timeout_secs: 30,
        }
    }
}

impl SyncSettings {
    pub fn stats_ttl(&self) -> Duration {
        Duration::from_millis(self.stats_ttl_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// Offsets from the start of a staged load at which each deferred stage runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageDelays {
    pub medicaments_ms: u64,
    pub medecins_ms: u64,
    pub ordonnances_ms: u64,
    pub statistiques_ms: u64,
}

impl Default for StageDelays {
    fn default() -> Self {
        Self {
            medicaments_ms: 500,
            medecins_ms: 1000,
            ordonnances_ms: 1500,
            statistiques_ms: 2000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let json = r#"{"api_base_url": "http://10.0.0.5:3001/api", "sync": {"medecins_batch": 10}}"#;
        let config: Config = serde_json::from_str(json).expect("config should parse");
        assert_eq!(config.sync.medecins_batch, 10);
        assert_eq!(config.sync.medicaments_batch, 50);
        assert_eq!(config.sync.delays, StageDelays::default());
        assert_eq!(config.last_folder, None);
    }

    #[test]
    fn test_default_ttls() {
        let settings = SyncSettings::default();
        assert_eq!(settings.stats_ttl(), Duration::from_secs(300));
        assert!(settings.articles_ttl_ms < settings.search_ttl_ms);
        assert_eq!(settings.sweep_interval(), Duration::from_secs(600));
    }

    #[test]
    fn test_configured_url_used_when_env_unset() {
        let config = Config {
            api_base_url: Some("http://pharma.local/api".to_string()),
            ..Default::default()
        };
        if std::env::var(API_URL_ENV).is_err() {
            assert_eq!(config.api_base_url(), "http://pharma.local/api");
            assert_eq!(Config::default().api_base_url(), DEFAULT_API_BASE_URL);
        }
    }
}
