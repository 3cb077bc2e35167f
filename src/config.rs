use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub store: StoreConfig,

    pub mirror: MirrorConfig,

    pub api: ApiConfig,

    pub scrape: ScrapeConfig,

    pub bark: BarkConfig,

    pub locks: LockConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Folder holding one numbered subfolder per anime.
    pub data_root: String,

    /// Folder holding the second index copy and `apiid.json`.
    pub root_dir: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_root: "pic/data".to_string(),
            root_dir: ".".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Base URL of the static mirror that serves the data folders.
    pub base_url: String,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://image.xinu.ink".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,

    /// Worker width of the external-id validity scan.
    pub concurrency: usize,

    /// Inclusive external-id range scanned by the monthly job.
    pub start_id: i64,

    pub end_id: i64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.anitabi.cn".to_string(),
            concurrency: 100,
            start_id: 100_000,
            end_id: 2_000_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    /// JSON handoff file written by the external browser scraper.
    pub feed_path: String,

    /// Most recently updated anime checked per daily run.
    pub max_anime: usize,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            feed_path: "scrape_feed.json".to_string(),
            max_anime: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BarkConfig {
    pub enabled: bool,

    /// Bark endpoint including the device key, e.g.
    /// `https://api.day.app/<key>`.
    pub url: String,
}

impl Default for BarkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "https://api.day.app/change-me".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub daily_path: String,

    pub monthly_path: String,

    /// Seconds to wait between peer-lock checks.
    pub wait_secs: u64,

    /// Regular waits before falling back to the extended wait.
    pub max_wait_attempts: u32,

    /// One long backoff after the regular waits are exhausted.
    pub extended_wait_secs: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            daily_path: "anime_pilgrimage_scraper.lock".to_string(),
            monthly_path: "anitabi_updater.lock".to_string(),
            wait_secs: 1800,
            max_wait_attempts: 3,
            extended_wait_secs: 43200,
        }
    }
}

impl LockConfig {
    #[must_use]
    pub const fn wait(&self) -> Duration {
        Duration::from_secs(self.wait_secs)
    }

    #[must_use]
    pub const fn extended_wait(&self) -> Duration {
        Duration::from_secs(self.extended_wait_secs)
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("seichi").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".seichi").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.bark.enabled && self.bark.url.is_empty() {
            anyhow::bail!("Bark URL cannot be empty when notifications are enabled");
        }

        if self.api.concurrency == 0 {
            anyhow::bail!("API scan concurrency must be > 0");
        }

        if self.api.start_id > self.api.end_id {
            anyhow::bail!(
                "API id range is inverted: start_id {} > end_id {}",
                self.api.start_id,
                self.api.end_id
            );
        }

        if self.locks.daily_path == self.locks.monthly_path {
            anyhow::bail!("Daily and monthly lock paths must differ");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.store.data_root, "pic/data");
        assert_eq!(config.api.concurrency, 100);
        assert_eq!(config.locks.max_wait_attempts, 3);
        assert_eq!(config.locks.wait(), Duration::from_secs(1800));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[store]"));
        assert!(toml_str.contains("[api]"));
        assert!(toml_str.contains("[locks]"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [general]
            log_level = "debug"

            [api]
            concurrency = 8
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.api.concurrency, 8);

        assert_eq!(config.api.base_url, "https://api.anitabi.cn");
    }

    #[test]
    fn test_validate_rejects_inverted_id_range() {
        let mut config = Config::default();
        config.api.start_id = 10;
        config.api.end_id = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_colliding_lock_paths() {
        let mut config = Config::default();
        config.locks.monthly_path.clone_from(&config.locks.daily_path);
        assert!(config.validate().is_err());
    }
}
