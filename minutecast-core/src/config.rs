use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, time::Duration};

use crate::model::Location;

pub const DEFAULT_REFRESH_MINUTES: u64 = 80;
pub const DEFAULT_PUBLISH_SECONDS: u64 = 30;
pub const DEFAULT_TOPIC_PREFIX: &str = "accu-mqtt";

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// api_token = "..."
/// refresh_minutes = 80
///
/// [location]
/// latitude = 52.52
/// longitude = 13.405
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// AccuWeather API token.
    pub api_token: Option<String>,
    /// Where the last fetched forecast is kept; defaults to the platform cache dir.
    pub cache_path: Option<PathBuf>,
    pub refresh_minutes: u64,
    pub publish_seconds: u64,
    pub topic_prefix: String,
    pub location: Option<Location>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_token: None,
            cache_path: None,
            refresh_minutes: DEFAULT_REFRESH_MINUTES,
            publish_seconds: DEFAULT_PUBLISH_SECONDS,
            topic_prefix: DEFAULT_TOPIC_PREFIX.to_string(),
            location: None,
        }
    }
}

impl Config {
    /// Load config from disk, or return defaults if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return defaults.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("dev", "minutecast", "minutecast")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    /// Cache file for the last forecast, honoring an explicit `cache_path`.
    pub fn resolved_cache_path(&self) -> Result<PathBuf> {
        match &self.cache_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::project_dirs()?.cache_dir().join("last_update.json")),
        }
    }

    pub fn api_token(&self) -> Result<&str> {
        self.api_token.as_deref().filter(|t| !t.is_empty()).ok_or_else(|| {
            anyhow!(
                "No API token configured.\n\
                 Hint: run `minutecast configure` or pass --api-token."
            )
        })
    }

    pub fn location(&self) -> Result<Location> {
        self.location.ok_or_else(|| {
            anyhow!(
                "No location configured.\n\
                 Hint: run `minutecast configure` or pass --latitude/--longitude."
            )
        })
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_minutes.max(1).saturating_mul(60))
    }

    pub fn publish_interval(&self) -> Duration {
        Duration::from_secs(self.publish_seconds.max(1))
    }
}
