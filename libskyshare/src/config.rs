//! Configuration management for Skyshare

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};

pub const DEFAULT_DOMAIN: &str = "https://bsky.social";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub bluesky: BlueskyConfig,
    #[serde(default)]
    pub excerpt: ExcerptConfig,
    #[serde(default)]
    pub scheduling: SchedulingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "~/.local/share/skyshare/skyshare.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlueskyConfig {
    /// Domain used when none has been saved in the settings store
    pub default_domain: String,
    /// Site URL reported in the User-Agent header
    pub site_url: String,
    /// Client-wide HTTP timeout
    pub timeout_secs: u64,
}

impl Default for BlueskyConfig {
    fn default() -> Self {
        Self {
            default_domain: DEFAULT_DOMAIN.to_string(),
            site_url: String::new(),
            timeout_secs: 30,
        }
    }
}

impl BlueskyConfig {
    /// User-Agent identifying the calling application
    pub fn user_agent(&self) -> String {
        let version = env!("CARGO_PKG_VERSION");
        if self.site_url.trim().is_empty() {
            format!("Skyshare/{}; Share on Bluesky", version)
        } else {
            format!("Skyshare/{}; {}; Share on Bluesky", version, self.site_url.trim())
        }
    }
}

/// Excerpt lengths used when building outbound posts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExcerptConfig {
    /// Maximum characters in the post body
    pub body_chars: usize,
    /// Maximum words in the link card description
    pub description_words: usize,
    /// Continuation marker appended when text is trimmed
    pub more: String,
}

impl Default for ExcerptConfig {
    fn default() -> Self {
        Self {
            body_chars: crate::excerpt::DEFAULT_BODY_CHARS,
            description_words: crate::excerpt::DEFAULT_DESCRIPTION_WORDS,
            more: crate::excerpt::DEFAULT_MORE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    /// Seconds between worker polls of the task queue
    pub poll_interval: u64,
    /// Interval of the recurring session refresh, e.g. "1week"
    pub refresh_interval: String,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            poll_interval: 60,
            refresh_interval: "1week".to_string(),
        }
    }
}

impl SchedulingConfig {
    /// Parse `refresh_interval` as a human-readable duration
    pub fn refresh_interval(&self) -> Result<Duration> {
        let interval = humantime::parse_duration(self.refresh_interval.trim()).map_err(|e| {
            ConfigError::InvalidValue {
                field: "scheduling.refresh_interval".to_string(),
                reason: e.to_string(),
            }
        })?;

        if interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "scheduling.refresh_interval".to_string(),
                reason: "must be greater than zero".to_string(),
            }
            .into());
        }

        Ok(interval)
    }
}

impl Config {
    /// Load configuration from the default location
    ///
    /// A missing file yields the default configuration.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        if !config_path.exists() {
            tracing::debug!(path = %config_path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        config.scheduling.refresh_interval()?;
        Ok(config)
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("SKYSHARE_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("skyshare").join("config.toml"))
}

/// Resolve the database path, expanding `~`
pub fn resolve_db_path(configured: &str) -> Result<PathBuf> {
    if configured.trim().is_empty() {
        return Err(ConfigError::MissingField("database.path".to_string()).into());
    }
    Ok(PathBuf::from(shellexpand::tilde(configured).to_string()))
}
