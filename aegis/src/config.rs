//! Aegis configuration types and loading

use chrono::FixedOffset;
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::coordinator::CoordinatorConfig;

/// Upper bound accepted for `risk.max-retries`
pub const MAX_RISK_RETRIES: u32 = 10;

/// Main Aegis configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Risk-scoring and briefing service
    pub risk: RiskConfig,

    /// Alert/user record store
    pub store: StoreConfig,

    /// Change feed reconnect policy
    pub feed: FeedConfig,

    /// Map defaults
    pub map: MapConfig,

    /// Command-center clock
    pub clock: ClockConfig,

    /// Coordinator channel sizing
    pub coordinator: CoordinatorConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Call this early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        if self.risk.base_url.trim().is_empty() {
            return Err(eyre::eyre!("risk.base-url must not be empty"));
        }
        if self.store.base_url.trim().is_empty() {
            return Err(eyre::eyre!("store.base-url must not be empty"));
        }
        if self.risk.max_retries > MAX_RISK_RETRIES {
            return Err(eyre::eyre!(
                "risk.max-retries ({}) exceeds {}",
                self.risk.max_retries,
                MAX_RISK_RETRIES
            ));
        }
        if self.feed.initial_backoff_ms == 0 {
            return Err(eyre::eyre!("feed.initial-backoff-ms must be greater than zero"));
        }
        if self.feed.initial_backoff_ms > self.feed.max_backoff_ms {
            return Err(eyre::eyre!(
                "feed.initial-backoff-ms ({}) exceeds feed.max-backoff-ms ({})",
                self.feed.initial_backoff_ms,
                self.feed.max_backoff_ms
            ));
        }
        if self.clock.tick_ms == 0 {
            return Err(eyre::eyre!("clock.tick-ms must be greater than zero"));
        }
        if self.clock.offset().is_none() {
            return Err(eyre::eyre!(
                "clock.utc-offset-minutes out of range: {}",
                self.clock.utc_offset_minutes
            ));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .aegis.yml
        let local_config = PathBuf::from(".aegis.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/aegis/aegis.yml
        if let Some(user_config) = Self::user_config_path()
            && user_config.exists()
        {
            match Self::load_from_file(&user_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is initialised
    ///
    /// Errors are swallowed; the caller falls back to its default level.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates: Vec<PathBuf> = match config_path {
            Some(path) => vec![path.clone()],
            None => std::iter::once(PathBuf::from(".aegis.yml"))
                .chain(Self::user_config_path())
                .collect(),
        };

        candidates
            .into_iter()
            .filter(|p| p.exists())
            .find_map(|p| Self::load_from_file(&p).ok())
            .and_then(|c| c.log_level)
    }

    fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("aegis").join("aegis.yml"))
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Risk-scoring and briefing service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Service base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Retries for transient failures
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Initial retry backoff in milliseconds (doubles per attempt)
    #[serde(rename = "initial-backoff-ms")]
    pub initial_backoff_ms: u64,

    /// Language for generated SOP text
    pub language: String,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_ms: 30_000,
            max_retries: 2,
            initial_backoff_ms: 500,
            language: "en".to_string(),
        }
    }
}

impl RiskConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Record store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Request timeout in milliseconds (point lookups and writes)
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Path of the server-sent-events change feed
    #[serde(rename = "feed-path")]
    pub feed_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_ms: 10_000,
            feed_path: "/alerts/changes".to_string(),
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Change feed reconnect policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// First reconnect delay in milliseconds
    #[serde(rename = "initial-backoff-ms")]
    pub initial_backoff_ms: u64,

    /// Reconnect delay cap in milliseconds
    #[serde(rename = "max-backoff-ms")]
    pub max_backoff_ms: u64,

    /// Consecutive failed reconnects before giving up
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Buffer between the subscriber and the enricher
    #[serde(rename = "channel-buffer")]
    pub channel_buffer: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            max_retries: 10,
            channel_buffer: 256,
        }
    }
}

impl FeedConfig {
    /// Reconnect delay before the given attempt (1-based), without jitter
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(2u64.pow(exp))
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

/// Map defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    #[serde(rename = "center-lat")]
    pub center_lat: f64,

    #[serde(rename = "center-lon")]
    pub center_lon: f64,

    /// Zoom when the map is acquired
    #[serde(rename = "default-zoom")]
    pub default_zoom: u8,

    /// Zoom when an alert is selected
    #[serde(rename = "focus-zoom")]
    pub focus_zoom: u8,
}

impl Default for MapConfig {
    fn default() -> Self {
        // Chennai command center
        Self {
            center_lat: 13.0827,
            center_lon: 80.2707,
            default_zoom: 12,
            focus_zoom: 15,
        }
    }
}

/// Command-center clock
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Offset from UTC in minutes (330 = Asia/Kolkata)
    #[serde(rename = "utc-offset-minutes")]
    pub utc_offset_minutes: i32,

    /// Tick interval in milliseconds
    #[serde(rename = "tick-ms")]
    pub tick_ms: u64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 330,
            tick_ms: 1000,
        }
    }
}

impl ClockConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    /// Fixed UTC offset, `None` when out of range
    pub fn offset(&self) -> Option<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes.checked_mul(60)?)
    }
}
