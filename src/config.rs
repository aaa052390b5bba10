use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::utils::{TrackerError, TrackerResult};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tracking: TrackingConfig,

    #[serde(default)]
    pub loading: LoadingConfig,

    #[serde(default)]
    pub network: NetworkConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Fraction of the duration that must be covered before completion is allowed
    #[serde(default = "default_completion_threshold")]
    pub completion_threshold: f64,

    /// Absorbs floating point drift in the threshold comparison
    #[serde(default = "default_coverage_epsilon")]
    pub coverage_epsilon_seconds: f64,

    /// Slack on top of wall time x rate before a tick counts as a seek
    #[serde(default = "default_tick_tolerance")]
    pub tick_tolerance_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadingConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,

    #[serde(default = "default_load_timeout")]
    pub load_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            info!("No config file found, using defaults");
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", path);
        let contents = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Config = toml::from_str(&contents).context("Failed to parse config file")?;
        config.validate()?;
        info!("Config loaded successfully");
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents).context("Failed to write config file")?;

        debug!("Config saved to {:?}", path);
        Ok(())
    }

    /// Rejects values the tracker cannot work with.
    pub fn validate(&self) -> TrackerResult<()> {
        let tracking = &self.tracking;
        let threshold = tracking.completion_threshold;
        if threshold.is_nan() || threshold <= 0.0 || threshold > 1.0 {
            return Err(TrackerError::Configuration(format!(
                "completion_threshold must be in (0, 1], got {}",
                threshold
            )));
        }
        let negative = |value: f64| value.is_nan() || value < 0.0;
        if negative(tracking.coverage_epsilon_seconds) || negative(tracking.tick_tolerance_seconds) {
            return Err(TrackerError::Configuration(
                "tracking tolerances must not be negative".to_string(),
            ));
        }
        if self.loading.load_timeout_secs == 0 {
            return Err(TrackerError::Configuration(
                "load_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Failed to get config directory")?;
        Ok(config_dir.join("watchtrack").join("config.toml"))
    }
}

impl LoadingConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }
}

impl NetworkConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            completion_threshold: default_completion_threshold(),
            coverage_epsilon_seconds: default_coverage_epsilon(),
            tick_tolerance_seconds: default_tick_tolerance(),
        }
    }
}

impl Default for LoadingConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            grace_period_ms: default_grace_period_ms(),
            load_timeout_secs: default_load_timeout(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            auth_token: None,
        }
    }
}

// Default value functions
fn default_completion_threshold() -> f64 { 0.9 }
fn default_coverage_epsilon() -> f64 { 0.001 }
fn default_tick_tolerance() -> f64 { 0.5 }
fn default_max_retries() -> u32 { 3 }
fn default_base_delay_ms() -> u64 { 1000 }
fn default_grace_period_ms() -> u64 { 100 }
fn default_load_timeout() -> u64 { 30 }
fn default_base_url() -> String { "http://localhost:8000/api".to_string() }
fn default_request_timeout() -> u64 { 30 }
