//! Configuration management for the rekey controller

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Default node annotation carrying the rotation stage
pub const DEFAULT_ANNOTATION_KEY: &str = "rekey.io/encryption-hash";
/// Default label marking control-plane nodes
pub const DEFAULT_CONTROL_PLANE_LABEL: &str = "node-role.kubernetes.io/control-plane";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Optimistic-concurrency retry settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total write attempts before giving up
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds
    pub initial_delay_ms: u64,
    /// Cap for the backoff delay, in milliseconds
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff (1.0 keeps the delay constant)
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 10,
            max_delay_ms: 1000,
            multiplier: 1.0,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration
    pub fn new(max_attempts: u32, initial_delay_ms: u64, max_delay_ms: u64, multiplier: f64) -> Self {
        Self {
            max_attempts,
            initial_delay_ms,
            max_delay_ms,
            multiplier,
        }
    }

    /// Get delay before retry number `retry` (1-based); zero for `retry == 0`
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::from_millis(0);
        }

        // initial_delay * (multiplier ^ (retry - 1)), capped
        let delay_ms = (self.initial_delay_ms as f64) * self.multiplier.powi((retry - 1) as i32);
        let delay_ms = delay_ms.min(self.max_delay_ms as f64) as u64;

        Duration::from_millis(delay_ms)
    }
}

/// Controller configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Migrate secrets but keep the retiring key and revert the node to
    /// its start annotation
    pub skip: bool,
    pub annotation_key: String,
    pub control_plane_label: String,
    /// Secrets fetched per list call
    pub page_size: usize,
    pub retry: RetryConfig,
    pub key_config_path: Option<String>,
    pub snapshot_path: Option<String>,
    pub log_level: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            skip: false,
            annotation_key: DEFAULT_ANNOTATION_KEY.to_string(),
            control_plane_label: DEFAULT_CONTROL_PLANE_LABEL.to_string(),
            page_size: 500,
            retry: RetryConfig::default(),
            key_config_path: None,
            snapshot_path: None,
            log_level: None,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from `.env` and `REKEY_*` environment variables
    ///
    /// Nested fields use `__`, e.g. `REKEY_RETRY__MAX_ATTEMPTS=8`.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let settings = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("REKEY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Self::from_config(settings)
    }

    /// Build from an already assembled `config::Config`; unset fields keep
    /// their defaults
    pub fn from_config(settings: config::Config) -> Result<Self, ConfigError> {
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.annotation_key.is_empty() {
            return Err(ConfigError::Invalid("annotation_key must not be empty".to_string()));
        }
        if self.control_plane_label.is_empty() {
            return Err(ConfigError::Invalid(
                "control_plane_label must not be empty".to_string(),
            ));
        }
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be greater than zero".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Get log level, defaulting to "info"
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }
}
