//! Configuration management for Tollgate.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, TollgateError};
use crate::ratelimit::{LimitConfig, ReaperSettings, MAX_WINDOW};

/// Prefix for environment variable overrides, e.g. `TOLLGATE_RATE_LIMITING__ENABLED`.
const ENV_PREFIX: &str = "TOLLGATE";
/// Legacy variable holding the number of requests per time frame.
const LEGACY_REQUESTS_VAR: &str = "RATELIMITER_REQUESTS_COUNT";
/// Legacy variable toggling the rate limiter.
const LEGACY_ENABLED_VAR: &str = "RATE_LIMIT_ENABLED";

/// Main configuration for the Tollgate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TollgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,

    /// Deployment environment reported by the health endpoint
    #[serde(default = "default_env")]
    pub env: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            env: default_env(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_env() -> String {
    "development".to_string()
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Whether requests are rate limited at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Requests admitted per client in each time frame
    #[serde(default = "default_requests_per_time_frame")]
    pub requests_per_time_frame: u64,

    /// Length of the time frame in seconds
    #[serde(default = "default_time_frame_secs")]
    pub time_frame_secs: u64,

    /// Idle time after a window ends before its state is evicted.
    /// Defaults to one time frame.
    #[serde(default)]
    pub idle_grace_secs: Option<u64>,

    /// Interval between eviction sweeps. Defaults to one time frame.
    #[serde(default)]
    pub reap_interval_secs: Option<u64>,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            requests_per_time_frame: default_requests_per_time_frame(),
            time_frame_secs: default_time_frame_secs(),
            idle_grace_secs: None,
            reap_interval_secs: None,
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_requests_per_time_frame() -> u64 {
    100
}

fn default_time_frame_secs() -> u64 {
    5
}

impl RateLimitingConfig {
    /// Length of a rate limit window.
    pub fn time_frame(&self) -> Duration {
        Duration::from_secs(self.time_frame_secs)
    }

    /// Convert into the limiter's runtime configuration.
    pub fn limit_config(&self) -> LimitConfig {
        LimitConfig {
            limit: self.requests_per_time_frame,
            window: self.time_frame(),
            enabled: self.enabled,
        }
    }

    /// Convert into the reaper's runtime settings.
    pub fn reaper_settings(&self) -> ReaperSettings {
        let window = self.time_frame();
        ReaperSettings {
            interval: self.reap_interval_secs.map_or(window, Duration::from_secs),
            idle_threshold: self.idle_grace_secs.map_or(window, Duration::from_secs),
        }
    }

    /// Check the configuration can be enforced.
    pub fn validate(&self) -> Result<()> {
        self.limit_config().validate()?;
        if !self.enabled {
            return Ok(());
        }
        if self.reap_interval_secs == Some(0) {
            return Err(TollgateError::Config(
                "reap interval must be greater than zero".to_string(),
            ));
        }
        let max_secs = MAX_WINDOW.as_secs();
        if self.reap_interval_secs.is_some_and(|secs| secs > max_secs) {
            return Err(TollgateError::Config(format!(
                "reap interval must not exceed {}s",
                max_secs
            )));
        }
        if self.idle_grace_secs.is_some_and(|secs| secs > max_secs) {
            return Err(TollgateError::Config(format!(
                "idle grace must not exceed {}s",
                max_secs
            )));
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TollgateConfig {
    /// Load configuration from a YAML file path.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TollgateConfig =
            serde_yaml::from_str(yaml).map_err(|e| TollgateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional YAML file layered with
    /// environment variables.
    ///
    /// `TOLLGATE_*` variables use `__` to separate nested keys. The legacy
    /// `RATELIMITER_REQUESTS_COUNT` and `RATE_LIMIT_ENABLED` variables take
    /// precedence over both.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            builder = builder
                .add_source(::config::File::from(path).format(::config::FileFormat::Yaml));
        }

        let config: TollgateConfig = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option(
                "rate_limiting.requests_per_time_frame",
                std::env::var(LEGACY_REQUESTS_VAR).ok(),
            )?
            .set_override_option(
                "rate_limiting.enabled",
                std::env::var(LEGACY_ENABLED_VAR).ok(),
            )?
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Check every section can be enforced.
    pub fn validate(&self) -> Result<()> {
        self.rate_limiting.validate()
    }
}
