//! Fixed window admission decisions.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::key::ClientKey;
use super::store::WindowStore;
use crate::error::{Result, TollgateError};

/// Longest window or idle period accepted by validation.
pub const MAX_WINDOW: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Configuration for a fixed window limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitConfig {
    /// Maximum requests admitted per window
    pub limit: u64,
    /// Length of each window
    pub window: Duration,
    /// When false, every request is admitted and no state is kept
    pub enabled: bool,
}

impl LimitConfig {
    /// Create an enabled limit configuration.
    pub fn new(limit: u64, window: Duration) -> Self {
        Self {
            limit,
            window,
            enabled: true,
        }
    }

    /// Create a configuration that admits everything.
    pub fn disabled() -> Self {
        Self {
            limit: 0,
            window: Duration::ZERO,
            enabled: false,
        }
    }

    /// Reject zero limits and zero or oversized windows on an enabled
    /// configuration.
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.limit == 0 {
            return Err(TollgateError::InvalidLimit(
                "requests per time frame must be greater than zero".to_string(),
            ));
        }
        if self.window.is_zero() {
            return Err(TollgateError::InvalidLimit(
                "time frame must be greater than zero".to_string(),
            ));
        }
        if self.window > MAX_WINDOW {
            return Err(TollgateError::InvalidLimit(format!(
                "time frame must not exceed {}s",
                MAX_WINDOW.as_secs()
            )));
        }
        Ok(())
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request may proceed
    pub admitted: bool,
    /// Time until the caller's window resets; zero when admitted
    pub retry_after: Duration,
}

impl Decision {
    pub fn admit() -> Self {
        Self {
            admitted: true,
            retry_after: Duration::ZERO,
        }
    }

    pub fn deny(retry_after: Duration) -> Self {
        Self {
            admitted: false,
            retry_after,
        }
    }

    /// `retry_after` rounded up to whole seconds.
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.retry_after.as_secs();
        if self.retry_after.subsec_nanos() > 0 {
            secs.saturating_add(1)
        } else {
            secs
        }
    }
}

/// The fixed window rate limiter.
///
/// Holds no mutable state of its own; all window state lives in the shared
/// [`WindowStore`], which can be handed to a [`Reaper`](super::Reaper).
#[derive(Debug, Clone)]
pub struct FixedWindowLimiter {
    config: LimitConfig,
    store: Arc<WindowStore>,
}

impl FixedWindowLimiter {
    /// Create an enabled limiter admitting `limit` requests per `window`.
    pub fn new(limit: u64, window: Duration) -> Result<Self> {
        Self::from_config(LimitConfig::new(limit, window))
    }

    /// Create a limiter that admits every request.
    pub fn disabled() -> Self {
        Self {
            config: LimitConfig::disabled(),
            store: Arc::new(WindowStore::new()),
        }
    }

    /// Create a limiter from a validated configuration.
    pub fn from_config(config: LimitConfig) -> Result<Self> {
        Self::with_store(config, Arc::new(WindowStore::new()))
    }

    /// Create a limiter over an existing store.
    pub fn with_store(config: LimitConfig, store: Arc<WindowStore>) -> Result<Self> {
        config.validate()?;
        debug!(
            limit = config.limit,
            window = ?config.window,
            enabled = config.enabled,
            "Creating fixed window limiter"
        );
        Ok(Self { config, store })
    }

    /// Decide whether a request from `key` may proceed now.
    pub fn allow(&self, key: &ClientKey) -> Decision {
        if !self.config.enabled {
            return Decision::admit();
        }
        self.allow_at(key, Instant::now())
    }

    /// Decide whether a request from `key` arriving at `now` may proceed.
    ///
    /// Denied requests stay counted, so a burst of rejected calls keeps
    /// being rejected until the window closes.
    pub fn allow_at(&self, key: &ClientKey, now: Instant) -> Decision {
        if !self.config.enabled {
            return Decision::admit();
        }

        let state = self.store.get_and_advance(key, now, self.config.window);

        trace!(key = %key, count = state.count, limit = self.config.limit, "Checking rate limit");

        if state.count <= self.config.limit {
            return Decision::admit();
        }

        let retry_after = state
            .window_start
            .checked_add(self.config.window)
            .map_or(self.config.window, |end| end.saturating_duration_since(now));
        debug!(
            key = %key,
            count = state.count,
            limit = self.config.limit,
            retry_after = ?retry_after,
            "Rate limit exceeded"
        );
        Decision::deny(retry_after)
    }

    pub fn config(&self) -> &LimitConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// The store holding this limiter's window state.
    pub fn store(&self) -> &Arc<WindowStore> {
        &self.store
    }
}

impl Default for FixedWindowLimiter {
    fn default() -> Self {
        Self::disabled()
    }
}
