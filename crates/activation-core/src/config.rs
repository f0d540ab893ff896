//! Activation service configuration
//!
//! Durations are expressed in milliseconds when loaded from TOML:
//!
//! ```rust
//! use vvm_activation_core::config::ActivationConfig;
//! use std::time::Duration;
//!
//! let config = ActivationConfig::from_toml_str(r#"
//!     max_retries = 2
//!     retry_interval_ms = 1000
//! "#).unwrap();
//!
//! assert_eq!(config.max_retries, 2);
//! assert_eq!(config.retry_interval(), Duration::from_secs(1));
//! // Unset fields keep their defaults
//! assert_eq!(config.status_reply_timeout(), Duration::from_secs(60));
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ActivationError, Result};

/// Number of retries after the first failed attempt
pub const DEFAULT_MAX_RETRIES: u32 = 4;
/// Delay before a retry is started
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 5_000;
/// How long the carrier has to answer an activation request with a STATUS message
pub const DEFAULT_STATUS_REPLY_TIMEOUT_MS: u64 = 60_000;
/// Capacity of the channel status broadcast channel
pub const DEFAULT_STATUS_CHANNEL_CAPACITY: usize = 64;

/// Configuration for the activation service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivationConfig {
    /// Maximum number of retries per activation lifecycle
    pub max_retries: u32,

    /// Fixed delay between a failed attempt and its retry
    pub retry_interval_ms: u64,

    /// Deadline for the STATUS reply after an activation request is sent
    pub status_reply_timeout_ms: u64,

    /// Buffered channel status updates per subscriber before lagging
    pub status_channel_capacity: usize,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_interval_ms: DEFAULT_RETRY_INTERVAL_MS,
            status_reply_timeout_ms: DEFAULT_STATUS_REPLY_TIMEOUT_MS,
            status_channel_capacity: DEFAULT_STATUS_CHANNEL_CAPACITY,
        }
    }
}

impl ActivationConfig {
    /// Parse a configuration from TOML, filling unset fields with defaults
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)
            .map_err(|e| ActivationError::config(format!("Invalid activation config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_status_reply_timeout(mut self, timeout: Duration) -> Self {
        self.status_reply_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_status_channel_capacity(mut self, capacity: usize) -> Self {
        self.status_channel_capacity = capacity;
        self
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn status_reply_timeout(&self) -> Duration {
        Duration::from_millis(self.status_reply_timeout_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.status_reply_timeout_ms == 0 {
            return Err(ActivationError::config("status_reply_timeout_ms must be greater than 0"));
        }
        if self.status_channel_capacity == 0 {
            return Err(ActivationError::config("status_channel_capacity must be greater than 0"));
        }
        Ok(())
    }
}
