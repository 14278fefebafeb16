use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{Backend, ConfigError};
use crate::core::bluetooth::{
    BLUETOOTH_MIN_WRITE_INTERVAL_MS, CONNECT_RETRY_DELAY_MS, DEFAULT_SCAN_POLL_INTERVAL_MS,
    RetryPolicy, SIMULATED_MIN_WRITE_INTERVAL_MS, UnclassifiedErrorPolicy,
};

/// Timing and retry settings for the connection manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Length of one scan cycle while searching for the receiver
    pub scan_poll_interval_ms: u64,
    /// Delay before retrying a failed connect step
    pub retry_delay_ms: u64,
    /// Minimum spacing between writes. Backend default when unset.
    pub min_write_interval_ms: Option<u64>,
    /// Keep re-sending the pending command while connected
    pub idle_flush: bool,
    /// Re-send period. Defaults to the minimum write interval.
    pub flush_interval_ms: Option<u64>,
    /// Give up a connect attempt after this many failures. Unset retries forever.
    pub max_attempts: Option<u32>,
    /// Give up a connect attempt after this long. Unset retries forever.
    pub max_duration_ms: Option<u64>,
    /// How to treat platform errors that are not "already in progress"
    pub unclassified_errors: UnclassifiedErrorPolicy,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            scan_poll_interval_ms: DEFAULT_SCAN_POLL_INTERVAL_MS,
            retry_delay_ms: CONNECT_RETRY_DELAY_MS,
            min_write_interval_ms: None,
            idle_flush: true,
            flush_interval_ms: None,
            max_attempts: None,
            max_duration_ms: None,
            unclassified_errors: UnclassifiedErrorPolicy::Retry,
        }
    }
}

impl ConnectionConfig {
    pub fn retry_policy(&self) -> Result<RetryPolicy, ConfigError> {
        if self.max_attempts == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "connection.max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(RetryPolicy {
            delay: Duration::from_millis(self.retry_delay_ms),
            max_attempts: self.max_attempts,
            max_duration: self.max_duration_ms.map(Duration::from_millis),
            unclassified: self.unclassified_errors,
        })
    }

    pub fn scan_poll_interval(&self) -> Result<Duration, ConfigError> {
        if self.scan_poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "connection.scan_poll_interval_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(Duration::from_millis(self.scan_poll_interval_ms))
    }

    pub fn min_write_interval(&self, backend: Backend) -> Duration {
        let default = match backend {
            Backend::Bluetooth => BLUETOOTH_MIN_WRITE_INTERVAL_MS,
            Backend::Simulated => SIMULATED_MIN_WRITE_INTERVAL_MS,
        };
        Duration::from_millis(self.min_write_interval_ms.unwrap_or(default))
    }

    pub fn flush_interval(&self, backend: Backend) -> Result<Option<Duration>, ConfigError> {
        if !self.idle_flush {
            return Ok(None);
        }
        let period = self
            .flush_interval_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.min_write_interval(backend));
        if period.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "connection.flush_interval_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(Some(period))
    }
}
