//! Error taxonomy for the platform BLE stack.

use thiserror::Error;

/// Errors reported by a [`BlePlatform`](super::platform::BlePlatform).
///
/// The connection state machine only cares about the class of an error:
/// in-progress errors are always retried, a lost link triggers a full
/// reconnect, and everything else follows the configured policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("operation already in progress: {0}")]
    InProgress(String),
    #[error("not connected: {0}")]
    NotConnected(String),
    #[error("adapter unavailable: {0}")]
    AdapterUnavailable(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Other(String),
}

impl PlatformError {
    /// Scan or connect already running; retrying later is always safe
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::InProgress(_))
    }

    pub fn is_not_connected(&self) -> bool {
        matches!(self, Self::NotConnected(_))
    }

    /// Classify an error message from the platform stack.
    ///
    /// BlueZ reports these as `org.bluez.Error.*` strings, e.g.
    /// `Operation already in progress` or `Not connected`.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("in progress")
            || lower.contains("inprogress")
            || lower.contains("already scanning")
        {
            Self::InProgress(message)
        } else if lower.contains("not connected") || lower.contains("notconnected") {
            Self::NotConnected(message)
        } else {
            Self::Other(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_bluez_messages() {
        let err = PlatformError::from_message(
            "org.bluez.Error.InProgress: Operation already in progress",
        );
        assert!(err.is_transient());

        let err = PlatformError::from_message("org.bluez.Error.Failed: Not connected");
        assert!(err.is_not_connected());

        let err = PlatformError::from_message("Software caused connection abort");
        assert_eq!(err, PlatformError::Other("Software caused connection abort".to_string()));
        assert!(!err.is_transient());
    }
}
