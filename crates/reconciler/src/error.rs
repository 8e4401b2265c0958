//! Error types for the reconciler crate.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciler error types.
#[derive(Debug, Error)]
pub enum Error {
    /// The corrective action failed; the key is retried with backoff.
    #[error("action '{action}' on '{key}' failed: {reason}")]
    ActionFailed {
        action: String,
        key: String,
        reason: String,
    },

    /// The action sink could not complete a call.
    #[error("action sink error: {reason}")]
    Sink { reason: String },

    /// The local view did not finish its initial sync in time.
    #[error("failed to wait for caches to sync within {}s", waited.as_secs())]
    CacheSyncTimeout { waited: Duration },

    /// Shutdown was requested before startup completed.
    #[error("reconciliation loop stopped")]
    LoopStopped,

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    /// Create an action failed error.
    pub fn action_failed(
        action: impl Into<String>,
        key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::ActionFailed {
            action: action.into(),
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create an action sink error.
    pub fn sink(reason: impl Into<String>) -> Self {
        Self::Sink {
            reason: reason.into(),
        }
    }

    /// Create a cache sync timeout error.
    #[must_use]
    pub const fn cache_sync_timeout(waited: Duration) -> Self {
        Self::CacheSyncTimeout { waited }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_failed_display() {
        let err = Error::action_failed("delete", "default/web-0", "connection reset");
        let text = err.to_string();
        assert!(text.contains("delete"));
        assert!(text.contains("default/web-0"));
        assert!(text.contains("connection reset"));
    }

    #[test]
    fn test_sync_timeout_display() {
        let err = Error::cache_sync_timeout(Duration::from_secs(30));
        assert_eq!(err.to_string(), "failed to wait for caches to sync within 30s");
    }
}
