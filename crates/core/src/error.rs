//! Core error types for pvwatch.
//!
//! All errors are explicit, typed, and recoverable - no panics allowed.

use thiserror::Error;

/// Core error type shared by the pvwatch crates.
#[derive(Debug, Error)]
pub enum Error {
    // Object identity
    #[error("invalid object key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("object '{kind}' has no name")]
    MissingName { kind: String },
}

impl Error {
    /// Create an invalid key error.
    pub fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a missing name error.
    pub fn missing_name(kind: impl Into<String>) -> Self {
        Self::MissingName { kind: kind.into() }
    }
}
