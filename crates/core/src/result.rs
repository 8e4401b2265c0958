//! Result type definition and extension traits.
//!
//! Provides combinators for Result types so call sites can log and continue
//! without unwrap/expect/panic.

use crate::error::Error;

/// The standard Result type for pvwatch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait providing logging combinators for Results.
pub trait ResultExt<T> {
    /// Convert a Result to an Option, logging the error if present.
    fn into_option_logged(self, context: &str) -> Option<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn into_option_logged(self, context: &str) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(error = %e, "{context}");
                None
            }
        }
    }
}
