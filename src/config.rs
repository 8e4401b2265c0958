//! Process configuration.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use pvwatch_reconciler::{DEFAULT_NOTE_PATTERN, NotePattern, SuppressionPolicy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest accepted window, period, timeout or backoff, in seconds (one year).
pub const MAX_DURATION_SECS: u64 = 31_536_000;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Controller configuration, loaded from TOML and overridden by flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Number of reconcile workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// How long a deleted pod stays suppressed.
    #[serde(default = "default_suppression_window")]
    pub suppression_window_secs: u64,

    /// `before-action` or `after-success`.
    #[serde(default = "default_suppression_policy")]
    pub suppression_policy: String,

    /// Regex matched against event notes.
    #[serde(default = "default_note_pattern")]
    pub note_pattern: String,

    /// Listen address for `/metrics`.
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: String,

    /// How often pods and events are relisted.
    #[serde(default = "default_resync_period")]
    pub resync_period_secs: u64,

    /// Bound on the initial sync before startup fails.
    #[serde(default = "default_cache_sync_timeout")]
    pub cache_sync_timeout_secs: u64,

    /// Default tracing filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

/// Retry backoff and overall requeue rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
    #[serde(default = "default_qps")]
    pub qps: u32,
    #[serde(default = "default_burst")]
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_secs: default_max_delay_secs(),
            qps: default_qps(),
            burst: default_burst(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            suppression_window_secs: default_suppression_window(),
            suppression_policy: default_suppression_policy(),
            note_pattern: default_note_pattern(),
            metrics_addr: default_metrics_addr(),
            resync_period_secs: default_resync_period(),
            cache_sync_timeout_secs: default_cache_sync_timeout(),
            log_level: default_log_level(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl Config {
    /// Load from `path`, or defaults when no path is given.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid(
                "workers must be greater than 0".to_string(),
            ));
        }
        if self.suppression_window_secs == 0 {
            return Err(ConfigError::Invalid(
                "suppression_window_secs must be greater than 0".to_string(),
            ));
        }
        if self.resync_period_secs == 0 {
            return Err(ConfigError::Invalid(
                "resync_period_secs must be greater than 0".to_string(),
            ));
        }
        if self.rate_limit.qps == 0 || self.rate_limit.burst == 0 {
            return Err(ConfigError::Invalid(
                "rate_limit.qps and rate_limit.burst must be greater than 0".to_string(),
            ));
        }
        check_bounded("suppression_window_secs", self.suppression_window_secs)?;
        check_bounded("resync_period_secs", self.resync_period_secs)?;
        check_bounded("cache_sync_timeout_secs", self.cache_sync_timeout_secs)?;
        check_bounded("rate_limit.max_delay_secs", self.rate_limit.max_delay_secs)?;
        check_bounded(
            "rate_limit.base_delay_ms",
            Duration::from_millis(self.rate_limit.base_delay_ms).as_secs(),
        )?;
        self.note_pattern()?;
        self.suppression_policy()?;
        self.metrics_addr()?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns error if the pattern is not a valid regex.
    pub fn note_pattern(&self) -> Result<NotePattern, ConfigError> {
        NotePattern::new(&self.note_pattern).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// # Errors
    ///
    /// Returns error for an unknown policy name.
    pub fn suppression_policy(&self) -> Result<SuppressionPolicy, ConfigError> {
        self.suppression_policy
            .parse()
            .map_err(|e: pvwatch_reconciler::Error| ConfigError::Invalid(e.to_string()))
    }

    /// # Errors
    ///
    /// Returns error if the address does not parse.
    pub fn metrics_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.metrics_addr.parse().map_err(|e| {
            ConfigError::Invalid(format!("metrics_addr '{}': {e}", self.metrics_addr))
        })
    }

    #[must_use]
    pub const fn suppression_window(&self) -> Duration {
        Duration::from_secs(self.suppression_window_secs)
    }

    #[must_use]
    pub const fn resync_period(&self) -> Duration {
        Duration::from_secs(self.resync_period_secs)
    }

    #[must_use]
    pub const fn cache_sync_timeout(&self) -> Duration {
        Duration::from_secs(self.cache_sync_timeout_secs)
    }
}

fn check_bounded(field: &str, secs: u64) -> Result<(), ConfigError> {
    if secs > MAX_DURATION_SECS {
        return Err(ConfigError::Invalid(format!(
            "{field} must be at most {MAX_DURATION_SECS} seconds"
        )));
    }
    Ok(())
}

const fn default_workers() -> usize {
    2
}

const fn default_suppression_window() -> u64 {
    60
}

fn default_suppression_policy() -> String {
    SuppressionPolicy::default().as_str().to_string()
}

fn default_note_pattern() -> String {
    DEFAULT_NOTE_PATTERN.to_string()
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9500".to_string()
}

const fn default_resync_period() -> u64 {
    30
}

const fn default_cache_sync_timeout() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_base_delay_ms() -> u64 {
    5
}

const fn default_max_delay_secs() -> u64 {
    1000
}

const fn default_qps() -> u32 {
    10
}

const fn default_burst() -> u32 {
    100
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.workers, 2);
        assert_eq!(config.suppression_window(), Duration::from_secs(60));
        assert_eq!(config.metrics_addr().unwrap().port(), 9500);
        assert_eq!(
            config.suppression_policy().unwrap(),
            SuppressionPolicy::BeforeAction
        );
    }

    #[test]
    fn test_load_partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "workers = 4\nsuppression_policy = \"after-success\"\n\n[rate_limit]\nqps = 5"
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();

        assert_eq!(config.workers, 4);
        assert_eq!(config.rate_limit.qps, 5);
        assert_eq!(config.rate_limit.burst, 100);
        assert_eq!(config.resync_period_secs, 30);
        assert_eq!(
            config.suppression_policy().unwrap(),
            SuppressionPolicy::AfterSuccess
        );
    }

    #[test]
    fn test_unknown_field_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "wrokers = 4").unwrap();
        assert!(matches!(
            Config::load(Some(file.path())),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let result = Config::load(Some(Path::new("/nonexistent/pvwatch.toml")));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_validation_failures() {
        let zero_workers = Config {
            workers: 0,
            ..Config::default()
        };
        assert!(zero_workers.validate().is_err());

        let bad_pattern = Config {
            note_pattern: "(".to_string(),
            ..Config::default()
        };
        assert!(bad_pattern.validate().is_err());

        let bad_policy = Config {
            suppression_policy: "never".to_string(),
            ..Config::default()
        };
        assert!(bad_policy.validate().is_err());

        let bad_addr = Config {
            metrics_addr: "localhost".to_string(),
            ..Config::default()
        };
        assert!(bad_addr.validate().is_err());
    }

    #[test]
    fn test_durations_are_bounded() {
        let huge_window = Config {
            suppression_window_secs: u64::MAX,
            ..Config::default()
        };
        assert!(matches!(huge_window.validate(), Err(ConfigError::Invalid(_))));

        let huge_backoff = Config {
            rate_limit: RateLimitConfig {
                max_delay_secs: u64::MAX,
                ..RateLimitConfig::default()
            },
            ..Config::default()
        };
        assert!(huge_backoff.validate().is_err());

        let huge_base = Config {
            rate_limit: RateLimitConfig {
                base_delay_ms: u64::MAX,
                ..RateLimitConfig::default()
            },
            ..Config::default()
        };
        assert!(huge_base.validate().is_err());

        let at_limit = Config {
            suppression_window_secs: MAX_DURATION_SECS,
            cache_sync_timeout_secs: MAX_DURATION_SECS,
            ..Config::default()
        };
        assert!(at_limit.validate().is_ok());
    }
}
