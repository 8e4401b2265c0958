//! CLI definition using clap.

use std::path::PathBuf;

use clap::Parser;

use crate::config::Config;

/// pvwatch - deletes pods stuck Pending on failed Cinder attaches
#[derive(Parser, Debug, Default)]
#[command(name = "pvwatch")]
#[command(version)]
#[command(
    about = "Watches events for failed Cinder volume attaches and deletes the stuck pods"
)]
#[command(
    long_about = "pvwatch watches Kubernetes events, and when an event note says a Cinder volume attach returned an empty device path, deletes the Pending pod so it gets rescheduled. Each pod is deleted at most once per suppression window."
)]
pub struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, env = "PVWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Number of reconcile workers
    #[arg(long, env = "PVWATCH_WORKERS")]
    pub workers: Option<usize>,

    /// Seconds a deleted pod stays suppressed
    #[arg(long, env = "PVWATCH_SUPPRESSION_WINDOW_SECS")]
    pub suppression_window_secs: Option<u64>,

    /// When to record suppression: before-action or after-success
    #[arg(long, env = "PVWATCH_SUPPRESSION_POLICY")]
    pub suppression_policy: Option<String>,

    /// Regex matched against event notes
    #[arg(long, env = "PVWATCH_NOTE_PATTERN")]
    pub note_pattern: Option<String>,

    /// Listen address for the metrics endpoint
    #[arg(long, env = "PVWATCH_METRICS_ADDR")]
    pub metrics_addr: Option<String>,

    /// Seconds between relists of pods and events
    #[arg(long, env = "PVWATCH_RESYNC_PERIOD_SECS")]
    pub resync_period_secs: Option<u64>,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, env = "PVWATCH_LOG_LEVEL")]
    pub log_level: Option<String>,
}

impl Cli {
    /// Apply flag overrides on top of `config`.
    #[must_use]
    pub fn apply(self, mut config: Config) -> Config {
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(window) = self.suppression_window_secs {
            config.suppression_window_secs = window;
        }
        if let Some(policy) = self.suppression_policy {
            config.suppression_policy = policy;
        }
        if let Some(pattern) = self.note_pattern {
            config.note_pattern = pattern;
        }
        if let Some(addr) = self.metrics_addr {
            config.metrics_addr = addr;
        }
        if let Some(period) = self.resync_period_secs {
            config.resync_period_secs = period;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        config
    }
}
