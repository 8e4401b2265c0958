//! # pvwatch - controller entry point
//!
//! ## Startup Sequence
//!
//! 1. **Configuration** - config file, then flag and env overrides
//! 2. **Tracing** - `RUST_LOG` or the configured level
//! 3. **Metrics** - Prometheus recorder and the `/metrics` endpoint
//! 4. **API client** - in-cluster service account
//! 5. **Relister** - fills the pod view and feeds events to the ingestor
//! 6. **Controller** - waits for the first sync, then runs the workers
//!
//! ## Shutdown
//!
//! SIGINT or SIGTERM cancels one token shared by every task. The queue stops
//! delivering, workers finish their current key, and the process exits.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use pvwatch::cli::Cli;
use pvwatch::config::Config;
use pvwatch::informer::Relister;
use pvwatch::kube::KubeClient;
use pvwatch::metrics;
use pvwatch_reconciler::{
    Controller, ControllerConfig, EventIngestor, InMemoryPodStore, MetricsRecorder,
    OutcomeRecorder, Reconciler, TriggerIndex,
};
use pvwatch_workqueue::{
    BucketRateLimiter, ItemExponentialFailureRateLimiter, MaxOfRateLimiter, RateLimiter,
    WorkQueue,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let config = cli.apply(config);
    config.validate().context("Invalid configuration")?;

    init_tracing(&config.log_level);

    let token = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(token.clone()));

    run(config, token).await
}

/// Initialize tracing subscriber with environment filter.
fn init_tracing(default_level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run(config: Config, token: CancellationToken) -> Result<()> {
    let handle = metrics::install_recorder().context("Failed to install metrics recorder")?;
    let listener = metrics::bind(config.metrics_addr()?)
        .await
        .context("Failed to bind metrics address")?;
    let metrics_server = tokio::spawn(metrics::serve(listener, handle, token.clone()));

    let client = Arc::new(KubeClient::in_cluster().context("Failed to build API client")?);

    let queue = Arc::new(WorkQueue::new("pvwatch", rate_limiter(&config)));
    let store = Arc::new(InMemoryPodStore::new());
    let triggers = Arc::new(TriggerIndex::new());
    let recorder: Arc<dyn OutcomeRecorder> = Arc::new(MetricsRecorder::new());

    let reconciler = Reconciler::builder()
        .with_store(store.clone())
        .with_deleter(client.clone())
        .with_recorder(recorder.clone())
        .with_triggers(triggers.clone())
        .suppression_policy(config.suppression_policy()?)
        .suppression_window(config.suppression_window())
        .build()
        .context("Failed to build reconciler")?;
    info!(
        policy = reconciler.policy().as_str(),
        window_secs = config.suppression_window_secs,
        "Reconciler initialized"
    );

    let ingestor = Arc::new(EventIngestor::new(
        queue.clone(),
        config.note_pattern()?,
        triggers,
        recorder,
    ));
    let relister = Relister::new(client, store.clone(), ingestor, config.resync_period());
    let relister = tokio::spawn(relister.run(token.clone()));

    let controller = Controller::new(
        queue,
        store,
        Arc::new(reconciler),
        ControllerConfig {
            workers: config.workers,
            sweep_interval: config.suppression_window(),
            sync_timeout: config.cache_sync_timeout(),
            ..ControllerConfig::default()
        },
    );
    let result = controller.run(token.clone()).await;

    // Stop the helpers whether the controller ran or failed to start.
    token.cancel();
    if let Err(e) = relister.await {
        error!(error = %e, "Relister task failed");
    }
    match metrics_server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Metrics server failed"),
        Err(e) => error!(error = %e, "Metrics server task failed"),
    }

    result.context("Controller failed")?;
    info!("pvwatch stopped");
    Ok(())
}

fn rate_limiter(config: &Config) -> MaxOfRateLimiter<String> {
    let limits = &config.rate_limit;
    let limiters: Vec<Box<dyn RateLimiter<String>>> = vec![
        Box::new(ItemExponentialFailureRateLimiter::new(
            std::time::Duration::from_millis(limits.base_delay_ms),
            std::time::Duration::from_secs(limits.max_delay_secs),
        )),
        Box::new(BucketRateLimiter::new(limits.qps, limits.burst)),
    ];
    MaxOfRateLimiter::new(limiters)
}

/// Cancel `token` on SIGINT or SIGTERM.
async fn shutdown_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT, initiating graceful shutdown"),
        () = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
    token.cancel();
}
