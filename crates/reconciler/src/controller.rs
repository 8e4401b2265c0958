//! Controller lifecycle: sync barrier, workers, sweeper, shutdown.

use std::sync::Arc;
use std::time::Duration;

use pvwatch_workqueue::WorkQueue;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::cache::spawn_sweeper;
use crate::error::{Error, Result};
use crate::reconciler::{DEFAULT_SUPPRESSION_WINDOW, Reconciler};
use crate::store::PodStore;
use crate::worker::WorkerPool;

/// Configuration for the controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Number of worker tasks.
    pub workers: usize,
    /// How often expired suppression entries are reclaimed.
    pub sweep_interval: Duration,
    /// Bound on the initial store sync.
    pub sync_timeout: Duration,
    /// How often `has_synced` is polled while waiting.
    pub sync_poll_interval: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            sweep_interval: DEFAULT_SUPPRESSION_WINDOW,
            sync_timeout: Duration::from_secs(60),
            sync_poll_interval: Duration::from_millis(100),
        }
    }
}

/// Runs the reconciliation loop until cancelled.
pub struct Controller {
    queue: Arc<WorkQueue<String>>,
    store: Arc<dyn PodStore>,
    reconciler: Arc<Reconciler>,
    config: ControllerConfig,
}

impl Controller {
    pub fn new(
        queue: Arc<WorkQueue<String>>,
        store: Arc<dyn PodStore>,
        reconciler: Arc<Reconciler>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            queue,
            store,
            reconciler,
            config,
        }
    }

    pub fn queue(&self) -> &Arc<WorkQueue<String>> {
        &self.queue
    }

    /// Wait for the store, start workers and the sweeper, and block until
    /// `token` is cancelled. Then shut the queue down and join everything.
    ///
    /// # Errors
    ///
    /// Returns `Error::CacheSyncTimeout` if the store does not sync in time,
    /// or `Error::LoopStopped` if `token` is cancelled before it does. The
    /// queue is shut down in both cases.
    pub async fn run(&self, token: CancellationToken) -> Result<()> {
        if self.config.workers == 0 {
            return Err(Error::invalid_config("at least one worker is required"));
        }

        info!("Starting pvwatch controller");
        info!("Waiting for informer caches to sync");
        if let Err(e) = wait_for_sync(
            self.store.as_ref(),
            self.config.sync_timeout,
            self.config.sync_poll_interval,
            &token,
        )
        .await
        {
            error!(error = %e, "Controller did not start");
            self.queue.shut_down();
            return Err(e);
        }

        info!(workers = self.config.workers, "Starting workers");
        let sweeper_token = token.child_token();
        let sweeper = spawn_sweeper(
            self.reconciler.cache().clone(),
            self.config.sweep_interval,
            sweeper_token.clone(),
        );
        let pool = WorkerPool::spawn(
            self.config.workers,
            self.queue.clone(),
            self.reconciler.clone(),
        );
        info!("Started workers");

        token.cancelled().await;

        info!("Shutting down workers");
        self.queue.shut_down();
        pool.join().await;
        sweeper_token.cancel();
        if let Err(e) = sweeper.await {
            error!(error = %e, "Sweeper task failed");
        }
        Ok(())
    }
}

/// Poll `store.has_synced()` until it reports true.
///
/// # Errors
///
/// Returns `Error::CacheSyncTimeout` after `timeout`, or `Error::LoopStopped`
/// if `token` is cancelled first.
pub async fn wait_for_sync(
    store: &dyn PodStore,
    timeout: Duration,
    poll: Duration,
    token: &CancellationToken,
) -> Result<()> {
    let poll = poll.max(Duration::from_millis(1));
    let wait = async {
        while !store.has_synced() {
            tokio::time::sleep(poll).await;
        }
    };

    tokio::select! {
        () = token.cancelled() => Err(Error::LoopStopped),
        waited = tokio::time::timeout(timeout, wait) => {
            waited.map_err(|_| Error::cache_sync_timeout(timeout))
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use async_trait::async_trait;
    use pvwatch_core::{Pod, PodPhase};
    use pvwatch_workqueue::ItemExponentialFailureRateLimiter;

    use super::*;
    use crate::recorder::MemoryRecorder;
    use crate::store::{InMemoryPodStore, PodDeleter};

    struct NoopDeleter;

    #[async_trait]
    impl PodDeleter for NoopDeleter {
        async fn delete(&self, _namespace: &str, _name: &str) -> Result<()> {
            Ok(())
        }
    }

    fn controller(store: Arc<InMemoryPodStore>, config: ControllerConfig) -> Controller {
        let queue = Arc::new(WorkQueue::new(
            "pods",
            ItemExponentialFailureRateLimiter::default(),
        ));
        let reconciler = Reconciler::builder()
            .with_store(store.clone())
            .with_deleter(Arc::new(NoopDeleter))
            .with_recorder(Arc::new(MemoryRecorder::new()))
            .build()
            .unwrap();
        Controller::new(queue, store, Arc::new(reconciler), config)
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_timeout_is_fatal() {
        let store = Arc::new(InMemoryPodStore::new());
        let config = ControllerConfig {
            sync_timeout: Duration::from_secs(5),
            ..ControllerConfig::default()
        };
        let controller = controller(store, config);

        let result = controller.run(CancellationToken::new()).await;

        assert!(matches!(result, Err(Error::CacheSyncTimeout { .. })));
        assert!(controller.queue().is_shutting_down());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_sync_stops_loop() {
        let store = Arc::new(InMemoryPodStore::new());
        let controller = controller(store, ControllerConfig::default());
        let token = CancellationToken::new();
        token.cancel();

        let result = controller.run(token).await;
        assert!(matches!(result, Err(Error::LoopStopped)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_sync_sees_late_sync() {
        let store = Arc::new(InMemoryPodStore::new());
        let syncer = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            syncer.replace(Vec::<Pod>::new());
        });

        let result = wait_for_sync(
            store.as_ref(),
            Duration::from_secs(10),
            Duration::from_millis(100),
            &CancellationToken::new(),
        )
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_processes_and_shuts_down() {
        let store = Arc::new(InMemoryPodStore::with_pods([Pod::new(
            "default",
            "web-0",
            PodPhase::Pending,
        )]));
        let controller = Arc::new(controller(store, ControllerConfig::default()));
        let token = CancellationToken::new();

        let runner = {
            let controller = controller.clone();
            let token = token.clone();
            tokio::spawn(async move { controller.run(token).await })
        };

        controller.queue().add("default/web-0".to_string());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(controller.reconciler.cache().contains("default/web-0"));

        token.cancel();
        runner.await.unwrap().unwrap();
        assert!(controller.queue().is_shutting_down());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_workers_rejected() {
        let store = Arc::new(InMemoryPodStore::with_pods(Vec::new()));
        let config = ControllerConfig {
            workers: 0,
            ..ControllerConfig::default()
        };
        let result = controller(store, config).run(CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }
}
