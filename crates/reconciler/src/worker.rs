//! Worker pool draining the work queue.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use pvwatch_workqueue::WorkQueue;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::Result;
use crate::reconciler::Reconciler;
use crate::types::Classification;

/// Anything that can reconcile a single key.
#[async_trait]
pub trait Reconcile: Send + Sync {
    /// Reconcile `key`. `Ok` forgets the key, `Err` retries it with backoff.
    async fn reconcile(&self, key: &str) -> Result<Classification>;
}

#[async_trait]
impl Reconcile for Reconciler {
    async fn reconcile(&self, key: &str) -> Result<Classification> {
        Reconciler::reconcile(self, key).await
    }
}

/// Fixed set of worker tasks sharing one queue.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` tasks. Each runs until the queue is shut down and
    /// drained.
    pub fn spawn(
        workers: usize,
        queue: Arc<WorkQueue<String>>,
        reconciler: Arc<dyn Reconcile>,
    ) -> Self {
        let handles = (0..workers)
            .map(|id| {
                let queue = queue.clone();
                let reconciler = reconciler.clone();
                tokio::spawn(async move {
                    while process_next(&queue, reconciler.as_ref()).await {}
                    debug!(worker = id, "Worker exiting");
                })
            })
            .collect();
        Self { handles }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every worker to exit.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task failed");
            }
        }
    }
}

/// Take one key from the queue and reconcile it.
///
/// Returns `false` once the queue is shut down and drained.
pub async fn process_next(queue: &WorkQueue<String>, reconciler: &dyn Reconcile) -> bool {
    let Some(key) = queue.get().await else {
        return false;
    };

    match AssertUnwindSafe(reconciler.reconcile(&key))
        .catch_unwind()
        .await
    {
        Ok(Ok(classification)) => {
            queue.forget(&key);
            info!(outcome = %classification, "Successfully synced '{}'", key);
        }
        Ok(Err(e)) => {
            let retries = requeue(queue, &key);
            error!(key = %key, error = %e, retries, "Error syncing; requeued");
        }
        Err(_) => {
            let retries = requeue(queue, &key);
            error!(key = %key, retries, "Reconcile panicked; requeued");
        }
    }
    queue.done(&key);
    true
}

/// Requeue `key` with backoff. Returns its failure count including this one.
fn requeue(queue: &WorkQueue<String>, key: &String) -> u32 {
    queue.add_rate_limited(key.clone());
    queue.num_requeues(key)
}
