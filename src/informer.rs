//! Periodic relister feeding the pod view and the event ingestor.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use pvwatch_core::{Event, ResultExt};
use pvwatch_reconciler::{EventIngestor, InMemoryPodStore};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::kube::{ClusterSource, KubeError};

/// Relists pods and events every resync period.
///
/// Pods replace the store wholesale. Events not seen before are delivered as
/// adds; events seen on the previous pass are delivered as updates, so a
/// resync re-ingests them.
pub struct Relister {
    source: Arc<dyn ClusterSource>,
    store: Arc<InMemoryPodStore>,
    ingestor: Arc<EventIngestor>,
    period: Duration,
    seen: HashMap<String, Event>,
}

impl Relister {
    pub fn new(
        source: Arc<dyn ClusterSource>,
        store: Arc<InMemoryPodStore>,
        ingestor: Arc<EventIngestor>,
        period: Duration,
    ) -> Self {
        Self {
            source,
            store,
            ingestor,
            period,
            seen: HashMap::new(),
        }
    }

    /// Relist until `token` is cancelled. Failed passes are logged and
    /// retried on the next tick.
    pub async fn run(mut self, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.period.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(period_secs = self.period.as_secs(), "Relister started");

        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.sync_once().await {
                        warn!(error = %e, "Relist failed");
                    }
                }
            }
        }

        info!("Relister stopped");
    }

    /// One relist pass. Pods are stored before events are ingested so the
    /// reconciler sees the pods the events refer to.
    ///
    /// # Errors
    ///
    /// Returns error if either list call fails; nothing is applied then.
    pub async fn sync_once(&mut self) -> Result<(), KubeError> {
        let pods = self.source.list_pods().await?;
        let events = self.source.list_events().await?;
        debug!(pods = pods.len(), events = events.len(), "Relisted");

        self.store.replace(pods);

        let mut next = HashMap::with_capacity(events.len());
        for event in events {
            let Some(key) = event
                .metadata
                .key("Event")
                .into_option_logged("Skipping unnamed event")
            else {
                continue;
            };
            let key = key.to_string();
            match self.seen.get(&key) {
                Some(old) => self.ingestor.on_update(old, &event),
                None => self.ingestor.on_add(&event),
            };
            next.insert(key, event);
        }
        self.seen = next;
        Ok(())
    }
}
