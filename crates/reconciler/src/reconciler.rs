//! Per-key reconciliation.

use std::sync::Arc;
use std::time::Duration;

use pvwatch_core::ObjectKey;
use tracing::{debug, info, warn};

use crate::cache::{ExpiringSet, SuppressionCache};
use crate::error::{Error, Result};
use crate::policy::{Eligibility, PhaseEligibility};
use crate::recorder::{MetricsRecorder, OutcomeRecorder};
use crate::store::{PodDeleter, PodStore};
use crate::triggers::TriggerIndex;
use crate::types::{Classification, Outcome, SuppressionPolicy};

/// Default suppression window.
pub const DEFAULT_SUPPRESSION_WINDOW: Duration = Duration::from_secs(60);

/// Deletes eligible pods at most once per suppression window.
pub struct Reconciler {
    store: Arc<dyn PodStore>,
    deleter: Arc<dyn PodDeleter>,
    cache: Arc<dyn SuppressionCache>,
    recorder: Arc<dyn OutcomeRecorder>,
    triggers: Arc<TriggerIndex>,
    eligibility: Arc<dyn Eligibility>,
    policy: SuppressionPolicy,
}

impl Reconciler {
    pub fn builder() -> ReconcilerBuilder {
        ReconcilerBuilder::new()
    }

    /// Reconcile the pod named by `key`.
    ///
    /// Every skip is classified and returned as `Ok`; the key should be
    /// forgotten. Only a failed delete is an error, and the key should be
    /// retried with backoff.
    ///
    /// # Errors
    ///
    /// Returns `Error::ActionFailed` when the delete call fails.
    pub async fn reconcile(&self, key: &str) -> Result<Classification> {
        let event = self.triggers.event_for(key);

        let parsed = match ObjectKey::parse(key) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(key, error = %e, "Dropping malformed key");
                self.finish(key, Outcome::new(event, Classification::MalformedKey).with_error(&e));
                return Ok(Classification::MalformedKey);
            }
        };
        let namespace = parsed.namespace();
        let name = parsed.name();

        let Some(pod) = self.store.get(namespace, name) else {
            debug!(key, "Pod no longer exists");
            self.finish(
                key,
                Outcome::new(event, Classification::EntityNotFound).with_pod(key),
            );
            return Ok(Classification::EntityNotFound);
        };
        let node = pod.node_name().to_string();

        if !self.eligibility.is_eligible(&pod) {
            debug!(key, phase = %pod.phase(), "Pod not eligible for deletion");
            self.finish(
                key,
                Outcome::new(event, Classification::EntityIneligible)
                    .with_pod(key)
                    .with_node(node),
            );
            return Ok(Classification::EntityIneligible);
        }

        if self.cache.contains(key) {
            debug!(key, "Pod deleted recently, skipping");
            self.finish(
                key,
                Outcome::new(event, Classification::AlreadySuppressed)
                    .with_pod(key)
                    .with_node(node),
            );
            return Ok(Classification::AlreadySuppressed);
        }

        if self.policy == SuppressionPolicy::BeforeAction {
            self.cache.insert(key);
        }

        match self.deleter.delete(namespace, name).await {
            Ok(()) => {
                if self.policy == SuppressionPolicy::AfterSuccess {
                    self.cache.insert(key);
                }
                info!(key, node = %node, "Deleted pod");
                self.finish(
                    key,
                    Outcome::new(event, Classification::Ok)
                        .with_pod(key)
                        .with_node(node),
                );
                Ok(Classification::Ok)
            }
            Err(e) => {
                warn!(key, node = %node, error = %e, "Failed to delete pod");
                self.recorder.record(
                    Outcome::new(event, Classification::ActionFailed)
                        .with_pod(key)
                        .with_node(node)
                        .with_error(&e),
                );
                Err(Error::action_failed("delete", key, e.to_string()))
            }
        }
    }

    /// Record a terminal outcome and drop the trigger it reported, unless a
    /// newer event arrived while the key was in flight.
    fn finish(&self, key: &str, outcome: Outcome) {
        self.triggers.clear_if(key, &outcome.event);
        self.recorder.record(outcome);
    }

    #[must_use]
    pub const fn policy(&self) -> SuppressionPolicy {
        self.policy
    }

    pub fn cache(&self) -> &Arc<dyn SuppressionCache> {
        &self.cache
    }

    pub fn triggers(&self) -> &Arc<TriggerIndex> {
        &self.triggers
    }
}

/// Builder for [`Reconciler`].
pub struct ReconcilerBuilder {
    store: Option<Arc<dyn PodStore>>,
    deleter: Option<Arc<dyn PodDeleter>>,
    cache: Option<Arc<dyn SuppressionCache>>,
    recorder: Option<Arc<dyn OutcomeRecorder>>,
    triggers: Option<Arc<TriggerIndex>>,
    eligibility: Arc<dyn Eligibility>,
    policy: SuppressionPolicy,
    window: Duration,
}

impl ReconcilerBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            store: None,
            deleter: None,
            cache: None,
            recorder: None,
            triggers: None,
            eligibility: Arc::new(PhaseEligibility::pending()),
            policy: SuppressionPolicy::default(),
            window: DEFAULT_SUPPRESSION_WINDOW,
        }
    }

    /// Set the pod view.
    pub fn with_store(mut self, store: Arc<dyn PodStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the action sink.
    pub fn with_deleter(mut self, deleter: Arc<dyn PodDeleter>) -> Self {
        self.deleter = Some(deleter);
        self
    }

    /// Use a specific suppression cache instead of an [`ExpiringSet`].
    pub fn with_cache(mut self, cache: Arc<dyn SuppressionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn OutcomeRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Share the trigger index with an [`EventIngestor`].
    ///
    /// [`EventIngestor`]: crate::ingest::EventIngestor
    pub fn with_triggers(mut self, triggers: Arc<TriggerIndex>) -> Self {
        self.triggers = Some(triggers);
        self
    }

    pub fn with_eligibility(mut self, eligibility: Arc<dyn Eligibility>) -> Self {
        self.eligibility = eligibility;
        self
    }

    pub fn suppression_policy(mut self, policy: SuppressionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Window for the default cache. Ignored when a cache is supplied.
    pub fn suppression_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Build the reconciler.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` when the store or deleter is missing, or
    /// the suppression window is zero.
    pub fn build(self) -> Result<Reconciler> {
        let store = self
            .store
            .ok_or_else(|| Error::invalid_config("Pod store is required"))?;
        let deleter = self
            .deleter
            .ok_or_else(|| Error::invalid_config("Pod deleter is required"))?;

        let cache = match self.cache {
            Some(cache) => cache,
            None if self.window.is_zero() => {
                return Err(Error::invalid_config("Suppression window must be positive"));
            }
            None => Arc::new(ExpiringSet::new(self.window)),
        };

        Ok(Reconciler {
            store,
            deleter,
            cache,
            recorder: self
                .recorder
                .unwrap_or_else(|| Arc::new(MetricsRecorder::new())),
            triggers: self.triggers.unwrap_or_default(),
            eligibility: self.eligibility,
            policy: self.policy,
        })
    }
}

impl Default for ReconcilerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
