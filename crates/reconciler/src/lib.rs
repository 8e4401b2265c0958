//! Event-driven reconciliation loop for stuck pods.
//!
//! This crate implements a controller in the Kubernetes style:
//!
//! - **Ingest**: events whose note matches a pattern enqueue the pod they
//!   concern
//! - **Queue**: keys are deduplicated and retried with per-key backoff
//! - **Reconcile**: each key is resolved against a local pod view and, if
//!   still eligible, the pod is deleted
//! - **Suppress**: a pod is deleted at most once per suppression window
//!
//! # Key Concepts
//!
//! ## Outcomes
//!
//! Every ingestion or reconciliation ends in a [`Classification`]. Only
//! `action_failed` is retried; everything else is terminal for the delivery.
//! Outcomes are reported to an injected [`OutcomeRecorder`].
//!
//! ## Suppression
//!
//! A [`SuppressionCache`] remembers which pods were acted on. The
//! [`SuppressionPolicy`] decides whether the entry is written before the
//! delete call or only after it succeeds.
//!
//! # Example
//!
//! ```ignore
//! use pvwatch_reconciler::{
//!     Controller, ControllerConfig, EventIngestor, InMemoryPodStore, NotePattern,
//!     Reconciler, TriggerIndex, DEFAULT_NOTE_PATTERN,
//! };
//! use pvwatch_workqueue::{WorkQueue, default_controller_rate_limiter};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! let queue = Arc::new(WorkQueue::new("pods", default_controller_rate_limiter()));
//! let store = Arc::new(InMemoryPodStore::new());
//! let triggers = Arc::new(TriggerIndex::new());
//! let reconciler = Reconciler::builder()
//!     .with_store(store.clone())
//!     .with_deleter(deleter)
//!     .with_triggers(triggers.clone())
//!     .build()?;
//! let ingestor = EventIngestor::new(
//!     queue.clone(),
//!     NotePattern::new(DEFAULT_NOTE_PATTERN)?,
//!     triggers,
//!     recorder,
//! );
//!
//! let controller = Controller::new(queue, store, Arc::new(reconciler), ControllerConfig::default());
//! controller.run(CancellationToken::new()).await?;
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod cache;
pub mod controller;
pub mod error;
pub mod ingest;
pub mod policy;
pub mod reconciler;
pub mod recorder;
pub mod store;
pub mod triggers;
pub mod types;
pub mod worker;

// Re-export main types
pub use cache::{ExpiringSet, MokaSuppressionCache, SuppressionCache, spawn_sweeper};
pub use controller::{Controller, ControllerConfig, wait_for_sync};
pub use error::{Error, Result};
pub use ingest::{EventIngestor, Ingested};
pub use policy::{DEFAULT_NOTE_PATTERN, Eligibility, NotePattern, PhaseEligibility};
pub use reconciler::{DEFAULT_SUPPRESSION_WINDOW, Reconciler, ReconcilerBuilder};
pub use recorder::{MemoryRecorder, MetricsRecorder, OUTCOME_COUNTER, OutcomeRecorder};
pub use store::{InMemoryPodStore, PodDeleter, PodStore};
pub use triggers::TriggerIndex;
pub use types::{Classification, Outcome, SuppressionPolicy};
pub use worker::{Reconcile, WorkerPool, process_next};
