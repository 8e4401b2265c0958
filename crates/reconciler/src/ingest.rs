//! Event ingestion: note predicate, key derivation, enqueue.

use std::sync::Arc;

use pvwatch_core::Event;
use pvwatch_workqueue::WorkQueue;
use tracing::{debug, info, warn};

use crate::policy::NotePattern;
use crate::recorder::OutcomeRecorder;
use crate::triggers::TriggerIndex;
use crate::types::{Classification, Outcome};

/// What happened to one event notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ingested {
    /// The regarding pod key was handed to the queue.
    Enqueued(String),
    /// The event was dropped without enqueueing anything.
    Skipped(Classification),
}

/// Turns event notifications into queued pod keys.
pub struct EventIngestor {
    queue: Arc<WorkQueue<String>>,
    pattern: NotePattern,
    triggers: Arc<TriggerIndex>,
    recorder: Arc<dyn OutcomeRecorder>,
}

impl EventIngestor {
    pub fn new(
        queue: Arc<WorkQueue<String>>,
        pattern: NotePattern,
        triggers: Arc<TriggerIndex>,
        recorder: Arc<dyn OutcomeRecorder>,
    ) -> Self {
        Self {
            queue,
            pattern,
            triggers,
            recorder,
        }
    }

    /// Handle a newly observed event.
    pub fn on_add(&self, event: &Event) -> Ingested {
        self.ingest(event)
    }

    /// Handle an updated event. Only the new state matters; an unchanged
    /// resync is ingested again and coalesced by the queue.
    pub fn on_update(&self, _old: &Event, new: &Event) -> Ingested {
        self.ingest(new)
    }

    fn ingest(&self, event: &Event) -> Ingested {
        let event_key = event
            .metadata
            .key("Event")
            .map(|key| key.to_string())
            .unwrap_or_default();
        debug!(event = %event_key, "Processing event");

        if !self.pattern.is_match(&event.note) {
            debug!(event = %event_key, note = %event.note, "Event note doesn't match");
            return self.skip(event_key, Classification::EventMismatch, "");
        }

        let pod_key = match event.regarding_key() {
            Ok(key) => key.to_string(),
            Err(e) => {
                warn!(event = %event_key, error = %e, "Dropping event without a usable regarding reference");
                return self.skip(event_key, Classification::MalformedEvent, &e.to_string());
            }
        };

        info!(event = %event_key, pod = %pod_key, "Enqueueing pod for matching event");
        self.triggers.record(&pod_key, &event_key);
        self.queue.add(pod_key.clone());
        Ingested::Enqueued(pod_key)
    }

    fn skip(&self, event_key: String, classification: Classification, error: &str) -> Ingested {
        self.recorder
            .record(Outcome::new(event_key, classification).with_error(error));
        Ingested::Skipped(classification)
    }
}
