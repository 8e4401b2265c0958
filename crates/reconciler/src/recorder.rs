//! Outcome recording.
//!
//! The reconciler and ingestor report every classified outcome to an injected
//! [`OutcomeRecorder`]. Production uses [`MetricsRecorder`], which feeds the
//! `metrics` facade; tests use [`MemoryRecorder`] and assert on what was seen.

use std::sync::{Mutex, MutexGuard, PoisonError};

use metrics::{counter, describe_counter};

use crate::types::{Classification, Outcome};

/// Counter incremented once per outcome.
pub const OUTCOME_COUNTER: &str = "pvwatch_count";

/// Sink for classified outcomes.
pub trait OutcomeRecorder: Send + Sync {
    fn record(&self, outcome: Outcome);
}

/// Records outcomes as `pvwatch_count{event, msg, pod, node, err}`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    /// Register the counter description with the installed recorder.
    #[must_use]
    pub fn new() -> Self {
        describe_counter!(OUTCOME_COUNTER, "Count of pvwatch processed events");
        Self
    }
}

impl OutcomeRecorder for MetricsRecorder {
    fn record(&self, outcome: Outcome) {
        counter!(
            OUTCOME_COUNTER,
            "event" => outcome.event,
            "msg" => outcome.classification.as_str(),
            "pod" => outcome.pod,
            "node" => outcome.node,
            "err" => outcome.error
        )
        .increment(1);
    }
}

/// Keeps every outcome in memory.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    outcomes: Mutex<Vec<Outcome>>,
}

impl MemoryRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn outcomes(&self) -> MutexGuard<'_, Vec<Outcome>> {
        self.outcomes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of everything recorded so far.
    #[must_use]
    pub fn all(&self) -> Vec<Outcome> {
        self.outcomes().clone()
    }

    /// Classifications in the order they were recorded.
    #[must_use]
    pub fn classifications(&self) -> Vec<Classification> {
        self.outcomes()
            .iter()
            .map(|outcome| outcome.classification)
            .collect()
    }

    /// How many outcomes carried `classification`.
    #[must_use]
    pub fn count(&self, classification: Classification) -> usize {
        self.outcomes()
            .iter()
            .filter(|outcome| outcome.classification == classification)
            .count()
    }

    #[must_use]
    pub fn last(&self) -> Option<Outcome> {
        self.outcomes().last().cloned()
    }
}

impl OutcomeRecorder for MemoryRecorder {
    fn record(&self, outcome: Outcome) {
        self.outcomes().push(outcome);
    }
}
