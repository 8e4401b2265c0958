//! Core types for the reconciler.

use std::fmt;

/// How a single ingestion or reconciliation ended.
///
/// Every variant except `ActionFailed` is terminal for the delivery: the key
/// is forgotten and not retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// The event note did not match the pattern; dropped before enqueueing.
    EventMismatch,
    /// The event carried no usable regarding reference.
    MalformedEvent,
    /// The queued key could not be split into namespace and name.
    MalformedKey,
    /// The pod is not in the local view.
    EntityNotFound,
    /// The pod is not in a phase that warrants deletion.
    EntityIneligible,
    /// The pod was acted on within the suppression window.
    AlreadySuppressed,
    /// The delete call failed; retried with backoff.
    ActionFailed,
    /// The pod was deleted.
    Ok,
}

impl Classification {
    /// Stable label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EventMismatch => "event_mismatch",
            Self::MalformedEvent => "malformed_event",
            Self::MalformedKey => "malformed_key",
            Self::EntityNotFound => "entity_not_found",
            Self::EntityIneligible => "entity_ineligible",
            Self::AlreadySuppressed => "already_suppressed",
            Self::ActionFailed => "action_failed",
            Self::Ok => "ok",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One classified outcome, as reported to an [`OutcomeRecorder`].
///
/// [`OutcomeRecorder`]: crate::recorder::OutcomeRecorder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Key of the event that triggered the work, empty when unknown.
    pub event: String,
    pub classification: Classification,
    /// `namespace/name` of the pod, empty before the pod is resolved.
    pub pod: String,
    /// Node the pod is scheduled on, empty when unknown.
    pub node: String,
    /// Error text, empty on success.
    pub error: String,
}

impl Outcome {
    pub fn new(event: impl Into<String>, classification: Classification) -> Self {
        Self {
            event: event.into(),
            classification,
            pod: String::new(),
            node: String::new(),
            error: String::new(),
        }
    }

    #[must_use]
    pub fn with_pod(mut self, pod: impl Into<String>) -> Self {
        self.pod = pod.into();
        self
    }

    #[must_use]
    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.node = node.into();
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: impl fmt::Display) -> Self {
        self.error = error.to_string();
        self
    }
}

/// When the suppression entry is written relative to the delete call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SuppressionPolicy {
    /// Record before deleting. A failed delete stays suppressed until the
    /// window lapses, so retries short-circuit as `already_suppressed`.
    #[default]
    BeforeAction,
    /// Record only after a successful delete. A failed delete is retried
    /// with backoff until it succeeds.
    AfterSuccess,
}

impl SuppressionPolicy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BeforeAction => "before-action",
            Self::AfterSuccess => "after-success",
        }
    }
}

impl std::str::FromStr for SuppressionPolicy {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "before-action" => Ok(Self::BeforeAction),
            "after-success" => Ok(Self::AfterSuccess),
            other => Err(crate::Error::invalid_config(format!(
                "unknown suppression policy '{other}' (expected before-action or after-success)"
            ))),
        }
    }
}
