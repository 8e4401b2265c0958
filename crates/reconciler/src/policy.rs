//! Swappable policy: which events matter and which pods warrant deletion.

use pvwatch_core::{Pod, PodPhase};
use regex::Regex;

use crate::error::{Error, Result};

/// Note emitted by the kubelet when a Cinder attach returns no device path.
pub const DEFAULT_NOTE_PATTERN: &str = "WaitForAttach failed for Cinder disk.*devicePath is empty";

/// Content predicate over an event's note.
#[derive(Debug, Clone)]
pub struct NotePattern {
    regex: Regex,
}

impl NotePattern {
    /// Compile `pattern`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if the pattern is not a valid regex.
    pub fn new(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(|regex| Self { regex })
            .map_err(|e| Error::invalid_config(format!("invalid note pattern '{pattern}': {e}")))
    }

    #[must_use]
    pub fn is_match(&self, note: &str) -> bool {
        self.regex.is_match(note)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

/// Decides whether a pod's current state warrants the corrective action.
pub trait Eligibility: Send + Sync {
    fn is_eligible(&self, pod: &Pod) -> bool;
}

/// Eligible while the pod is in one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseEligibility {
    phase: PodPhase,
}

impl PhaseEligibility {
    #[must_use]
    pub const fn new(phase: PodPhase) -> Self {
        Self { phase }
    }

    #[must_use]
    pub const fn pending() -> Self {
        Self::new(PodPhase::Pending)
    }
}

impl Default for PhaseEligibility {
    fn default() -> Self {
        Self::pending()
    }
}

impl Eligibility for PhaseEligibility {
    fn is_eligible(&self, pod: &Pod) -> bool {
        pod.phase() == self.phase
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_default_pattern_matches_cinder_note() {
        let pattern = NotePattern::new(DEFAULT_NOTE_PATTERN).unwrap();
        assert!(pattern.is_match(
            "AttachVolume.WaitForAttach failed for Cinder disk \"6f1c\": devicePath is empty"
        ));
        assert!(!pattern.is_match("Successfully assigned default/web-0 to node-a"));
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        assert!(matches!(
            NotePattern::new("(unclosed"),
            Err(Error::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_pending_eligibility() {
        let policy = PhaseEligibility::pending();
        assert!(policy.is_eligible(&Pod::new("a", "p", PodPhase::Pending)));
        assert!(!policy.is_eligible(&Pod::new("a", "p", PodPhase::Running)));
    }
}
