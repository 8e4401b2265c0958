//! Last triggering event per queued key.
//!
//! The queue carries pod keys only, so the event that caused a delivery is
//! remembered here for outcome reporting.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
pub struct TriggerIndex {
    events: Mutex<HashMap<String, String>>,
}

impl TriggerIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn events(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remember `event` as the latest trigger for `key`.
    pub fn record(&self, key: &str, event: &str) {
        self.events().insert(key.to_string(), event.to_string());
    }

    /// Latest trigger for `key`, empty when none was recorded.
    #[must_use]
    pub fn event_for(&self, key: &str) -> String {
        self.events().get(key).cloned().unwrap_or_default()
    }

    /// Drop the trigger once `key` reached a terminal outcome, but only while
    /// it is still `event`. A newer event recorded meanwhile is kept for the
    /// next delivery.
    pub fn clear_if(&self, key: &str, event: &str) -> bool {
        let mut events = self.events();
        if events.get(key).is_some_and(|current| current == event) {
            events.remove(key);
            return true;
        }
        false
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
