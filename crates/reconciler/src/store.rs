//! Collaborator seams: the read-only pod view and the action sink.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use pvwatch_core::{ObjectKey, Pod};

use crate::error::Result;

/// Point-lookup view of pods, eventually consistent with the cluster.
pub trait PodStore: Send + Sync {
    /// Last known state of the pod, if present in the view.
    fn get(&self, namespace: &str, name: &str) -> Option<Pod>;

    /// Whether the initial synchronization has completed.
    fn has_synced(&self) -> bool;
}

/// Deletes pods.
#[async_trait]
pub trait PodDeleter: Send + Sync {
    /// Delete the pod. Any error is treated as retryable.
    async fn delete(&self, namespace: &str, name: &str) -> Result<()>;
}

/// Pod view held in memory and fed by a relister or by tests.
#[derive(Debug, Default)]
pub struct InMemoryPodStore {
    pods: RwLock<HashMap<ObjectKey, Pod>>,
    synced: AtomicBool,
}

impl InMemoryPodStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store populated with `pods` and already marked synced.
    #[must_use]
    pub fn with_pods(pods: impl IntoIterator<Item = Pod>) -> Self {
        let store = Self::new();
        store.replace(pods);
        store
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ObjectKey, Pod>> {
        self.pods.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ObjectKey, Pod>> {
        self.pods.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Swap the whole view for `pods` and mark the store synced. Pods without
    /// a name are ignored.
    pub fn replace(&self, pods: impl IntoIterator<Item = Pod>) {
        let fresh: HashMap<ObjectKey, Pod> = pods
            .into_iter()
            .filter_map(|pod| pod.metadata.key("Pod").ok().map(|key| (key, pod)))
            .collect();
        *self.write() = fresh;
        self.synced.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PodStore for InMemoryPodStore {
    fn get(&self, namespace: &str, name: &str) -> Option<Pod> {
        self.read().get(&ObjectKey::new(namespace, name)).cloned()
    }

    fn has_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use pvwatch_core::PodPhase;

    use super::*;

    #[test]
    fn test_store_starts_unsynced() {
        let store = InMemoryPodStore::new();
        assert!(!store.has_synced());
        assert!(store.get("default", "web-0").is_none());
    }

    #[test]
    fn test_replace_marks_synced_and_drops_stale() {
        let store = InMemoryPodStore::with_pods([Pod::new("a", "old", PodPhase::Running)]);
        store.replace([Pod::new("a", "new", PodPhase::Pending)]);

        assert!(store.has_synced());
        assert!(store.get("a", "old").is_none());
        assert_eq!(
            store.get("a", "new").map(|p| p.phase()),
            Some(PodPhase::Pending)
        );
    }

    #[test]
    fn test_unnamed_pods_are_skipped() {
        let store = InMemoryPodStore::with_pods([
            Pod::new("a", "", PodPhase::Pending),
            Pod::new("a", "p", PodPhase::Pending),
        ]);

        assert_eq!(store.len(), 1);
        assert!(store.get("a", "p").is_some());
    }
}
