//! Suppression caches.
//!
//! A suppression cache remembers which keys were acted on recently. Expiry is
//! computed at lookup time from the stored timestamp, so [`contains`] is exact
//! whether or not a sweep has run. Sweeping only reclaims memory.
//!
//! [`contains`]: SuppressionCache::contains

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use pvwatch_workqueue::deadline_after;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Capability the reconciler needs from a suppression cache.
pub trait SuppressionCache: Send + Sync {
    /// Record that `key` was acted on now. Overwrites any earlier record.
    fn insert(&self, key: &str);

    /// Whether `key` was recorded within the suppression window.
    fn contains(&self, key: &str) -> bool;

    /// Drop expired entries. Returns how many were dropped, when known.
    fn purge_expired(&self) -> usize {
        0
    }
}

/// TTL-bounded set of keys behind a single exclusive lock.
#[derive(Debug)]
pub struct ExpiringSet {
    entries: Mutex<HashMap<String, Instant>>,
    ttl: Duration,
}

impl ExpiringSet {
    /// Create a set whose entries stay live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Instant>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_live(&self, inserted_at: Instant, now: Instant) -> bool {
        inserted_at
            .checked_add(self.ttl)
            .is_none_or(|expires_at| now < expires_at)
    }

    /// Remove `key` regardless of age.
    pub fn delete(&self, key: &str) {
        self.entries().remove(key);
    }

    /// Number of stored entries, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SuppressionCache for ExpiringSet {
    fn insert(&self, key: &str) {
        self.entries().insert(key.to_string(), Instant::now());
    }

    fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries()
            .get(key)
            .is_some_and(|inserted_at| self.is_live(*inserted_at, now))
    }

    fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, inserted_at| self.is_live(*inserted_at, now));
        before.saturating_sub(entries.len())
    }
}

/// Suppression cache backed by moka's TTL eviction.
pub struct MokaSuppressionCache {
    cache: moka::sync::Cache<String, ()>,
}

impl MokaSuppressionCache {
    /// Create a cache holding at most `max_capacity` keys for `ttl` each.
    #[must_use]
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        Self {
            cache: moka::sync::Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }
}

impl SuppressionCache for MokaSuppressionCache {
    fn insert(&self, key: &str) {
        self.cache.insert(key.to_string(), ());
    }

    fn contains(&self, key: &str) -> bool {
        self.cache.contains_key(key)
    }

    fn purge_expired(&self) -> usize {
        let before = self.cache.entry_count();
        self.cache.run_pending_tasks();
        usize::try_from(before.saturating_sub(self.cache.entry_count())).unwrap_or(usize::MAX)
    }
}

/// Run `cache.purge_expired()` every `interval` until `token` is cancelled.
pub fn spawn_sweeper(
    cache: Arc<dyn SuppressionCache>,
    interval: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(deadline_after(period), period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX),
            "Suppression cache sweeper started"
        );

        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = ticker.tick() => {
                    let evicted = cache.purge_expired();
                    debug!(evicted, "Swept suppression cache");
                }
            }
        }

        info!("Suppression cache sweeper stopped");
    })
}
