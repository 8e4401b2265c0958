//! Deduplicating, rate-limited work queue.
//!
//! Keys move through three sets:
//!
//! - `dirty`: keys that need processing (at most one pending entry each)
//! - `processing`: keys currently held by a consumer
//! - `waiting`: keys scheduled for a later ready time
//!
//! A key that is re-added while in `processing` stays only in `dirty` and is
//! put back on the ready queue by [`WorkQueue::done`].

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::rate_limiter::RateLimiter;

/// Longest delay handed to the timer (about 30 years). Longer delays are
/// clamped to it.
pub const MAX_DEADLINE_DELAY: Duration = Duration::from_secs(946_080_000);

/// `now + delay`, clamped instead of overflowing.
#[must_use]
pub fn deadline_after(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay.min(MAX_DEADLINE_DELAY)).unwrap_or(now)
}

/// A key scheduled for a later ready time.
///
/// Ordered by `(ready_at, seq)` so keys ready at the same instant keep their
/// arrival order.
struct Waiting<K> {
    ready_at: Instant,
    seq: u64,
    key: K,
}

impl<K> PartialEq for Waiting<K> {
    fn eq(&self, other: &Self) -> bool {
        self.ready_at == other.ready_at && self.seq == other.seq
    }
}

impl<K> Eq for Waiting<K> {}

impl<K> PartialOrd for Waiting<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for Waiting<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.ready_at, self.seq).cmp(&(other.ready_at, other.seq))
    }
}

struct QueueState<K> {
    queue: VecDeque<K>,
    dirty: HashSet<K>,
    processing: HashSet<K>,
    waiting: BinaryHeap<Reverse<Waiting<K>>>,
    /// Earliest scheduled ready time per waiting key. Heap entries that do not
    /// match are stale and skipped.
    ready_at: HashMap<K, Instant>,
    seq: u64,
    shutting_down: bool,
}

impl<K> QueueState<K>
where
    K: Eq + Hash + Clone,
{
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            dirty: HashSet::new(),
            processing: HashSet::new(),
            waiting: BinaryHeap::new(),
            ready_at: HashMap::new(),
            seq: 0,
            shutting_down: false,
        }
    }

    /// Mark `key` dirty. Returns true when it landed on the ready queue.
    fn insert(&mut self, key: K) -> bool {
        if self.dirty.contains(&key) {
            return false;
        }
        self.dirty.insert(key.clone());
        if self.processing.contains(&key) {
            return false;
        }
        self.queue.push_back(key);
        true
    }

    /// Schedule `key` for `ready_at`, keeping the earlier time when the key
    /// is already waiting.
    fn schedule(&mut self, key: K, ready_at: Instant) {
        if self
            .ready_at
            .get(&key)
            .is_some_and(|existing| *existing <= ready_at)
        {
            return;
        }
        self.ready_at.insert(key.clone(), ready_at);
        self.waiting.push(Reverse(Waiting {
            ready_at,
            seq: self.seq,
            key,
        }));
        self.seq = self.seq.wrapping_add(1);
    }

    /// Move every waiting key whose ready time has passed onto the queue.
    fn promote_ready(&mut self, now: Instant) {
        while self
            .waiting
            .peek()
            .is_some_and(|Reverse(next)| next.ready_at <= now)
        {
            let Some(Reverse(entry)) = self.waiting.pop() else {
                break;
            };
            if self.ready_at.get(&entry.key) == Some(&entry.ready_at) {
                self.ready_at.remove(&entry.key);
                self.insert(entry.key);
            }
        }
    }

    fn next_ready_at(&self) -> Option<Instant> {
        self.waiting.peek().map(|Reverse(next)| next.ready_at)
    }
}

/// Keyed work queue with dedup, per-key exclusivity and failure backoff.
pub struct WorkQueue<K> {
    name: String,
    state: Mutex<QueueState<K>>,
    notify: Notify,
    limiter: Box<dyn RateLimiter<K>>,
}

impl<K> WorkQueue<K>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync,
{
    /// Create a queue named `name` (used in logs) backed by `limiter`.
    pub fn new(name: impl Into<String>, limiter: impl RateLimiter<K> + 'static) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(QueueState::new()),
            notify: Notify::new(),
            limiter: Box::new(limiter),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> MutexGuard<'_, QueueState<K>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue `key` for immediate delivery. A key that is already pending is
    /// coalesced; adds after shutdown are ignored.
    pub fn add(&self, key: K) {
        let queued = {
            let mut state = self.state();
            if state.shutting_down {
                return;
            }
            state.insert(key)
        };
        if queued {
            self.notify.notify_one();
        }
    }

    /// Enqueue `key` once `delay` has elapsed.
    pub fn add_after(&self, key: K, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }
        {
            let mut state = self.state();
            if state.shutting_down {
                return;
            }
            state.schedule(key, deadline_after(delay));
        }
        // Waiters recompute their deadline against the new head.
        self.notify.notify_waiters();
    }

    /// Enqueue `key` after the backoff its failure history calls for.
    pub fn add_rate_limited(&self, key: K) {
        let delay = self.limiter.when(&key);
        debug!(
            queue = %self.name,
            key = ?key,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Requeueing after failure"
        );
        self.add_after(key, delay);
    }

    /// Reset the failure history of `key`. Queue membership is untouched.
    pub fn forget(&self, key: &K) {
        self.limiter.forget(key);
    }

    /// Failures recorded for `key` since its last `forget`.
    pub fn num_requeues(&self, key: &K) -> u32 {
        self.limiter.num_requeues(key)
    }

    /// Wait for the next ready key. Returns `None` once the queue is shut down
    /// and every ready key has been handed out.
    pub async fn get(&self) -> Option<K> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before inspecting state so a concurrent add or
            // shutdown cannot slip between the check and the wait.
            notified.as_mut().enable();

            let deadline = {
                let mut state = self.state();
                state.promote_ready(Instant::now());
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    if !state.queue.is_empty() {
                        self.notify.notify_one();
                    }
                    return Some(key);
                }
                if state.shutting_down {
                    return None;
                }
                state.next_ready_at()
            };

            match deadline {
                Some(deadline) => {
                    tokio::select! {
                        () = notified.as_mut() => {}
                        () = tokio::time::sleep_until(deadline) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Release `key` after processing. If it was re-added meanwhile it goes
    /// straight back on the ready queue.
    pub fn done(&self, key: &K) {
        let requeued = {
            let mut state = self.state();
            state.processing.remove(key);
            if state.dirty.contains(key) {
                state.queue.push_back(key.clone());
                true
            } else {
                false
            }
        };
        if requeued {
            self.notify.notify_one();
        }
    }

    /// Stop delivering. Waiting keys are dropped; ready keys are still drained.
    pub fn shut_down(&self) {
        {
            let mut state = self.state();
            if state.shutting_down {
                return;
            }
            state.shutting_down = true;
            state.waiting.clear();
            state.ready_at.clear();
        }
        info!(queue = %self.name, "Work queue shutting down");
        self.notify.notify_waiters();
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.state().shutting_down
    }

    /// Number of keys ready for delivery.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state().queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of keys scheduled for later delivery.
    #[must_use]
    pub fn waiting_len(&self) -> usize {
        self.state().ready_at.len()
    }
}
