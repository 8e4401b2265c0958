//! Rate limiters that decide how long a failed key waits before redelivery.

use std::collections::HashMap;
use std::hash::Hash;
use std::num::NonZeroU32;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use governor::clock::{Clock, DefaultClock};
use governor::{DefaultDirectRateLimiter, Quota};

/// Base delay of the default per-key exponential limiter.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(5);

/// Ceiling of the default per-key exponential limiter.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(1000);

/// Sustained rate of the default overall bucket limiter.
pub const DEFAULT_BUCKET_QPS: u32 = 10;

/// Burst of the default overall bucket limiter.
pub const DEFAULT_BUCKET_BURST: u32 = 100;

/// Decides the redelivery delay for a key.
pub trait RateLimiter<K>: Send + Sync {
    /// Delay before `key` may be delivered again. Records one more failure.
    fn when(&self, key: &K) -> Duration;

    /// Stop tracking `key`; its next failure starts from the base delay.
    fn forget(&self, key: &K);

    /// Number of failures recorded for `key` since the last `forget`.
    fn num_requeues(&self, key: &K) -> u32;
}

/// Per-key exponential backoff: `base * 2^failures`, capped at `max`.
pub struct ItemExponentialFailureRateLimiter<K> {
    failures: Mutex<HashMap<K, u32>>,
    base: Duration,
    max: Duration,
}

impl<K> ItemExponentialFailureRateLimiter<K> {
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            failures: Mutex::new(HashMap::new()),
            base,
            max,
        }
    }

    fn failures(&self) -> MutexGuard<'_, HashMap<K, u32>> {
        self.failures.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Delay for a key that has already failed `exp` times.
    fn backoff(&self, exp: u32) -> Duration {
        1u32.checked_shl(exp)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

impl<K> Default for ItemExponentialFailureRateLimiter<K> {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}

impl<K> RateLimiter<K> for ItemExponentialFailureRateLimiter<K>
where
    K: Eq + Hash + Clone + Send + Sync,
{
    fn when(&self, key: &K) -> Duration {
        let mut failures = self.failures();
        let count = failures.entry(key.clone()).or_insert(0);
        let exp = *count;
        *count = count.saturating_add(1);
        self.backoff(exp)
    }

    fn forget(&self, key: &K) {
        self.failures().remove(key);
    }

    fn num_requeues(&self, key: &K) -> u32 {
        self.failures().get(key).copied().unwrap_or(0)
    }
}

/// Overall token bucket shared by every key.
///
/// Once the bucket is empty every caller reserves the next free slot, so
/// retries are spread one refill interval apart instead of firing together.
/// Keys are not tracked, so `forget` is a no-op and `num_requeues` is zero.
pub struct BucketRateLimiter {
    limiter: DefaultDirectRateLimiter,
    clock: DefaultClock,
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl BucketRateLimiter {
    /// Bucket refilling at `qps` tokens per second holding up to `burst`.
    /// Zero values are raised to one.
    #[must_use]
    pub fn new(qps: u32, burst: u32) -> Self {
        let qps = NonZeroU32::new(qps).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: governor::RateLimiter::direct(Quota::per_second(qps).allow_burst(burst)),
            clock: DefaultClock::default(),
            interval: Duration::from_secs(1)
                .checked_div(qps.get())
                .unwrap_or(Duration::ZERO),
            next_slot: Mutex::new(None),
        }
    }

    fn next_slot(&self) -> MutexGuard<'_, Option<Instant>> {
        self.next_slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for BucketRateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_BUCKET_QPS, DEFAULT_BUCKET_BURST)
    }
}

impl<K> RateLimiter<K> for BucketRateLimiter {
    fn when(&self, _key: &K) -> Duration {
        let wait = match self.limiter.check() {
            Ok(()) => return Duration::ZERO,
            Err(not_until) => not_until.wait_time_from(self.clock.now()),
        };
        let now = Instant::now();
        let earliest = now.checked_add(wait).unwrap_or(now);

        let mut next_slot = self.next_slot();
        let slot = next_slot
            .filter(|reserved| *reserved > earliest)
            .unwrap_or(earliest);
        *next_slot = slot.checked_add(self.interval);
        slot.saturating_duration_since(now)
    }

    fn forget(&self, _key: &K) {}

    fn num_requeues(&self, _key: &K) -> u32 {
        0
    }
}

/// Combines limiters: the longest delay and the highest requeue count win.
pub struct MaxOfRateLimiter<K> {
    limiters: Vec<Box<dyn RateLimiter<K>>>,
}

impl<K> MaxOfRateLimiter<K> {
    #[must_use]
    pub fn new(limiters: Vec<Box<dyn RateLimiter<K>>>) -> Self {
        Self { limiters }
    }
}

impl<K> RateLimiter<K> for MaxOfRateLimiter<K> {
    fn when(&self, key: &K) -> Duration {
        // Every limiter must observe the failure, so no short-circuiting.
        self.limiters
            .iter()
            .map(|limiter| limiter.when(key))
            .fold(Duration::ZERO, Duration::max)
    }

    fn forget(&self, key: &K) {
        self.limiters.iter().for_each(|limiter| limiter.forget(key));
    }

    fn num_requeues(&self, key: &K) -> u32 {
        self.limiters
            .iter()
            .map(|limiter| limiter.num_requeues(key))
            .max()
            .unwrap_or(0)
    }
}

/// Per-key exponential backoff (5ms to 1000s) combined with an overall
/// 10 qps / 100 burst bucket.
#[must_use]
pub fn default_controller_rate_limiter<K>() -> MaxOfRateLimiter<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    MaxOfRateLimiter::new(vec![
        Box::new(ItemExponentialFailureRateLimiter::<K>::default()),
        Box::new(BucketRateLimiter::default()),
    ])
}

#[cfg(test)]
mod tests {
    #![allow(clippy::indexing_slicing)]
    #![allow(clippy::arithmetic_side_effects)]

    use super::*;

    #[test]
    fn test_exponential_doubles_per_failure() {
        let limiter = ItemExponentialFailureRateLimiter::new(
            Duration::from_millis(1),
            Duration::from_secs(1),
        );
        let key = "default/web-0";

        assert_eq!(limiter.when(&key), Duration::from_millis(1));
        assert_eq!(limiter.when(&key), Duration::from_millis(2));
        assert_eq!(limiter.when(&key), Duration::from_millis(4));
        assert_eq!(limiter.num_requeues(&key), 3);
    }

    #[test]
    fn test_exponential_caps_at_max() {
        let limiter = ItemExponentialFailureRateLimiter::new(
            Duration::from_millis(1),
            Duration::from_millis(10),
        );
        let delays: Vec<Duration> = (0..40).map(|_| limiter.when(&"k")).collect();

        assert_eq!(delays.last().copied(), Some(Duration::from_millis(10)));
        assert!(delays.iter().all(|d| *d <= Duration::from_millis(10)));
    }

    #[test]
    fn test_forget_resets_backoff() {
        let limiter = ItemExponentialFailureRateLimiter::<&str>::default();
        limiter.when(&"a");
        limiter.when(&"a");
        limiter.forget(&"a");

        assert_eq!(limiter.num_requeues(&"a"), 0);
        assert_eq!(limiter.when(&"a"), DEFAULT_BASE_DELAY);
    }

    #[test]
    fn test_keys_back_off_independently() {
        let limiter = ItemExponentialFailureRateLimiter::<&str>::default();
        limiter.when(&"a");
        limiter.when(&"a");

        assert_eq!(limiter.when(&"b"), DEFAULT_BASE_DELAY);
        assert_eq!(limiter.num_requeues(&"a"), 2);
        assert_eq!(limiter.num_requeues(&"b"), 1);
    }

    #[test]
    fn test_bucket_allows_burst_then_delays() {
        let limiter = BucketRateLimiter::new(1, 3);
        let delays: Vec<Duration> = (0..4)
            .map(|_| RateLimiter::<&str>::when(&limiter, &"k"))
            .collect();

        assert_eq!(&delays[..3], &[Duration::ZERO; 3]);
        assert!(delays[3] > Duration::ZERO);
    }

    #[test]
    fn test_bucket_spreads_callers_once_empty() {
        let limiter = BucketRateLimiter::new(1, 1);
        let delays: Vec<Duration> = (0..4)
            .map(|_| RateLimiter::<&str>::when(&limiter, &"k"))
            .collect();

        assert_eq!(delays[0], Duration::ZERO);
        assert!(delays[2] >= delays[1] + Duration::from_millis(900));
        assert!(delays[3] >= delays[2] + Duration::from_millis(900));
    }

    #[test]
    fn test_max_of_takes_longest_delay() {
        let limiter: MaxOfRateLimiter<&str> = MaxOfRateLimiter::new(vec![
            Box::new(ItemExponentialFailureRateLimiter::new(
                Duration::from_millis(1),
                Duration::from_secs(1),
            )),
            Box::new(ItemExponentialFailureRateLimiter::new(
                Duration::from_millis(3),
                Duration::from_secs(1),
            )),
        ]);

        assert_eq!(limiter.when(&"k"), Duration::from_millis(3));
        assert_eq!(limiter.when(&"k"), Duration::from_millis(6));
        assert_eq!(limiter.num_requeues(&"k"), 2);

        limiter.forget(&"k");
        assert_eq!(limiter.num_requeues(&"k"), 0);
    }

    #[test]
    fn test_default_controller_limiter_starts_at_base() {
        let limiter = default_controller_rate_limiter::<String>();
        assert_eq!(limiter.when(&"a".to_string()), DEFAULT_BASE_DELAY);
    }
}
