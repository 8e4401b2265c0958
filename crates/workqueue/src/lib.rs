//! # Work queue
//!
//! A keyed work queue in the style of controller work queues:
//!
//! - **Dedup**: a key added while it is already pending is coalesced
//! - **Exclusivity**: a key handed out by [`WorkQueue::get`] is not handed out
//!   again until [`WorkQueue::done`] is called for it
//! - **Backoff**: [`WorkQueue::add_rate_limited`] delays redelivery using a
//!   [`RateLimiter`] that tracks consecutive failures per key
//! - **Shutdown**: [`WorkQueue::shut_down`] wakes every consumer; `get` drains
//!   ready keys and then returns `None`
//!
//! # Example
//!
//! ```ignore
//! use pvwatch_workqueue::{WorkQueue, default_controller_rate_limiter};
//!
//! let queue = WorkQueue::new("events", default_controller_rate_limiter());
//! queue.add("default/web-0".to_string());
//! while let Some(key) = queue.get().await {
//!     match sync(&key).await {
//!         Ok(()) => queue.forget(&key),
//!         Err(_) => queue.add_rate_limited(key.clone()),
//!     }
//!     queue.done(&key);
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod queue;
pub mod rate_limiter;

pub use queue::{MAX_DEADLINE_DELAY, WorkQueue, deadline_after};
pub use rate_limiter::{
    BucketRateLimiter, ItemExponentialFailureRateLimiter, MaxOfRateLimiter, RateLimiter,
    default_controller_rate_limiter,
};
