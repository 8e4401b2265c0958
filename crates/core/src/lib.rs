//! # pvwatch core
//!
//! Shared error type, object keys and the subset of the Kubernetes object
//! model the controller reads.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod key;
pub mod objects;
pub mod result;

pub use error::Error;
pub use key::ObjectKey;
pub use objects::{Event, ObjectList, ObjectMeta, ObjectReference, Pod, PodPhase, PodSpec, PodStatus};
pub use result::{Result, ResultExt};
