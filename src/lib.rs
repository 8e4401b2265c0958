#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # pvwatch
//!
//! Watches Kubernetes events for Cinder volume attaches that returned an
//! empty device path and deletes the affected Pending pods, at most once per
//! suppression window.
//!
//! The reconciliation core lives in `pvwatch-reconciler`; this crate wires it
//! to the API server, configuration and the metrics endpoint.

pub mod cli;
pub mod config;
pub mod informer;
pub mod kube;
pub mod metrics;

pub use pvwatch_core;
pub use pvwatch_reconciler;
pub use pvwatch_workqueue;
