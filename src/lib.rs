//! OpenSearch Operator - reconciliation engine for OpenSearchCluster resources
//!
//! Drives every OpenSearchCluster object toward its declared state: a finalizer
//! guards deletion until child resources are torn down, a forward-only phase
//! machine moves new objects to Running, and a fixed pipeline of units
//! converges child resources on every pass.
//!
//! # Modules
//!
//! - [`crd`] - OpenSearchCluster custom resource definition
//! - [`controller`] - Reconcile entry point, finalizer protocol, conflict-safe writes
//! - [`phases`] - Phase handlers (Pending, Running)
//! - [`components`] - Pipeline units and the sequential pipeline runner
//! - [`store`] - Object store abstraction over the Kubernetes API
//! - [`readiness`] - Cluster-manager readiness check
//! - [`retry`] - Conflict retry with bounded backoff
//! - [`requeue`] - Reconcile results and requeue policy
//! - [`events`] - Kubernetes Event publishing
//! - [`controller_runner`] - kube-runtime controller wiring
//! - [`config`] - Operator flags and environment variables
//! - [`telemetry`] - Logging setup
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod components;
pub mod config;
pub mod controller;
pub mod controller_runner;
pub mod crd;
pub mod error;
pub mod events;
pub mod phases;
pub mod readiness;
pub mod requeue;
pub mod retry;
pub mod store;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
