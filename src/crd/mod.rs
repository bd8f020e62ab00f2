//! Custom Resource Definitions for the OpenSearch operator
//!
//! This module contains the `OpenSearchCluster` CRD and the types it embeds.

mod cluster;
mod types;

pub use cluster::{OpenSearchCluster, OpenSearchClusterSpec, OpenSearchClusterStatus};
pub use types::{
    ClusterPhase, ComponentStatus, DashboardsConfig, GeneralConfig, NodePool, SecurityConfig,
    TlsConfig,
};
