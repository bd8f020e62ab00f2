//! OpenSearchCluster Custom Resource Definition
//!
//! The OpenSearchCluster CRD describes the desired topology of an OpenSearch
//! deployment (node pools, security, dashboards). The controller owns only the
//! status and the finalizer list; everything in the spec belongs to the author
//! or to the pipeline units.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{
    deserialize_phase, ClusterPhase, ComponentStatus, DashboardsConfig, GeneralConfig, NodePool,
    SecurityConfig,
};

/// Specification for an OpenSearchCluster
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "opensearch.opster.io",
    version = "v1",
    kind = "OpenSearchCluster",
    plural = "opensearchclusters",
    shortname = "os",
    status = "OpenSearchClusterStatus",
    namespaced,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Initialized","type":"boolean","jsonPath":".status.initialized"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct OpenSearchClusterSpec {
    /// Cluster-wide settings
    pub general: GeneralConfig,

    /// Node pools, in the order the author declared them
    #[serde(default)]
    pub node_pools: Vec<NodePool>,

    /// Security plugin configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<SecurityConfig>,

    /// Dashboards configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dashboards: Option<DashboardsConfig>,
}

/// Status for an OpenSearchCluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OpenSearchClusterStatus {
    /// Lifecycle phase; absent until the controller first observes the object
    #[serde(
        default,
        deserialize_with = "deserialize_phase",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<String>")]
    pub phase: Option<ClusterPhase>,

    /// True once every cluster-manager pool reports all replicas ready
    #[serde(default)]
    pub initialized: bool,

    /// Per-unit status records, written by the pipeline units
    #[serde(default)]
    pub components_status: Vec<ComponentStatus>,
}

impl OpenSearchClusterStatus {
    /// Status for an object that has just entered Running
    pub fn running() -> Self {
        Self {
            phase: Some(ClusterPhase::Running),
            initialized: false,
            components_status: Vec::new(),
        }
    }
}

impl OpenSearchCluster {
    /// Current phase, `None` if never set
    pub fn phase(&self) -> Option<&ClusterPhase> {
        self.status.as_ref().and_then(|s| s.phase.as_ref())
    }

    /// Whether the readiness check has already succeeded
    pub fn is_initialized(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.initialized)
    }

    /// Whether deletion has been requested
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Mutable status, created empty if missing
    pub fn status_mut(&mut self) -> &mut OpenSearchClusterStatus {
        self.status.get_or_insert_with(Default::default)
    }
}
