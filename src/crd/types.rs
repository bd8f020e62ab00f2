//! Types embedded in the OpenSearchCluster spec and status

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Cluster-wide settings shared by every node pool
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeneralConfig {
    /// Name of the service exposing the HTTP endpoint
    pub service_name: String,

    /// OpenSearch version to run (e.g. "2.11.0")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// HTTP port of the REST API
    #[serde(default = "default_http_port")]
    pub http_port: i32,
}

fn default_http_port() -> i32 {
    9200
}

/// A group of identically configured OpenSearch nodes
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodePool {
    /// Pool name, used as the StatefulSet name suffix
    pub component: String,

    /// Number of nodes in the pool
    pub replicas: i32,

    /// Node roles (e.g. "master", "cluster_manager", "data", "ingest")
    #[serde(default)]
    pub roles: Vec<String>,

    /// Persistent volume size per node (e.g. "30Gi")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_size: Option<String>,
}

impl NodePool {
    /// Returns true if nodes in this pool are cluster-manager eligible.
    ///
    /// Older versions call the role "master", newer ones "cluster_manager";
    /// both spellings count.
    pub fn is_cluster_manager(&self) -> bool {
        self.roles
            .iter()
            .any(|r| r == "master" || r == "cluster_manager")
    }
}

/// TLS material settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TlsConfig {
    /// Let the operator generate certificates
    #[serde(default)]
    pub generate: bool,

    /// Secret holding user-provided certificates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

/// Security plugin settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecurityConfig {
    /// Transport/HTTP TLS settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,

    /// Secret with the securityconfig YAML files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_secret: Option<String>,

    /// Secret with the admin credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_credentials_secret: Option<String>,
}

/// Dashboards deployment settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardsConfig {
    /// Deploy OpenSearch Dashboards alongside the cluster
    #[serde(default)]
    pub enable: bool,

    /// Number of dashboards replicas
    #[serde(default = "default_dashboards_replicas")]
    pub replicas: i32,

    /// Dashboards version, defaults to the cluster version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

fn default_dashboards_replicas() -> i32 {
    1
}

/// Last known condition of one pipeline unit.
///
/// Written by the unit itself; the controller only creates and clears the list.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    /// Unit that owns this record (e.g. "Scaler", "Upgrader")
    pub component: String,

    /// Short machine-readable state
    #[serde(default)]
    pub status: String,

    /// Human-readable details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Free-form condition entries
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<String>,
}

/// Lifecycle phase of an OpenSearchCluster.
///
/// Transitions only go `Pending -> Running`. Values written by other parties
/// that this controller does not model are kept as [`ClusterPhase::Unknown`]
/// so that dispatch stays total.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClusterPhase {
    /// Accepted but not yet set up
    Pending,
    /// Set up; the component pipeline runs on every pass
    Running,
    /// Any other persisted value
    Unknown(String),
}

impl ClusterPhase {
    /// Parse a persisted phase name
    pub fn parse(raw: &str) -> Self {
        match raw {
            "PENDING" | "Pending" => Self::Pending,
            "RUNNING" | "Running" => Self::Running,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Name written to `status.phase`
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Unknown(raw) => raw,
        }
    }

    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: &ClusterPhase) -> bool {
        matches!((self, next), (Self::Pending, Self::Running))
    }
}

impl std::fmt::Display for ClusterPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ClusterPhase {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ClusterPhase {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// Deserialize `status.phase`, treating an empty string the same as absent
pub(crate) fn deserialize_phase<'de, D>(deserializer: D) -> Result<Option<ClusterPhase>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .filter(|s| !s.is_empty())
        .map(|s| ClusterPhase::parse(&s)))
}
