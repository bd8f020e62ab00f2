//! Cluster readiness check
//!
//! A cluster counts as initialized once every cluster-manager-eligible node
//! pool has all of its replicas ready. The check never fails: anything it
//! cannot determine is reported as "not ready" and re-checked on a later pass.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use kube::api::Api;
use kube::{Client, ResourceExt};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::crd::{NodePool, OpenSearchCluster};

/// Readiness predicate consumed by the Running phase
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// Returns true if all cluster-manager nodes are ready
    async fn all_masters_ready(&self, cluster: &OpenSearchCluster) -> bool;
}

/// Name of the StatefulSet backing a node pool
pub fn statefulset_name(cluster: &OpenSearchCluster, pool: &NodePool) -> String {
    format!("{}-{}", cluster.name_any(), pool.component)
}

/// Returns true if a StatefulSet reports every desired replica ready.
///
/// A missing `spec.replicas` means one replica, the Kubernetes default.
pub fn statefulset_ready(sts: &StatefulSet) -> bool {
    let desired = sts.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
    let ready = sts
        .status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0);
    ready == desired
}

/// Production probe reading StatefulSets from the Kubernetes API
pub struct KubeReadinessProbe {
    client: Client,
}

impl KubeReadinessProbe {
    /// Create a new probe with the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReadinessProbe for KubeReadinessProbe {
    async fn all_masters_ready(&self, cluster: &OpenSearchCluster) -> bool {
        let namespace = cluster.namespace().unwrap_or_default();
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), &namespace);

        for pool in cluster
            .spec
            .node_pools
            .iter()
            .filter(|p| p.is_cluster_manager())
        {
            let name = statefulset_name(cluster, pool);
            match api.get_opt(&name).await {
                Ok(Some(sts)) if statefulset_ready(&sts) => {}
                Ok(Some(_)) => {
                    debug!(statefulset = %name, "cluster-manager pool not ready yet");
                    return false;
                }
                Ok(None) => {
                    debug!(statefulset = %name, "cluster-manager StatefulSet not created yet");
                    return false;
                }
                Err(e) => {
                    debug!(statefulset = %name, error = %e, "failed to read StatefulSet, assuming not ready");
                    return false;
                }
            }
        }

        true
    }
}
