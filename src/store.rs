//! Access to stored OpenSearchCluster objects
//!
//! The store is eventually consistent and optimistically concurrent: every
//! object carries a `resourceVersion`, and a write only succeeds if that
//! version still matches. Losing writes surface as [`Error::Conflict`].

use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, ResourceExt};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::crd::OpenSearchCluster;
use crate::Error;

/// Identity of one OpenSearchCluster; the only payload of a reconcile request
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    /// Namespace of the object
    pub namespace: String,
    /// Name of the object
    pub name: String,
}

impl ObjectKey {
    /// Create a key from namespace and name
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of an existing object
    pub fn from_cluster(cluster: &OpenSearchCluster) -> Self {
        Self::new(cluster.namespace().unwrap_or_default(), cluster.name_any())
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Trait abstracting store operations on OpenSearchCluster
///
/// This trait allows mocking the Kubernetes client in tests while using
/// the real client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Get the current object, `None` if it does not exist
    async fn get(&self, key: &ObjectKey) -> Result<Option<OpenSearchCluster>, Error>;

    /// Write the finalizer list. Spec and status are left untouched.
    ///
    /// Fails with [`Error::Conflict`] if `cluster` carries a stale resourceVersion.
    async fn update(&self, cluster: &OpenSearchCluster) -> Result<OpenSearchCluster, Error>;

    /// Write the status subresource.
    ///
    /// Fails with [`Error::Conflict`] if `cluster` carries a stale resourceVersion.
    async fn update_status(&self, cluster: &OpenSearchCluster)
        -> Result<OpenSearchCluster, Error>;
}

/// Production store backed by the Kubernetes API
pub struct KubeClusterStore {
    client: Client,
}

impl KubeClusterStore {
    /// Create a new store with the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<OpenSearchCluster> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Merge patch replacing `metadata.finalizers` and nothing else.
///
/// An empty list is sent as `[]` so the last finalizer is really removed.
/// resourceVersion in a merge patch makes the API server reject stale writes.
fn finalizers_patch(cluster: &OpenSearchCluster) -> serde_json::Value {
    serde_json::json!({
        "metadata": {
            "resourceVersion": cluster.resource_version(),
            "finalizers": cluster.finalizers(),
        },
    })
}

fn status_patch(cluster: &OpenSearchCluster) -> serde_json::Value {
    serde_json::json!({
        "metadata": {
            "resourceVersion": cluster.resource_version(),
        },
        "status": cluster.status.clone().unwrap_or_default(),
    })
}

/// Map a write failure, turning HTTP 409 into a conflict
fn map_write_error(name: &str, err: kube::Error) -> Error {
    match err {
        kube::Error::Api(ae) if ae.code == 409 => Error::conflict(name, ae.message),
        other => other.into(),
    }
}

#[async_trait]
impl ClusterStore for KubeClusterStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<OpenSearchCluster>, Error> {
        Ok(self.api(&key.namespace).get_opt(&key.name).await?)
    }

    async fn update(&self, cluster: &OpenSearchCluster) -> Result<OpenSearchCluster, Error> {
        let key = ObjectKey::from_cluster(cluster);
        debug!(cluster = %key, "patching finalizers");
        self.api(&key.namespace)
            .patch(
                &key.name,
                &PatchParams::default(),
                &Patch::Merge(&finalizers_patch(cluster)),
            )
            .await
            .map_err(|e| map_write_error(&key.name, e))
    }

    async fn update_status(
        &self,
        cluster: &OpenSearchCluster,
    ) -> Result<OpenSearchCluster, Error> {
        let key = ObjectKey::from_cluster(cluster);
        debug!(cluster = %key, "patching status");
        self.api(&key.namespace)
            .patch_status(
                &key.name,
                &PatchParams::default(),
                &Patch::Merge(&status_patch(cluster)),
            )
            .await
            .map_err(|e| map_write_error(&key.name, e))
    }
}
