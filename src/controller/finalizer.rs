//! Finalizer handling and the teardown path.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use kube::Resource;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::mutation::{apply_read_modify_write, ReadModifyWrite, WriteTarget};
use super::Context;
use crate::components::{run_pipeline, PipelineOutcome, ReconcilerContext};
use crate::crd::OpenSearchCluster;
use crate::events::ClusterEvent;
use crate::requeue::ReconcileResult;
use crate::store::ObjectKey;
use crate::Error;

/// Finalizer guarding OpenSearchCluster deletion until teardown has run
pub const CLUSTER_FINALIZER: &str = "Opster";

/// Set-like view over an object's finalizer list.
///
/// The list keeps its order and any finalizers owned by other controllers.
pub struct FinalizerSet<'a> {
    names: &'a mut Option<Vec<String>>,
}

impl<'a> FinalizerSet<'a> {
    /// View the finalizers of `cluster`
    pub fn of(cluster: &'a mut OpenSearchCluster) -> Self {
        Self {
            names: &mut cluster.meta_mut().finalizers,
        }
    }

    /// Whether `name` is present
    pub fn contains(&self, name: &str) -> bool {
        self.names
            .as_ref()
            .is_some_and(|list| list.iter().any(|f| f == name))
    }

    /// Append `name` unless present. Returns whether the list changed.
    pub fn insert(&mut self, name: &str) -> bool {
        if self.contains(name) {
            return false;
        }
        self.names
            .get_or_insert_with(Vec::new)
            .push(name.to_string());
        true
    }

    /// Drop every occurrence of `name`. Returns whether the list changed.
    pub fn remove(&mut self, name: &str) -> bool {
        let Some(list) = self.names.as_mut() else {
            return false;
        };
        let before = list.len();
        list.retain(|f| f != name);
        list.len() != before
    }
}

/// Check if the cluster carries our finalizer
pub fn has_finalizer(cluster: &OpenSearchCluster) -> bool {
    cluster
        .meta()
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|name| name == CLUSTER_FINALIZER))
}

/// Remembers which deleting objects already had their teardown announced.
///
/// Lives for the process; a restart announces an in-flight teardown once more.
#[derive(Debug, Default)]
pub struct TeardownTracker {
    started: Mutex<HashSet<ObjectKey>>,
}

impl TeardownTracker {
    /// Mark the teardown of `key` as started. True only the first time.
    pub fn begin(&self, key: &ObjectKey) -> bool {
        match self.started.lock() {
            Ok(mut started) => started.insert(key.clone()),
            Err(poisoned) => poisoned.into_inner().insert(key.clone()),
        }
    }

    /// Drop `key` once its object is released or gone
    pub fn forget(&self, key: &ObjectKey) {
        match self.started.lock() {
            Ok(mut started) => started.remove(key),
            Err(poisoned) => poisoned.into_inner().remove(key),
        };
    }
}

/// Add [`CLUSTER_FINALIZER`] to the object
pub struct AddFinalizer;

#[async_trait]
impl ReadModifyWrite for AddFinalizer {
    fn name(&self) -> &'static str {
        "add_finalizer"
    }

    fn target(&self) -> WriteTarget {
        WriteTarget::Object
    }

    async fn modify(
        &self,
        cluster: &mut OpenSearchCluster,
        _ctx: &Context,
        _cancel: &CancellationToken,
    ) -> Result<bool, Error> {
        // A deleting object must not gain finalizers
        if cluster.is_deleting() {
            return Ok(false);
        }
        Ok(FinalizerSet::of(cluster).insert(CLUSTER_FINALIZER))
    }
}

/// Remove [`CLUSTER_FINALIZER`], leaving other finalizers in place
pub struct RemoveFinalizer;

#[async_trait]
impl ReadModifyWrite for RemoveFinalizer {
    fn name(&self) -> &'static str {
        "remove_finalizer"
    }

    fn target(&self) -> WriteTarget {
        WriteTarget::Object
    }

    async fn modify(
        &self,
        cluster: &mut OpenSearchCluster,
        _ctx: &Context,
        _cancel: &CancellationToken,
    ) -> Result<bool, Error> {
        Ok(FinalizerSet::of(cluster).remove(CLUSTER_FINALIZER))
    }
}

/// Make sure a live object carries the finalizer.
///
/// Returns the object as stored afterwards.
pub async fn ensure_finalizer(
    cluster: OpenSearchCluster,
    key: &ObjectKey,
    ctx: &Context,
    cancel: &CancellationToken,
) -> Result<OpenSearchCluster, Error> {
    if has_finalizer(&cluster) {
        return Ok(cluster);
    }
    debug!("adding finalizer");
    apply_read_modify_write(&AddFinalizer, key, ctx, cancel).await
}

/// Tear down child resources of a deleting object, then release it.
///
/// The finalizer is only removed after every teardown unit converged. A unit
/// asking to run again keeps the finalizer and its result is returned as is.
pub async fn handle_deletion(
    cluster: &OpenSearchCluster,
    key: &ObjectKey,
    ctx: &Context,
    cancel: &CancellationToken,
) -> Result<ReconcileResult, Error> {
    if !has_finalizer(cluster) {
        debug!("no finalizer, allowing deletion");
        return Ok(ReconcileResult::done());
    }

    let unit_ctx = ReconcilerContext::for_cluster(cluster, ctx.events.clone(), cancel.clone());
    let object_ref = unit_ctx.object_ref.clone();

    if ctx.teardowns.begin(key) {
        ctx.events
            .publish(&object_ref, ClusterEvent::deletion_started())
            .await;
    }

    let units = ctx.components.build(cluster, unit_ctx.clone());
    match run_pipeline(&units.teardown_pipeline(), &unit_ctx).await? {
        PipelineOutcome::Halted { component, result } => {
            debug!(%component, "teardown not finished, keeping finalizer");
            return Ok(result);
        }
        PipelineOutcome::Completed => {}
    }

    apply_read_modify_write(&RemoveFinalizer, key, ctx, cancel).await?;
    ctx.teardowns.forget(key);
    info!("teardown complete, finalizer removed");

    ctx.events
        .publish(&object_ref, ClusterEvent::resources_deleted())
        .await;

    Ok(ReconcileResult::done())
}
