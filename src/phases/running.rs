//! Running phase handler.
//!
//! Records cluster readiness once, then drives the apply pipeline. A pass in
//! which every unit converged still ends with the periodic resync so drift the
//! watch missed is picked up.

use kube::Resource;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::components::{run_pipeline, PipelineOutcome, ReconcilerContext};
use crate::controller::{apply_read_modify_write, Context, RecordInitialized};
use crate::crd::OpenSearchCluster;
use crate::events::ClusterEvent;
use crate::requeue::ReconcileResult;
use crate::store::ObjectKey;
use crate::Error;

/// Handle a cluster in the Running phase.
///
/// Readiness is informational: a cluster that is not ready yet still runs the
/// full pipeline.
pub async fn handle_running(
    cluster: &OpenSearchCluster,
    key: &ObjectKey,
    ctx: &Context,
    cancel: &CancellationToken,
) -> Result<ReconcileResult, Error> {
    let current;
    let cluster = if cluster.is_initialized() {
        cluster
    } else {
        current = record_initialized(key, ctx, cancel).await?;
        &current
    };

    let unit_ctx = ReconcilerContext::for_cluster(cluster, ctx.events.clone(), cancel.clone());
    let units = ctx.components.build(cluster, unit_ctx.clone());

    match run_pipeline(&units.apply_pipeline(), &unit_ctx).await? {
        PipelineOutcome::Halted { component, result } => {
            debug!(cluster = %key, %component, ?result, "apply pipeline halted");
            Ok(result)
        }
        PipelineOutcome::Completed => {
            debug!(cluster = %key, "apply pipeline converged");
            Ok(ReconcileResult::resync())
        }
    }
}

/// Check readiness and persist `status.initialized`, announcing the flip
async fn record_initialized(
    key: &ObjectKey,
    ctx: &Context,
    cancel: &CancellationToken,
) -> Result<OpenSearchCluster, Error> {
    let updated = apply_read_modify_write(&RecordInitialized, key, ctx, cancel).await?;

    if updated.is_initialized() {
        info!(cluster = %key, "all cluster-manager nodes ready, cluster initialized");
        ctx.events
            .publish(&updated.object_ref(&()), ClusterEvent::cluster_initialized())
            .await;
    } else {
        debug!(cluster = %key, "cluster-manager nodes not ready yet");
    }

    Ok(updated)
}
