//! Phase handlers for the OpenSearchCluster controller.
//!
//! The lifecycle only moves forward: an object is first observed without a
//! phase, is moved to Running (Pending is accepted on the way but does no work
//! of its own), and stays Running for the rest of its life. Phase values this
//! controller does not know are parked on the periodic resync.

mod pending;
mod running;

pub use pending::handle_pending;
pub use running::handle_running;

use kube::Resource;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::controller::{apply_read_modify_write, Context, EnterRunning};
use crate::crd::{ClusterPhase, OpenSearchCluster};
use crate::events::ClusterEvent;
use crate::requeue::ReconcileResult;
use crate::store::ObjectKey;
use crate::Error;

/// Run the handler for the object's current phase.
///
/// An object without a phase is moved to Running first (status persisted with
/// an empty component list), then handled as Running in the same call.
pub async fn dispatch(
    cluster: OpenSearchCluster,
    key: &ObjectKey,
    ctx: &Context,
    cancel: &CancellationToken,
) -> Result<ReconcileResult, Error> {
    let cluster = if cluster.phase().is_none() {
        info!(cluster = %key, "first observation, entering Running");
        enter_running(&cluster, key, ctx, cancel).await?
    } else {
        cluster
    };

    match cluster.phase() {
        Some(ClusterPhase::Pending) => handle_pending(&cluster, key, ctx, cancel).await,
        Some(ClusterPhase::Running) => handle_running(&cluster, key, ctx, cancel).await,
        other => {
            warn!(cluster = %key, phase = ?other, "unknown phase, waiting for resync");
            Ok(ReconcileResult::resync())
        }
    }
}

/// Persist the Pending/unset -> Running transition and announce it.
///
/// Returns the object as stored afterwards, which may already be past the
/// transition if another writer got there first.
pub(crate) async fn enter_running(
    cluster: &OpenSearchCluster,
    key: &ObjectKey,
    ctx: &Context,
    cancel: &CancellationToken,
) -> Result<OpenSearchCluster, Error> {
    let updated = apply_read_modify_write(&EnterRunning, key, ctx, cancel).await?;

    let moved = cluster
        .phase()
        .map_or(true, |from| from.can_transition_to(&ClusterPhase::Running));
    if moved && updated.phase() == Some(&ClusterPhase::Running) {
        ctx.events
            .publish(&updated.object_ref(&()), ClusterEvent::phase_running())
            .await;
    }

    Ok(updated)
}
