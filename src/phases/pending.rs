//! Pending phase handler.
//!
//! New objects skip Pending entirely; this handler only runs for objects whose
//! status was written as Pending by something else.

use tokio_util::sync::CancellationToken;
use tracing::info;

use super::enter_running;
use crate::controller::Context;
use crate::crd::OpenSearchCluster;
use crate::requeue::ReconcileResult;
use crate::store::ObjectKey;
use crate::Error;

/// Handle a cluster in the Pending phase.
///
/// Moves the object to Running with an empty component list and asks to be
/// called again right away, so the Running handler runs on the next pass.
pub async fn handle_pending(
    cluster: &OpenSearchCluster,
    key: &ObjectKey,
    ctx: &Context,
    cancel: &CancellationToken,
) -> Result<ReconcileResult, Error> {
    info!(cluster = %key, "pending cluster, moving to Running");
    enter_running(cluster, key, ctx, cancel).await?;
    Ok(ReconcileResult::requeue())
}
