//! Read-modify-write operations on OpenSearchCluster.
//!
//! Every write the engine makes is expressed as a [`ReadModifyWrite`] value and
//! executed by [`apply_read_modify_write`]: fetch the latest object, let the
//! operation modify it, write it back with the fetched resourceVersion. On a
//! conflict the whole sequence starts over from the fetch.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{guarded, Context};
use crate::crd::{ClusterPhase, OpenSearchCluster, OpenSearchClusterStatus};
use crate::retry::retry_on_conflict;
use crate::store::ObjectKey;
use crate::Error;

/// Which part of the object an operation writes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteTarget {
    /// Metadata/spec (finalizers)
    Object,
    /// The status subresource
    Status,
}

/// One conflict-safe mutation
#[async_trait]
pub trait ReadModifyWrite: Send + Sync {
    /// Name used in retry logs
    fn name(&self) -> &'static str;

    /// Part of the object this operation writes
    fn target(&self) -> WriteTarget;

    /// Apply the change to a freshly fetched object.
    ///
    /// Returns false when the object already has the desired shape, in which
    /// case nothing is written.
    async fn modify(
        &self,
        cluster: &mut OpenSearchCluster,
        ctx: &Context,
        cancel: &CancellationToken,
    ) -> Result<bool, Error>;
}

/// Run `op` against the latest version of `key`, retrying on conflicts.
///
/// Returns the object as stored after the operation (the fetched object when
/// no write was needed).
pub async fn apply_read_modify_write(
    op: &dyn ReadModifyWrite,
    key: &ObjectKey,
    ctx: &Context,
    cancel: &CancellationToken,
) -> Result<OpenSearchCluster, Error> {
    retry_on_conflict(&ctx.retry, op.name(), cancel, move || async move {
        let mut cluster = guarded(cancel, ctx.store.get(key))
            .await?
            .ok_or_else(|| Error::not_found(&key.namespace, &key.name))?;

        if !op.modify(&mut cluster, ctx, cancel).await? {
            return Ok(cluster);
        }

        match op.target() {
            WriteTarget::Object => guarded(cancel, ctx.store.update(&cluster)).await,
            WriteTarget::Status => guarded(cancel, ctx.store.update_status(&cluster)).await,
        }
    })
    .await
}

/// Move an unset or Pending object into Running and clear its component records.
///
/// Objects already Running (or in a phase this controller does not model) are
/// left untouched, so the component records are cleared at most once.
pub struct EnterRunning;

#[async_trait]
impl ReadModifyWrite for EnterRunning {
    fn name(&self) -> &'static str {
        "enter_running"
    }

    fn target(&self) -> WriteTarget {
        WriteTarget::Status
    }

    async fn modify(
        &self,
        cluster: &mut OpenSearchCluster,
        _ctx: &Context,
        _cancel: &CancellationToken,
    ) -> Result<bool, Error> {
        match cluster.phase() {
            None | Some(ClusterPhase::Pending) => {
                let initialized = cluster.is_initialized();
                cluster.status = Some(OpenSearchClusterStatus {
                    initialized,
                    ..OpenSearchClusterStatus::running()
                });
                Ok(true)
            }
            Some(_) => Ok(false),
        }
    }
}

/// Record the result of the readiness check in `status.initialized`
pub struct RecordInitialized;

#[async_trait]
impl ReadModifyWrite for RecordInitialized {
    fn name(&self) -> &'static str {
        "record_initialized"
    }

    fn target(&self) -> WriteTarget {
        WriteTarget::Status
    }

    async fn modify(
        &self,
        cluster: &mut OpenSearchCluster,
        ctx: &Context,
        cancel: &CancellationToken,
    ) -> Result<bool, Error> {
        if cluster.is_initialized() {
            return Ok(false);
        }

        let observed: &OpenSearchCluster = cluster;
        let ready =
            guarded(cancel, async { Ok(ctx.readiness.all_masters_ready(observed).await) }).await?;
        if !ready {
            return Ok(false);
        }

        cluster.status_mut().initialized = true;
        Ok(true)
    }
}
