//! Sequential, short-circuiting pipeline execution

use tracing::{debug, warn};

use super::{ComponentKind, ComponentReconciler, ReconcilerContext};
use crate::events::ClusterEvent;
use crate::requeue::ReconcileResult;
use crate::Error;

/// How a pipeline run ended, when no unit failed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Every unit ran and none asked to run again
    Completed,
    /// A unit asked to be run again; later units were skipped
    Halted {
        /// Unit that stopped the pipeline
        component: ComponentKind,
        /// The unit's own result, to be returned unchanged
        result: ReconcileResult,
    },
}

/// Run `reconcilers` one after another.
///
/// Stops at the first unit that errors or requests a requeue. Errors are
/// returned unchanged; a requeue request is returned as
/// [`PipelineOutcome::Halted`] carrying the unit's exact result. Cancellation
/// is checked before every unit.
pub async fn run_pipeline(
    reconcilers: &[ComponentReconciler],
    ctx: &ReconcilerContext,
) -> Result<PipelineOutcome, Error> {
    for reconciler in reconcilers {
        if ctx.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let component = reconciler.kind();
        debug!(%component, mode = ?reconciler.mode(), "running component");

        match reconciler.run().await {
            Ok(result) if result.requeue => {
                debug!(%component, ?result, "component requested requeue, halting pipeline");
                return Ok(PipelineOutcome::Halted { component, result });
            }
            Ok(_) => {}
            Err(e) => {
                warn!(%component, error = %e, "component failed, halting pipeline");
                ctx.events
                    .publish(&ctx.object_ref, ClusterEvent::component_failed(component, &e))
                    .await;
                return Err(e);
            }
        }
    }

    Ok(PipelineOutcome::Completed)
}
