//! Units that converge nothing.
//!
//! Lets the engine run on its own (CRD lifecycle, finalizers, phases and
//! readiness) when no concrete units are linked into the binary.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Component, ComponentFactory, ComponentSet, ReconcilerContext};
use crate::crd::OpenSearchCluster;
use crate::requeue::ReconcileResult;
use crate::Error;

/// A unit that is always converged
pub struct NoopComponent;

#[async_trait]
impl Component for NoopComponent {
    async fn reconcile(&self) -> Result<ReconcileResult, Error> {
        Ok(ReconcileResult::done())
    }
}

/// Factory filling every slot with [`NoopComponent`]
pub struct NoopComponentFactory;

impl ComponentFactory for NoopComponentFactory {
    fn build(&self, _cluster: &OpenSearchCluster, _ctx: ReconcilerContext) -> ComponentSet {
        let unit: Arc<dyn Component> = Arc::new(NoopComponent);
        ComponentSet {
            tls: unit.clone(),
            security_config: unit.clone(),
            configuration: unit.clone(),
            cluster: unit.clone(),
            scaler: unit.clone(),
            dashboards: unit.clone(),
            upgrade: unit.clone(),
            restart: unit,
        }
    }
}
