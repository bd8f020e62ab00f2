//! Pipeline units driven by the reconcile engine.
//!
//! Each unit converges one slice of the cluster's child resources (TLS
//! material, security configuration, StatefulSets, dashboards, ...). The engine
//! never looks inside a unit: it builds a fresh [`ComponentSet`] for every pass
//! and runs the units in a fixed order through [`run_pipeline`].
//!
//! Two pipelines are built from the same set of units:
//!
//! - apply: TLS, security config, configuration, cluster, scaler, dashboards,
//!   upgrade, restart
//! - teardown: TLS, security config, configuration, cluster, dashboards

mod noop;
mod pipeline;

pub use noop::{NoopComponent, NoopComponentFactory};
pub use pipeline::{run_pipeline, PipelineOutcome};

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::Resource;
use tokio_util::sync::CancellationToken;

#[cfg(test)]
use mockall::automock;

use crate::crd::{NodePool, OpenSearchCluster};
use crate::events::EventPublisher;
use crate::requeue::ReconcileResult;
use crate::Error;

/// Identifies a pipeline unit
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    /// Certificates for transport and HTTP
    Tls,
    /// Security plugin configuration
    SecurityConfig,
    /// Cluster configuration (ConfigMaps, Services)
    Configuration,
    /// StatefulSets for the node pools
    Cluster,
    /// Node pool scale up/down
    Scaler,
    /// Dashboards Deployment
    Dashboards,
    /// Version upgrades
    Upgrade,
    /// Rolling restarts after config changes
    Restart,
}

impl ComponentKind {
    /// Stable name used in logs and events
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tls => "tls",
            Self::SecurityConfig => "securityconfig",
            Self::Configuration => "configuration",
            Self::Cluster => "cluster",
            Self::Scaler => "scaler",
            Self::Dashboards => "dashboards",
            Self::Upgrade => "upgrade",
            Self::Restart => "restart",
        }
    }
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which entry point of a unit a pipeline calls
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PipelineMode {
    /// Create or update child resources
    Apply,
    /// Remove child resources before the finalizer is released
    Teardown,
}

/// One pipeline unit.
///
/// Both entry points must be idempotent and safe to abort half way: the engine
/// may stop after any unit and call the whole pipeline again later.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Component: Send + Sync {
    /// Converge child resources toward the desired state
    async fn reconcile(&self) -> Result<ReconcileResult, Error>;

    /// Remove child resources the store will not garbage-collect on its own
    async fn delete_resources(&self) -> Result<ReconcileResult, Error> {
        Ok(ReconcileResult::done())
    }
}

/// A unit bound to one pipeline mode: a zero-argument "run once" operation
#[derive(Clone)]
pub struct ComponentReconciler {
    kind: ComponentKind,
    mode: PipelineMode,
    unit: Arc<dyn Component>,
}

impl ComponentReconciler {
    /// Bind `unit` to `mode`
    pub fn new(kind: ComponentKind, mode: PipelineMode, unit: Arc<dyn Component>) -> Self {
        Self { kind, mode, unit }
    }

    /// The unit this reconciler runs
    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    /// The entry point this reconciler calls
    pub fn mode(&self) -> PipelineMode {
        self.mode
    }

    /// Run the unit once
    pub async fn run(&self) -> Result<ReconcileResult, Error> {
        match self.mode {
            PipelineMode::Apply => self.unit.reconcile().await,
            PipelineMode::Teardown => self.unit.delete_resources().await,
        }
    }
}

impl std::fmt::Debug for ComponentReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentReconciler")
            .field("kind", &self.kind)
            .field("mode", &self.mode)
            .finish()
    }
}

/// The full set of units for one reconcile pass
#[derive(Clone)]
pub struct ComponentSet {
    /// TLS material
    pub tls: Arc<dyn Component>,
    /// Security plugin configuration
    pub security_config: Arc<dyn Component>,
    /// Cluster configuration
    pub configuration: Arc<dyn Component>,
    /// Node pool StatefulSets
    pub cluster: Arc<dyn Component>,
    /// Scaling decisions
    pub scaler: Arc<dyn Component>,
    /// Dashboards
    pub dashboards: Arc<dyn Component>,
    /// Version upgrades
    pub upgrade: Arc<dyn Component>,
    /// Rolling restarts
    pub restart: Arc<dyn Component>,
}

impl ComponentSet {
    /// Apply-mode pipeline. Later units assume earlier ones converged.
    pub fn apply_pipeline(&self) -> Vec<ComponentReconciler> {
        let apply = |kind, unit: &Arc<dyn Component>| {
            ComponentReconciler::new(kind, PipelineMode::Apply, unit.clone())
        };
        vec![
            apply(ComponentKind::Tls, &self.tls),
            apply(ComponentKind::SecurityConfig, &self.security_config),
            apply(ComponentKind::Configuration, &self.configuration),
            apply(ComponentKind::Cluster, &self.cluster),
            apply(ComponentKind::Scaler, &self.scaler),
            apply(ComponentKind::Dashboards, &self.dashboards),
            apply(ComponentKind::Upgrade, &self.upgrade),
            apply(ComponentKind::Restart, &self.restart),
        ]
    }

    /// Teardown-mode pipeline. Scaler, upgrade and restart own nothing to delete.
    pub fn teardown_pipeline(&self) -> Vec<ComponentReconciler> {
        let teardown = |kind, unit: &Arc<dyn Component>| {
            ComponentReconciler::new(kind, PipelineMode::Teardown, unit.clone())
        };
        vec![
            teardown(ComponentKind::Tls, &self.tls),
            teardown(ComponentKind::SecurityConfig, &self.security_config),
            teardown(ComponentKind::Configuration, &self.configuration),
            teardown(ComponentKind::Cluster, &self.cluster),
            teardown(ComponentKind::Dashboards, &self.dashboards),
        ]
    }
}

/// Per-pass state shared by every unit of one reconcile call
#[derive(Clone)]
pub struct ReconcilerContext {
    /// Event sink keyed to the reconciled object
    pub events: Arc<dyn EventPublisher>,
    /// Reference to the reconciled object, for events
    pub object_ref: ObjectReference,
    /// Node pools as declared in the spec at the start of the pass
    pub node_pools: Vec<NodePool>,
    /// Cancellation for the current call
    pub cancel: CancellationToken,
}

impl ReconcilerContext {
    /// Context for one pass over `cluster`
    pub fn for_cluster(
        cluster: &OpenSearchCluster,
        events: Arc<dyn EventPublisher>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            events,
            object_ref: cluster.object_ref(&()),
            node_pools: cluster.spec.node_pools.clone(),
            cancel,
        }
    }
}

/// Builds the units for one reconcile pass
#[cfg_attr(test, automock)]
pub trait ComponentFactory: Send + Sync {
    /// Create fresh units bound to `cluster`
    fn build(&self, cluster: &OpenSearchCluster, ctx: ReconcilerContext) -> ComponentSet;
}
