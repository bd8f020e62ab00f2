//! Kubernetes Events for OpenSearchCluster progress and failures.
//!
//! The engine reports what it did through [`ClusterEvent`] values; the
//! [`EventPublisher`] turns them into Events on the object, visible via
//! `kubectl describe opensearchcluster`.
//!
//! Publishing is fire-and-forget. A failed event is logged and otherwise
//! ignored, it never fails a reconcile.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

#[cfg(test)]
use mockall::automock;

use crate::components::ComponentKind;
use crate::Error;

/// Event reason strings (REASON column of `kubectl get events`)
pub mod reasons {
    /// Object entered the Running phase
    pub const PHASE_RUNNING: &str = "PhaseRunning";
    /// All cluster-manager pools reported ready
    pub const CLUSTER_INITIALIZED: &str = "ClusterInitialized";
    /// A pipeline unit returned an error
    pub const COMPONENT_FAILED: &str = "ComponentFailed";
    /// Deletion observed, tearing down child resources
    pub const DELETION_STARTED: &str = "DeletionStarted";
    /// Teardown finished and the finalizer was released
    pub const RESOURCES_DELETED: &str = "ResourcesDeleted";
}

/// Event action strings (ACTION column of `kubectl get events`)
pub mod actions {
    /// Regular reconcile pass
    pub const RECONCILE: &str = "Reconcile";
    /// Teardown and finalizer handling
    pub const DELETE: &str = "Delete";
}

/// One thing the engine wants to tell the object's owner
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterEvent {
    /// Warning rather than Normal
    pub warning: bool,
    /// One of [`reasons`]
    pub reason: &'static str,
    /// One of [`actions`]
    pub action: &'static str,
    /// Human-readable message
    pub note: String,
}

impl ClusterEvent {
    fn normal(reason: &'static str, action: &'static str, note: impl Into<String>) -> Self {
        Self {
            warning: false,
            reason,
            action,
            note: note.into(),
        }
    }

    /// The object moved to Running
    pub fn phase_running() -> Self {
        Self::normal(
            reasons::PHASE_RUNNING,
            actions::RECONCILE,
            "Cluster entered Running phase",
        )
    }

    /// `status.initialized` flipped to true
    pub fn cluster_initialized() -> Self {
        Self::normal(
            reasons::CLUSTER_INITIALIZED,
            actions::RECONCILE,
            "All cluster-manager nodes are ready",
        )
    }

    /// Teardown of child resources began
    pub fn deletion_started() -> Self {
        Self::normal(
            reasons::DELETION_STARTED,
            actions::DELETE,
            "Tearing down cluster resources",
        )
    }

    /// Teardown finished and the finalizer was released
    pub fn resources_deleted() -> Self {
        Self::normal(
            reasons::RESOURCES_DELETED,
            actions::DELETE,
            "Cluster resources deleted",
        )
    }

    /// A pipeline unit failed and stopped the pass
    pub fn component_failed(component: ComponentKind, error: &Error) -> Self {
        Self {
            warning: true,
            reason: reasons::COMPONENT_FAILED,
            action: actions::RECONCILE,
            note: format!("{component}: {error}"),
        }
    }

    fn into_kube_event(self) -> Event {
        Event {
            type_: if self.warning {
                EventType::Warning
            } else {
                EventType::Normal
            },
            reason: self.reason.to_string(),
            note: Some(self.note),
            action: self.action.to_string(),
            secondary: None,
        }
    }
}

/// Sink for [`ClusterEvent`]s
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Record `event` on the object behind `object_ref`. Never fails.
    async fn publish(&self, object_ref: &ObjectReference, event: ClusterEvent);
}

/// Publisher backed by `kube::runtime::events::Recorder`
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a publisher reporting as `controller_name`.
    ///
    /// The pod name (from `POD_NAME`) is reported as the instance when set.
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(&self, object_ref: &ObjectReference, event: ClusterEvent) {
        let reason = event.reason;
        if let Err(e) = self
            .recorder
            .publish(&event.into_kube_event(), object_ref)
            .await
        {
            warn!(reason, error = %e, "failed to publish Kubernetes event");
        }
    }
}

/// Publisher that drops every event
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(&self, _object_ref: &ObjectReference, _event: ClusterEvent) {}
}
