//! OpenSearchCluster reconciliation
//!
//! One call to [`reconcile_key`] drives a single object one step toward its
//! desired state:
//!
//! 1. fetch the object (a missing object ends the call quietly)
//! 2. deleting objects run the teardown pipeline and release the finalizer
//! 3. live objects get the finalizer, then the phase handler runs
//!
//! Every write goes through [`mutation::apply_read_modify_write`], so status and
//! finalizer updates are never applied on top of a stale object.

mod finalizer;
mod mutation;

pub use finalizer::{
    ensure_finalizer, handle_deletion, has_finalizer, AddFinalizer, FinalizerSet,
    RemoveFinalizer, TeardownTracker, CLUSTER_FINALIZER,
};
pub use mutation::{
    apply_read_modify_write, EnterRunning, ReadModifyWrite, RecordInitialized, WriteTarget,
};

use std::future::Future;
use std::sync::Arc;

use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::components::{ComponentFactory, NoopComponentFactory};
use crate::crd::OpenSearchCluster;
use crate::events::{EventPublisher, KubeEventPublisher};
use crate::phases;
use crate::readiness::{KubeReadinessProbe, ReadinessProbe};
use crate::requeue::{ReconcileResult, ERROR_REQUEUE, IMMEDIATE_REQUEUE};
use crate::retry::RetryConfig;
use crate::store::{ClusterStore, KubeClusterStore, ObjectKey};
use crate::Error;

/// Default controller name used for event reporting
pub const DEFAULT_CONTROLLER_NAME: &str = "opensearch-operator";

/// Controller context shared by every reconcile call
pub struct Context {
    /// OpenSearchCluster store (trait object for testability)
    pub store: Arc<dyn ClusterStore>,
    /// Readiness check for cluster-manager pools
    pub readiness: Arc<dyn ReadinessProbe>,
    /// Builds the pipeline units for each pass
    pub components: Arc<dyn ComponentFactory>,
    /// Event sink keyed to the reconciled object
    pub events: Arc<dyn EventPublisher>,
    /// Conflict retry policy for every write
    pub retry: RetryConfig,
    /// Cancelled when the process shuts down; every call runs on a child token
    pub shutdown: CancellationToken,
    /// Objects whose teardown has already been announced
    pub teardowns: TeardownTracker,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client) -> ContextBuilder {
        ContextBuilder::new(client)
    }

    /// Assemble a context from explicit collaborators.
    ///
    /// Uses the default conflict retry policy and a fresh shutdown token.
    pub fn from_parts(
        store: Arc<dyn ClusterStore>,
        readiness: Arc<dyn ReadinessProbe>,
        components: Arc<dyn ComponentFactory>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            store,
            readiness,
            components,
            events,
            retry: RetryConfig::conflict_default(),
            shutdown: CancellationToken::new(),
            teardowns: TeardownTracker::default(),
        }
    }

    /// Replace the conflict retry policy
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the shutdown token
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }
}

/// Builder for [`Context`]
pub struct ContextBuilder {
    client: Client,
    store: Option<Arc<dyn ClusterStore>>,
    readiness: Option<Arc<dyn ReadinessProbe>>,
    components: Option<Arc<dyn ComponentFactory>>,
    events: Option<Arc<dyn EventPublisher>>,
    controller_name: String,
    retry: RetryConfig,
    shutdown: CancellationToken,
}

impl ContextBuilder {
    fn new(client: Client) -> Self {
        Self {
            client,
            store: None,
            readiness: None,
            components: None,
            events: None,
            controller_name: DEFAULT_CONTROLLER_NAME.to_string(),
            retry: RetryConfig::conflict_default(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Override the store (primarily for testing)
    pub fn store(mut self, store: Arc<dyn ClusterStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Override the readiness probe
    pub fn readiness(mut self, readiness: Arc<dyn ReadinessProbe>) -> Self {
        self.readiness = Some(readiness);
        self
    }

    /// Set the factory for pipeline units
    pub fn components(mut self, components: Arc<dyn ComponentFactory>) -> Self {
        self.components = Some(components);
        self
    }

    /// Override the event publisher
    pub fn events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Name reported as the source of events
    pub fn controller_name(mut self, name: impl Into<String>) -> Self {
        self.controller_name = name.into();
        self
    }

    /// Override the conflict retry policy
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Token cancelled on process shutdown
    pub fn shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        Context {
            store: self
                .store
                .unwrap_or_else(|| Arc::new(KubeClusterStore::new(self.client.clone()))),
            readiness: self
                .readiness
                .unwrap_or_else(|| Arc::new(KubeReadinessProbe::new(self.client.clone()))),
            components: self
                .components
                .unwrap_or_else(|| Arc::new(NoopComponentFactory)),
            events: self.events.unwrap_or_else(|| {
                Arc::new(KubeEventPublisher::new(
                    self.client.clone(),
                    &self.controller_name,
                ))
            }),
            retry: self.retry,
            shutdown: self.shutdown,
            teardowns: TeardownTracker::default(),
        }
    }
}

/// Await `fut` unless `cancel` fires first.
///
/// Every store and readiness call goes through here so a cancelled call stops
/// at its next suspension point.
pub(crate) async fn guarded<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = fut => result,
    }
}

/// Reconcile an OpenSearchCluster resource
///
/// Entry point for the controller runtime. Re-reads the object by key so the
/// decision is always made against the latest stored version, then maps the
/// outcome onto an [`Action`].
#[instrument(
    skip(cluster, ctx),
    fields(cluster = %cluster.name_any(), namespace = %cluster.namespace().unwrap_or_default())
)]
pub async fn reconcile(cluster: Arc<OpenSearchCluster>, ctx: Arc<Context>) -> Result<Action, Error> {
    let key = ObjectKey::from_cluster(&cluster);
    let cancel = ctx.shutdown.child_token();

    let result = reconcile_key(&key, &ctx, &cancel).await?;
    debug!(?result, "reconcile finished");
    Ok(result.to_action())
}

/// Drive the object stored under `key` one step.
///
/// # Returns
///
/// - `ReconcileResult::done()` if the object no longer exists
/// - the teardown outcome for a deleting object
/// - the phase handler's outcome otherwise
pub async fn reconcile_key(
    key: &ObjectKey,
    ctx: &Context,
    cancel: &CancellationToken,
) -> Result<ReconcileResult, Error> {
    let Some(cluster) = guarded(cancel, ctx.store.get(key)).await? else {
        debug!(cluster = %key, "object not found, nothing to do");
        ctx.teardowns.forget(key);
        return Ok(ReconcileResult::done());
    };

    if cluster.is_deleting() {
        info!(cluster = %key, "deletion requested");
        return handle_deletion(&cluster, key, ctx, cancel).await;
    }

    // Deletion can land between the read above and the finalizer write
    let cluster = ensure_finalizer(cluster, key, ctx, cancel).await?;
    if cluster.is_deleting() {
        info!(cluster = %key, "deletion requested while adopting");
        return handle_deletion(&cluster, key, ctx, cancel).await;
    }

    phases::dispatch(cluster, key, ctx, cancel).await
}

/// Error policy for the controller
///
/// Conflicts left over after the local retries are requeued quickly, since the
/// next pass reads a fresh version anyway.
pub fn error_policy(cluster: Arc<OpenSearchCluster>, error: &Error, _ctx: Arc<Context>) -> Action {
    if error.is_cancelled() {
        debug!(cluster = %cluster.name_any(), "reconciliation cancelled");
        return Action::await_change();
    }

    if error.is_not_found() {
        debug!(cluster = %cluster.name_any(), "object vanished mid-reconcile");
        return Action::await_change();
    }

    if error.is_conflict() {
        warn!(
            %error,
            cluster = %cluster.name_any(),
            "conflict retries exhausted, requeueing"
        );
        return Action::requeue(IMMEDIATE_REQUEUE);
    }

    error!(
        ?error,
        cluster = %cluster.name_any(),
        "reconciliation failed"
    );
    Action::requeue(ERROR_REQUEUE)
}
