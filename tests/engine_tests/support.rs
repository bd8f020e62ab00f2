//! Test doubles for driving the engine without a cluster

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tokio_util::sync::CancellationToken;

use opensearch_operator::components::{
    Component, ComponentFactory, ComponentKind, ComponentSet, PipelineMode, ReconcilerContext,
};
use opensearch_operator::controller::{reconcile_key, Context, CLUSTER_FINALIZER};
use opensearch_operator::crd::{
    ClusterPhase, GeneralConfig, NodePool, OpenSearchCluster, OpenSearchClusterSpec,
    OpenSearchClusterStatus,
};
use opensearch_operator::events::{ClusterEvent, EventPublisher};
use opensearch_operator::readiness::ReadinessProbe;
use opensearch_operator::requeue::ReconcileResult;
use opensearch_operator::retry::RetryConfig;
use opensearch_operator::store::{ClusterStore, ObjectKey};
use opensearch_operator::Error;

// =============================================================================
// Store
// =============================================================================

/// Store with API-server-like semantics: resourceVersion checks on every
/// write, and objects are purged once deleting with no finalizers left.
#[derive(Default)]
pub struct InMemoryStore {
    objects: Mutex<HashMap<ObjectKey, OpenSearchCluster>>,
    version: AtomicU64,
    pending_update_conflicts: AtomicU32,
    pending_status_conflicts: AtomicU32,
    fail_gets: AtomicBool,
    delete_after_next_get: AtomicBool,
    gets: AtomicU32,
    updates: AtomicU32,
    status_updates: AtomicU32,
}

impl InMemoryStore {
    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn objects(&self) -> std::sync::MutexGuard<'_, HashMap<ObjectKey, OpenSearchCluster>> {
        self.objects.lock().expect("store mutex should not be poisoned")
    }

    /// Store `cluster` as if freshly created, returning its key
    pub fn insert(&self, mut cluster: OpenSearchCluster) -> ObjectKey {
        cluster.metadata.resource_version = Some(self.next_version());
        let key = ObjectKey::from_cluster(&cluster);
        self.objects().insert(key.clone(), cluster);
        key
    }

    /// Latest stored version of `key`
    pub fn current(&self, key: &ObjectKey) -> Option<OpenSearchCluster> {
        self.objects().get(key).cloned()
    }

    /// Simulate another writer touching the object right before the next
    /// `n` object writes
    pub fn race_next_updates(&self, n: u32) {
        self.pending_update_conflicts.store(n, Ordering::SeqCst);
    }

    /// Same as [`Self::race_next_updates`] for status writes
    pub fn race_next_status_updates(&self, n: u32) {
        self.pending_status_conflicts.store(n, Ordering::SeqCst);
    }

    /// Make every subsequent read fail with a transient error
    pub fn fail_gets(&self) {
        self.fail_gets.store(true, Ordering::SeqCst);
    }

    /// Have a user delete the object right after the next read is served
    pub fn delete_after_next_get(&self) {
        self.delete_after_next_get.store(true, Ordering::SeqCst);
    }

    /// Set the deletion timestamp, purging at once when nothing holds the object
    fn request_deletion(&self, key: &ObjectKey) {
        let mut objects = self.objects();
        let Some(stored) = objects.get_mut(key) else {
            return;
        };
        let version = self.next_version();
        *stored = mark_deleting(stored.clone());
        stored.metadata.resource_version = Some(version);
        if stored.metadata.finalizers.as_ref().map_or(true, |f| f.is_empty()) {
            objects.remove(key);
        }
    }

    /// Number of reads served
    pub fn gets(&self) -> u32 {
        self.gets.load(Ordering::SeqCst)
    }

    /// Number of object write attempts, conflicting ones included
    pub fn update_attempts(&self) -> u32 {
        self.updates.load(Ordering::SeqCst)
    }

    /// Number of status write attempts, conflicting ones included
    pub fn status_update_attempts(&self) -> u32 {
        self.status_updates.load(Ordering::SeqCst)
    }

    /// All write attempts
    pub fn writes(&self) -> u32 {
        self.update_attempts() + self.status_update_attempts()
    }

    /// Consume one injected race: bump the stored version under the writer
    fn take_race(&self, pending: &AtomicU32, stored: &mut OpenSearchCluster) -> bool {
        let raced = pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if raced {
            stored.metadata.resource_version = Some(self.next_version());
        }
        raced
    }

    fn write(
        &self,
        cluster: &OpenSearchCluster,
        pending: &AtomicU32,
        apply: impl FnOnce(&mut OpenSearchCluster, &OpenSearchCluster),
    ) -> Result<OpenSearchCluster, Error> {
        let key = ObjectKey::from_cluster(cluster);
        let mut objects = self.objects();
        let Some(stored) = objects.get_mut(&key) else {
            return Err(Error::not_found(&key.namespace, &key.name));
        };

        if self.take_race(pending, stored)
            || stored.metadata.resource_version != cluster.metadata.resource_version
        {
            return Err(Error::conflict(
                &key.name,
                "the object has been modified; please apply your changes to the latest version",
            ));
        }

        apply(stored, cluster);
        stored.metadata.resource_version = Some(self.next_version());
        let written = stored.clone();

        let finalized = written.metadata.deletion_timestamp.is_some()
            && written
                .metadata
                .finalizers
                .as_ref()
                .map_or(true, |f| f.is_empty());
        if finalized {
            objects.remove(&key);
        }
        Ok(written)
    }
}

#[async_trait]
impl ClusterStore for InMemoryStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<OpenSearchCluster>, Error> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(Error::internal("get", "store unavailable"));
        }
        let served = self.current(key);
        if self.delete_after_next_get.swap(false, Ordering::SeqCst) {
            self.request_deletion(key);
        }
        Ok(served)
    }

    async fn update(&self, cluster: &OpenSearchCluster) -> Result<OpenSearchCluster, Error> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.write(cluster, &self.pending_update_conflicts, |stored, incoming| {
            stored.metadata.finalizers = incoming.metadata.finalizers.clone();
        })
    }

    async fn update_status(
        &self,
        cluster: &OpenSearchCluster,
    ) -> Result<OpenSearchCluster, Error> {
        self.status_updates.fetch_add(1, Ordering::SeqCst);
        self.write(cluster, &self.pending_status_conflicts, |stored, incoming| {
            stored.status = incoming.status.clone();
        })
    }
}

// =============================================================================
// Pipeline units
// =============================================================================

/// What a scripted unit returns
#[derive(Clone, Debug)]
pub enum Outcome {
    /// Converged
    Done,
    /// Asks to run again with this exact result
    Requeue(ReconcileResult),
    /// Fails with a component error
    Fail(&'static str),
}

/// Shared script and call log for every unit built by [`ScriptedFactory`]
#[derive(Default)]
pub struct Script {
    outcomes: Mutex<HashMap<(ComponentKind, PipelineMode), Outcome>>,
    calls: Mutex<Vec<(ComponentKind, PipelineMode)>>,
}

impl Script {
    /// Make `kind` return `outcome` when called in `mode`
    pub fn set(&self, kind: ComponentKind, mode: PipelineMode, outcome: Outcome) {
        self.outcomes
            .lock()
            .expect("script mutex should not be poisoned")
            .insert((kind, mode), outcome);
    }

    /// Units called so far, in call order
    pub fn calls(&self) -> Vec<(ComponentKind, PipelineMode)> {
        self.calls
            .lock()
            .expect("script mutex should not be poisoned")
            .clone()
    }

    /// Units called so far in `mode`
    pub fn calls_in(&self, mode: PipelineMode) -> Vec<ComponentKind> {
        self.calls()
            .into_iter()
            .filter(|(_, m)| *m == mode)
            .map(|(kind, _)| kind)
            .collect()
    }

    /// Forget recorded calls
    pub fn clear_calls(&self) {
        self.calls
            .lock()
            .expect("script mutex should not be poisoned")
            .clear();
    }

    fn run(&self, kind: ComponentKind, mode: PipelineMode) -> Result<ReconcileResult, Error> {
        self.calls
            .lock()
            .expect("script mutex should not be poisoned")
            .push((kind, mode));
        let outcome = self
            .outcomes
            .lock()
            .expect("script mutex should not be poisoned")
            .get(&(kind, mode))
            .cloned()
            .unwrap_or(Outcome::Done);
        match outcome {
            Outcome::Done => Ok(ReconcileResult::done()),
            Outcome::Requeue(result) => Ok(result),
            Outcome::Fail(message) => Err(Error::component(kind.as_str(), message)),
        }
    }
}

struct ScriptedUnit {
    kind: ComponentKind,
    script: Arc<Script>,
}

#[async_trait]
impl Component for ScriptedUnit {
    async fn reconcile(&self) -> Result<ReconcileResult, Error> {
        self.script.run(self.kind, PipelineMode::Apply)
    }

    async fn delete_resources(&self) -> Result<ReconcileResult, Error> {
        self.script.run(self.kind, PipelineMode::Teardown)
    }
}

/// Factory building units that follow a shared [`Script`]
pub struct ScriptedFactory {
    script: Arc<Script>,
}

impl ComponentFactory for ScriptedFactory {
    fn build(&self, _cluster: &OpenSearchCluster, _ctx: ReconcilerContext) -> ComponentSet {
        let unit = |kind: ComponentKind| -> Arc<dyn Component> {
            Arc::new(ScriptedUnit {
                kind,
                script: self.script.clone(),
            })
        };
        ComponentSet {
            tls: unit(ComponentKind::Tls),
            security_config: unit(ComponentKind::SecurityConfig),
            configuration: unit(ComponentKind::Configuration),
            cluster: unit(ComponentKind::Cluster),
            scaler: unit(ComponentKind::Scaler),
            dashboards: unit(ComponentKind::Dashboards),
            upgrade: unit(ComponentKind::Upgrade),
            restart: unit(ComponentKind::Restart),
        }
    }
}

// =============================================================================
// Readiness and events
// =============================================================================

/// Readiness answer controlled by the test
#[derive(Default)]
pub struct FixedReadiness {
    ready: AtomicBool,
    probes: AtomicU32,
}

impl FixedReadiness {
    /// Change the answer
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Number of times the engine asked
    pub fn probes(&self) -> u32 {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReadinessProbe for FixedReadiness {
    async fn all_masters_ready(&self, _cluster: &OpenSearchCluster) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.ready.load(Ordering::SeqCst)
    }
}

/// Event sink remembering reasons in publish order
#[derive(Default)]
pub struct RecordingEvents {
    reasons: Mutex<Vec<String>>,
}

impl RecordingEvents {
    /// Reasons published so far
    pub fn reasons(&self) -> Vec<String> {
        self.reasons
            .lock()
            .expect("events mutex should not be poisoned")
            .clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingEvents {
    async fn publish(&self, _object_ref: &ObjectReference, event: ClusterEvent) {
        self.reasons
            .lock()
            .expect("events mutex should not be poisoned")
            .push(event.reason.to_string());
    }
}

// =============================================================================
// Harness
// =============================================================================

/// Engine wired to in-memory collaborators
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub script: Arc<Script>,
    pub readiness: Arc<FixedReadiness>,
    pub events: Arc<RecordingEvents>,
    pub ctx: Context,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::default());
        let script = Arc::new(Script::default());
        let readiness = Arc::new(FixedReadiness::default());
        let events = Arc::new(RecordingEvents::default());
        let ctx = Context::from_parts(
            store.clone(),
            readiness.clone(),
            Arc::new(ScriptedFactory {
                script: script.clone(),
            }),
            events.clone(),
        );
        Self {
            store,
            script,
            readiness,
            events,
            ctx,
        }
    }

    /// Replace the conflict retry policy
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.ctx = self.ctx.with_retry(retry);
        self
    }

    /// One engine call with a live cancellation token
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<ReconcileResult, Error> {
        reconcile_key(key, &self.ctx, &CancellationToken::new()).await
    }

    /// One engine call with the given token
    pub async fn reconcile_with(
        &self,
        key: &ObjectKey,
        cancel: &CancellationToken,
    ) -> Result<ReconcileResult, Error> {
        reconcile_key(key, &self.ctx, cancel).await
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// A freshly applied object: no status, no finalizer
pub fn new_cluster(name: &str) -> OpenSearchCluster {
    OpenSearchCluster {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("search".to_string()),
            ..Default::default()
        },
        spec: OpenSearchClusterSpec {
            general: GeneralConfig {
                service_name: name.to_string(),
                version: Some("2.11.0".to_string()),
                http_port: 9200,
            },
            node_pools: vec![NodePool {
                component: "masters".to_string(),
                replicas: 3,
                roles: vec!["cluster_manager".to_string(), "data".to_string()],
                disk_size: Some("30Gi".to_string()),
            }],
            security: None,
            dashboards: None,
        },
        status: None,
    }
}

/// An adopted object in `phase`, carrying our finalizer
pub fn adopted_cluster(name: &str, phase: ClusterPhase) -> OpenSearchCluster {
    let mut cluster = new_cluster(name);
    cluster.metadata.finalizers = Some(vec![CLUSTER_FINALIZER.to_string()]);
    cluster.status = Some(OpenSearchClusterStatus {
        phase: Some(phase),
        initialized: false,
        components_status: vec![],
    });
    cluster
}

/// Mark `cluster` as deletion-requested
pub fn mark_deleting(mut cluster: OpenSearchCluster) -> OpenSearchCluster {
    cluster.metadata.deletion_timestamp = Some(
        serde_json::from_value(serde_json::json!("2024-05-01T12:00:00Z"))
            .expect("timestamp should parse"),
    );
    cluster
}

/// Finalizers currently stored on `key`
pub fn finalizers(store: &InMemoryStore, key: &ObjectKey) -> Vec<String> {
    store
        .current(key)
        .and_then(|c| c.metadata.finalizers)
        .unwrap_or_default()
}
