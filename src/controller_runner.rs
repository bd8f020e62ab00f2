//! Controller runner - wires the OpenSearchCluster controller into kube-runtime
//!
//! Declares the watched kind and the owned child kinds, so any change to a
//! child re-triggers reconciliation of the cluster that owns it.

use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Secret, Service};
use k8s_openapi::NamespaceResourceScope;
use kube::runtime::controller::Config as ControllerConfig;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, Resource};
use tokio_util::sync::CancellationToken;

use crate::components::ComponentFactory;
use crate::config::OperatorConfig;
use crate::controller::{error_policy, reconcile, Context};
use crate::crd::OpenSearchCluster;

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
/// This forces the API server to close the watch before the client times out,
/// preventing "body read timed out" errors on idle watches.
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Api handle scoped to the watch namespace, or cluster-wide
fn scoped_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    <K as Resource>::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

fn watcher_config() -> WatcherConfig {
    WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS)
}

/// Build the OpenSearchCluster controller future.
///
/// `shutdown` is handed to every reconcile call (as a child token) so in-flight
/// store calls stop when it is cancelled.
pub fn build_cluster_controller(
    client: Client,
    config: &OperatorConfig,
    components: Arc<dyn ComponentFactory>,
    shutdown: CancellationToken,
) -> impl Future<Output = ()> + Send {
    let ctx = Arc::new(
        Context::builder(client.clone())
            .components(components)
            .controller_name(config.controller_name.clone())
            .shutdown(shutdown)
            .build(),
    );

    let namespace = config.namespace();
    match namespace {
        Some(ns) => tracing::info!(namespace = %ns, "watching a single namespace"),
        None => tracing::info!("watching all namespaces"),
    }
    tracing::info!(
        max_concurrent_reconciles = config.max_concurrent_reconciles,
        "- OpenSearchCluster controller"
    );

    let clusters: Api<OpenSearchCluster> = scoped_api(&client, namespace);

    Controller::new(clusters, watcher_config())
        .owns(scoped_api::<Pod>(&client, namespace), watcher_config())
        .owns(scoped_api::<Secret>(&client, namespace), watcher_config())
        .owns(scoped_api::<ConfigMap>(&client, namespace), watcher_config())
        .owns(scoped_api::<Service>(&client, namespace), watcher_config())
        .owns(scoped_api::<Deployment>(&client, namespace), watcher_config())
        .owns(scoped_api::<StatefulSet>(&client, namespace), watcher_config())
        .with_config(ControllerConfig::default().concurrency(config.max_concurrent_reconciles))
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(log_reconcile_result("OpenSearchCluster"))
}

/// Creates a closure for logging reconciliation results.
fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::warn!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
