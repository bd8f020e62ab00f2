//! OpenSearch Operator - reconciles OpenSearchCluster resources

use std::sync::Arc;

use clap::{Parser, Subcommand};
use kube::{Client, CustomResourceExt};
use tokio_util::sync::CancellationToken;

use opensearch_operator::components::NoopComponentFactory;
use opensearch_operator::config::OperatorConfig;
use opensearch_operator::controller_runner::build_cluster_controller;
use opensearch_operator::crd::OpenSearchCluster;
use opensearch_operator::telemetry::init_telemetry;

/// OpenSearch Operator - Kubernetes lifecycle management for OpenSearch clusters
#[derive(Parser, Debug)]
#[command(name = "opensearch-operator", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    #[command(flatten)]
    config: OperatorConfig,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller (default mode)
    ///
    /// Watches OpenSearchCluster objects and their child resources and
    /// reconciles every change.
    Controller,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&OpenSearchCluster::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    init_telemetry(cli.config.log_format)?;

    match cli.command {
        Some(Commands::Controller) | None => run_controller(cli.config).await,
    }
}

/// Run the OpenSearchCluster controller until a shutdown signal arrives
async fn run_controller(config: OperatorConfig) -> anyhow::Result<()> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting OpenSearch operator");

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for shutdown signal");
            return;
        }
        tracing::info!("shutdown signal received, cancelling in-flight reconciles");
        signal_token.cancel();
    });

    build_cluster_controller(client, &config, Arc::new(NoopComponentFactory), shutdown).await;

    tracing::info!("controller stopped");
    Ok(())
}
