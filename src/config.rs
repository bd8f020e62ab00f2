//! Operator configuration from command-line flags and environment variables

use clap::{Args, ValueEnum};

use crate::controller::DEFAULT_CONTROLLER_NAME;

/// Log output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Settings for the controller process
#[derive(Args, Clone, Debug, PartialEq)]
pub struct OperatorConfig {
    /// Maximum number of OpenSearchCluster objects reconciled in parallel
    #[arg(
        long,
        env = "MAX_CONCURRENT_RECONCILES",
        default_value_t = 1,
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub max_concurrent_reconciles: u16,

    /// Only watch objects in this namespace (all namespaces when unset)
    #[arg(long, env = "WATCH_NAMESPACE")]
    pub watch_namespace: Option<String>,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Name reported as the source of Kubernetes events
    #[arg(long, env = "CONTROLLER_NAME", default_value = DEFAULT_CONTROLLER_NAME)]
    pub controller_name: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_reconciles: 1,
            watch_namespace: None,
            log_format: LogFormat::Text,
            controller_name: DEFAULT_CONTROLLER_NAME.to_string(),
        }
    }
}

impl OperatorConfig {
    /// Namespace to watch, treating an empty value as "all namespaces"
    pub fn namespace(&self) -> Option<&str> {
        self.watch_namespace.as_deref().filter(|ns| !ns.is_empty())
    }
}
