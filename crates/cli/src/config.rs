//! Configuration management for the CLI
//!
//! Defaults come from `~/.config/kubeops/config.json` when present, and any
//! `KUBEOPS_*` environment variable overrides the file.

use anyhow::{Context, Result};
use kubeops_lib::ServiceExposure;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// CLI configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Namespace for commands that take `--namespace`
    pub namespace: String,
    /// Namespace the KEDA operator is installed into
    pub keda_namespace: String,
    /// Service type used when a new Service is created
    pub service_type: ServiceExposure,
    pub min_replicas: i32,
    pub max_replicas: i32,
    /// Prometheus endpoint for the baseline latency trigger
    pub prometheus_address: Option<String>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            keda_namespace: "keda".to_string(),
            service_type: ServiceExposure::ClusterIp,
            min_replicas: 1,
            max_replicas: 10,
            prometheus_address: None,
        }
    }
}

impl CliConfig {
    /// Load configuration from the default file and the environment
    pub fn load() -> Result<Self> {
        Self::load_from(Self::config_path().ok().as_deref())
    }

    /// Load configuration from `path` (if it exists) and the environment
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        builder
            .add_source(config::Environment::with_prefix("KUBEOPS").try_parsing(true))
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    /// Get the configuration file path
    fn config_path() -> Result<PathBuf> {
        let home = dirs_next::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".config").join("kubeops").join("config.json"))
    }
}

/// Get the kubeconfig file to edit.
///
/// `KUBECONFIG` may list several files; the first one is used.
pub fn kubeconfig_path(override_path: Option<&Path>) -> Result<PathBuf> {
    resolve_kubeconfig_path(
        override_path,
        std::env::var_os("KUBECONFIG"),
        dirs_next::home_dir(),
    )
}

fn resolve_kubeconfig_path(
    override_path: Option<&Path>,
    env_value: Option<OsString>,
    home: Option<PathBuf>,
) -> Result<PathBuf> {
    if let Some(path) = override_path {
        return Ok(path.to_path_buf());
    }

    if let Some(first) = env_value
        .as_deref()
        .and_then(|value| std::env::split_paths(value).find(|p| !p.as_os_str().is_empty()))
    {
        return Ok(first);
    }

    let home = home.context("Could not determine home directory")?;
    Ok(home.join(".kube").join("config"))
}
