//! KEDA operator installation

use anyhow::{Context, Result};
use kubeops_lib::{ClusterConfig, HealthReporter, KedaStatus, KubeCluster};
use serde::Serialize;
use tracing::debug;

use crate::helm;
use crate::output::{print_info, print_json, print_success, print_warning, OutputFormat};

#[derive(Serialize)]
struct InstallReport<'a> {
    namespace: &'a str,
    release: &'a str,
    installed_now: bool,
    status: KedaStatus,
}

/// Install KEDA with helm unless its operator Deployment already exists
pub async fn install(
    cluster_config: &ClusterConfig,
    namespace: &str,
    release: &str,
    format: OutputFormat,
) -> Result<()> {
    let cluster = KubeCluster::connect(cluster_config)
        .await
        .context("Failed to connect to cluster")?;
    let reporter = HealthReporter::new(&cluster);

    let status = reporter
        .keda_status(namespace)
        .await
        .context("Failed to check for an existing KEDA installation")?;

    if status.installed {
        return report(namespace, release, false, status, format);
    }

    if matches!(format, OutputFormat::Table) {
        print_info(&format!("Installing KEDA into namespace {}", namespace));
    }
    for step in helm::keda_install_steps(namespace, release) {
        let output = helm::run(&step).await?;
        debug!(stderr = %output.stderr.trim(), "helm finished");
        if matches!(format, OutputFormat::Table) && !output.stdout.trim().is_empty() {
            println!("{}", output.stdout.trim_end());
        }
    }

    let status = reporter
        .keda_status(namespace)
        .await
        .context("Failed to check KEDA after installation")?;
    report(namespace, release, true, status, format)
}

fn report(
    namespace: &str,
    release: &str,
    installed_now: bool,
    status: KedaStatus,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(&InstallReport {
            namespace,
            release,
            installed_now,
            status,
        }),
        OutputFormat::Table => {
            if installed_now {
                print_success(&format!("KEDA release {} installed", release));
            } else {
                print_info(&format!("KEDA is already installed in namespace {}", namespace));
            }

            if status.running_pods > 0 {
                print_success(&format!(
                    "KEDA operator is running ({}/{} pods)",
                    status.running_pods, status.operator_pods
                ));
            } else {
                print_warning("KEDA operator pods are not running yet");
            }
            Ok(())
        }
    }
}
