//! Deployment health reporting

use anyhow::{Context, Result};
use kubeops_lib::health::{ContainerUsage, HealthSnapshot, PodHealth};
use kubeops_lib::{ClusterConfig, HealthReporter, KubeCluster};
use tabled::Tabled;

use crate::output::{color_status, print_json, print_warning, OutputFormat};

/// Row for pods table
#[derive(Tabled)]
struct PodRow {
    #[tabled(rename = "Pod")]
    name: String,
    #[tabled(rename = "Phase")]
    phase: String,
    #[tabled(rename = "Ready")]
    ready: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
}

fn usage_column<'a>(pod: &'a PodHealth, pick: impl Fn(&'a ContainerUsage) -> Option<&'a String>) -> String {
    if pod.metrics_error.is_some() {
        return "n/a".to_string();
    }
    let values: Vec<&str> = pod
        .usage
        .iter()
        .filter_map(|c| pick(c).map(String::as_str))
        .collect();
    if values.is_empty() {
        "-".to_string()
    } else {
        values.join(", ")
    }
}

impl From<&PodHealth> for PodRow {
    fn from(pod: &PodHealth) -> Self {
        Self {
            name: pod.name.clone(),
            phase: color_status(&pod.phase),
            ready: if pod.containers_ready { "✓" } else { "✗" }.to_string(),
            status: color_status(pod.status.as_str()),
            cpu: usage_column(pod, |c| c.cpu.as_ref()),
            memory: usage_column(pod, |c| c.memory.as_ref()),
        }
    }
}

/// Show health of a deployment
pub async fn show_health(
    cluster_config: &ClusterConfig,
    name: &str,
    namespace: &str,
    format: OutputFormat,
) -> Result<()> {
    let cluster = KubeCluster::connect(cluster_config)
        .await
        .context("Failed to connect to cluster")?;

    let snapshot = HealthReporter::new(&cluster)
        .get_health(name, namespace)
        .await
        .with_context(|| format!("Failed to check health of {}/{}", namespace, name))?;

    match format {
        OutputFormat::Json => print_json(&snapshot)?,
        OutputFormat::Table => print_snapshot(&snapshot),
    }

    Ok(())
}

fn print_snapshot(snapshot: &HealthSnapshot) {
    println!(
        "Deployment: {}/{}",
        snapshot.namespace, snapshot.deployment_name
    );
    println!(
        "Replicas:   {}/{} available",
        snapshot.available_replicas, snapshot.desired_replicas
    );
    println!("Status:     {}", color_status(snapshot.status.as_str()));
    println!(
        "Checked:    {}",
        snapshot.checked_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    if snapshot.pods.is_empty() {
        println!();
        print_warning("No pods found");
        return;
    }

    let rows: Vec<PodRow> = snapshot.pods.iter().map(PodRow::from).collect();
    let table = tabled::Table::new(rows)
        .with(tabled::settings::Style::rounded())
        .to_string();
    println!("\n{}", table);

    let warnings: Vec<&str> = snapshot.warnings().collect();
    if !warnings.is_empty() {
        println!();
        for warning in warnings {
            print_warning(warning);
        }
    }

    for pod in snapshot.pods.iter().filter(|p| p.metrics_error.is_some()) {
        print_warning(&format!("Metrics unavailable for pod {}", pod.name));
    }
}
