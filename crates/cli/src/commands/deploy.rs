//! create-deployment command

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use kubeops_lib::{
    parse_ports, ClusterConfig, EventDrivenPolicy, HpaPolicy, KubeCluster, ReconcileResult,
    Reconciler, ResourceMetric, ScalingOutcome, ScalingPolicy, ServiceExposure, Trigger,
    WorkloadSpec,
};

use crate::config::CliConfig;
use crate::output::{or_dash, print_json, print_success, print_warning, OutputFormat};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ServiceType {
    ClusterIp,
    LoadBalancer,
}

impl From<ServiceType> for ServiceExposure {
    fn from(value: ServiceType) -> Self {
        match value {
            ServiceType::ClusterIp => ServiceExposure::ClusterIp,
            ServiceType::LoadBalancer => ServiceExposure::LoadBalancer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Autoscaler {
    /// KEDA ScaledObject with a Prometheus latency trigger
    Keda,
    /// autoscaling/v2 HorizontalPodAutoscaler
    Hpa,
    /// No autoscaler
    None,
}

#[derive(Debug, Clone, Args)]
pub struct CreateDeploymentArgs {
    /// Deployment name
    #[arg(long)]
    pub name: String,

    /// Container image
    #[arg(long)]
    pub image: String,

    /// Namespace to deploy into
    #[arg(long, short)]
    pub namespace: Option<String>,

    /// Comma-separated container ports
    #[arg(long, value_delimiter = ',', required = true)]
    pub ports: Vec<String>,

    #[arg(long, default_value = "100m")]
    pub cpu_request: String,

    #[arg(long, default_value = "500m")]
    pub cpu_limit: String,

    #[arg(long, default_value = "128Mi")]
    pub ram_request: String,

    #[arg(long, default_value = "512Mi")]
    pub ram_limit: String,

    /// Service type for a newly created Service
    #[arg(long, value_enum)]
    pub service_type: Option<ServiceType>,

    #[arg(long, value_enum, default_value = "keda")]
    pub autoscaler: Autoscaler,

    /// Target average CPU utilization percent
    #[arg(long)]
    pub cpu_utilization: Option<u32>,

    /// Target average memory utilization percent
    #[arg(long)]
    pub memory_utilization: Option<u32>,

    #[arg(long)]
    pub min_replicas: Option<i32>,

    #[arg(long)]
    pub max_replicas: Option<i32>,

    /// Seconds between KEDA trigger checks
    #[arg(long, default_value_t = 15)]
    pub polling_interval: i32,

    /// Seconds KEDA waits before scaling back to the minimum
    #[arg(long, default_value_t = 300)]
    pub cooldown_period: i32,

    /// Prometheus server for the latency trigger
    #[arg(long)]
    pub prometheus_address: Option<String>,
}

const DEFAULT_HPA_CPU_UTILIZATION: u32 = 80;

impl CreateDeploymentArgs {
    pub fn workload(&self, settings: &CliConfig) -> Result<WorkloadSpec> {
        let namespace = self
            .namespace
            .clone()
            .unwrap_or_else(|| settings.namespace.clone());
        let ports = parse_ports(&self.ports)?;

        Ok(WorkloadSpec::new(&self.name, namespace, &self.image)
            .with_ports(ports)
            .with_cpu(&self.cpu_request, &self.cpu_limit)
            .with_memory(&self.ram_request, &self.ram_limit))
    }

    pub fn exposure(&self, settings: &CliConfig) -> ServiceExposure {
        self.service_type
            .map(ServiceExposure::from)
            .unwrap_or(settings.service_type)
    }

    /// An HPA tracks one metric, so it cannot take both utilization targets
    pub fn scaling_policy(&self, settings: &CliConfig) -> Result<Option<ScalingPolicy>> {
        let min_replicas = self.min_replicas.unwrap_or(settings.min_replicas);
        let max_replicas = self.max_replicas.unwrap_or(settings.max_replicas);

        let policy = match self.autoscaler {
            Autoscaler::None => None,
            Autoscaler::Hpa => {
                let (metric, target) = match (self.cpu_utilization, self.memory_utilization) {
                    (Some(_), Some(_)) => bail!(
                        "--autoscaler hpa takes either --cpu-utilization or --memory-utilization, not both"
                    ),
                    (None, Some(memory)) => (ResourceMetric::Memory, memory),
                    (cpu, _) => (ResourceMetric::Cpu, cpu.unwrap_or(DEFAULT_HPA_CPU_UTILIZATION)),
                };
                Some(ScalingPolicy::Hpa(HpaPolicy {
                    metric,
                    target_utilization_percent: i32::try_from(target).unwrap_or(i32::MAX),
                    min_replicas,
                    max_replicas,
                }))
            }
            Autoscaler::Keda => {
                let mut policy = EventDrivenPolicy::new(min_replicas, max_replicas);
                policy.polling_interval_seconds = self.polling_interval;
                policy.cooldown_seconds = self.cooldown_period;
                if let Some(address) = self
                    .prometheus_address
                    .clone()
                    .or_else(|| settings.prometheus_address.clone())
                {
                    policy.baseline.server_address = address;
                }
                if let Some(cpu) = self.cpu_utilization {
                    policy = policy.with_trigger(Trigger::utilization(ResourceMetric::Cpu, cpu));
                }
                if let Some(memory) = self.memory_utilization {
                    policy = policy.with_trigger(Trigger::utilization(ResourceMetric::Memory, memory));
                }
                Some(ScalingPolicy::EventDriven(policy))
            }
        };
        Ok(policy)
    }
}

/// Reconcile the Deployment, Service and autoscaler for a workload
pub async fn create_deployment(
    cluster_config: &ClusterConfig,
    settings: &CliConfig,
    args: CreateDeploymentArgs,
    format: OutputFormat,
) -> Result<()> {
    let workload = args.workload(settings)?;
    let policy = args.scaling_policy(settings)?;
    if let Some(policy) = &policy {
        policy.validate()?;
    }

    let cluster = KubeCluster::connect(cluster_config)
        .await
        .context("Failed to connect to cluster")?;

    let result = Reconciler::new(&cluster)
        .apply(&workload, args.exposure(settings), policy.as_ref())
        .await
        .with_context(|| format!("Failed to deploy {}/{}", workload.namespace, workload.name))?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => print_result(&result),
    }

    Ok(())
}

fn verb(created: bool) -> &'static str {
    if created {
        "created"
    } else {
        "updated"
    }
}

fn print_result(result: &ReconcileResult) {
    print_success(&format!(
        "Deployment {} {}",
        result.deployment.name,
        verb(result.deployment.created)
    ));
    print_success(&format!(
        "Service {} {}",
        result.service.name,
        verb(result.service.created)
    ));
    println!("Service IP: {}", or_dash(result.service_address.as_deref()));

    match &result.scaling_policy {
        ScalingOutcome::Applied {
            kind,
            name,
            created,
        } => print_success(&format!("{} {} {}", kind, name, verb(*created))),
        ScalingOutcome::Failed { kind, name, error } => {
            print_warning(&format!("{} {} was not applied: {}", kind, name, error))
        }
        ScalingOutcome::Skipped => println!("Autoscaling: none"),
    }
}
