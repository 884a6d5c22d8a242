//! Deployment health reporting
//!
//! Reads back a Deployment's replica status, lists its pods and joins in
//! point-in-time usage from the metrics API. Requests are issued one at a
//! time; a pod whose metrics cannot be fetched is reported without usage
//! instead of failing the whole snapshot.

use crate::cluster::{ClusterHandle, PodMetrics};
use crate::error::{Error, Result};
use crate::models::app_selector;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Pod;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Health of a pod or of a whole deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Everything is running and ready
    Healthy,
    /// Serving, but below the desired replica count or with unhealthy pods
    Degraded,
    /// Not serving
    Unhealthy,
}

impl HealthStatus {
    /// Returns true if the workload is at least partially serving
    pub fn is_operational(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

/// Usage reported by the metrics API for one container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerUsage {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodHealth {
    pub name: String,
    pub phase: String,
    /// True when the pod reports container statuses and all are ready
    pub containers_ready: bool,
    pub status: HealthStatus,
    pub warnings: Vec<String>,
    /// Empty when metrics were unavailable for this pod
    pub usage: Vec<ContainerUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_error: Option<String>,
}

impl PodHealth {
    fn from_pod(pod: &Pod) -> Self {
        let name = pod.metadata.name.clone().unwrap_or_default();
        let status = pod.status.as_ref();
        let phase = status
            .and_then(|s| s.phase.clone())
            .unwrap_or_else(|| "Unknown".to_string());
        let container_statuses = status
            .and_then(|s| s.container_statuses.as_deref())
            .unwrap_or_default();

        let mut warnings = Vec::new();
        if phase != "Running" {
            warnings.push(format!("Pod {} is in {} state", name, phase));
        }
        for container in container_statuses.iter().filter(|c| !c.ready) {
            warnings.push(format!("Container {} is not ready", container.name));
        }

        let containers_ready =
            !container_statuses.is_empty() && container_statuses.iter().all(|c| c.ready);
        let status = if phase == "Running" && containers_ready {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };

        Self {
            name,
            phase,
            containers_ready,
            status,
            warnings,
            usage: Vec::new(),
            metrics_error: None,
        }
    }

    fn attach_metrics(&mut self, metrics: PodMetrics) {
        self.usage = metrics
            .containers
            .into_iter()
            .map(|c| ContainerUsage {
                name: c.name,
                cpu: c.usage.cpu.map(|q| q.0),
                memory: c.usage.memory.map(|q| q.0),
            })
            .collect();
    }
}

/// Point-in-time health of a deployment and its pods
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub deployment_name: String,
    pub namespace: String,
    pub available_replicas: i32,
    pub desired_replicas: i32,
    pub status: HealthStatus,
    pub checked_at: DateTime<Utc>,
    /// Pods in the order the API server listed them
    pub pods: Vec<PodHealth>,
}

impl HealthSnapshot {
    /// Compute overall status from replica counts and pod statuses
    pub fn compute_status(available: i32, desired: i32, pods: &[PodHealth]) -> HealthStatus {
        if desired > 0 && available <= 0 {
            return HealthStatus::Unhealthy;
        }
        let any_unhealthy = pods.iter().any(|p| p.status != HealthStatus::Healthy);
        if available < desired || any_unhealthy {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    pub fn warnings(&self) -> impl Iterator<Item = &str> {
        self.pods
            .iter()
            .flat_map(|p| p.warnings.iter().map(String::as_str))
    }
}

/// State of the KEDA operator in its namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KedaStatus {
    /// The operator Deployment exists
    pub installed: bool,
    /// Pods matching `app=keda-operator`
    pub operator_pods: usize,
    /// Of those, pods in the Running phase
    pub running_pods: usize,
}

/// Name of the KEDA operator Deployment
pub const KEDA_OPERATOR: &str = "keda-operator";

pub struct HealthReporter<'a> {
    cluster: &'a dyn ClusterHandle,
}

impl<'a> HealthReporter<'a> {
    pub fn new(cluster: &'a dyn ClusterHandle) -> Self {
        Self { cluster }
    }

    /// Snapshot the health of a workload.
    ///
    /// Fails when the Deployment is missing or pods cannot be listed.
    /// Per-pod metrics failures are logged and recorded on the pod.
    pub async fn get_health(&self, workload: &str, namespace: &str) -> Result<HealthSnapshot> {
        let deployment = self
            .cluster
            .get_deployment(namespace, workload)
            .await?
            .ok_or_else(|| Error::NotFound {
                kind: "Deployment",
                namespace: namespace.to_string(),
                name: workload.to_string(),
            })?;

        let desired_replicas = deployment
            .spec
            .as_ref()
            .and_then(|s| s.replicas)
            .unwrap_or(1);
        let available_replicas = deployment
            .status
            .as_ref()
            .and_then(|s| s.available_replicas)
            .unwrap_or(0);

        let pods = self
            .cluster
            .list_pods(namespace, &app_selector(workload))
            .await?;
        debug!(namespace, workload, pods = pods.len(), "Listed workload pods");

        let mut pod_health = Vec::with_capacity(pods.len());
        for pod in &pods {
            let mut health = PodHealth::from_pod(pod);
            match self.cluster.get_pod_metrics(namespace, &health.name).await {
                Ok(metrics) => health.attach_metrics(metrics),
                Err(e) => {
                    warn!(namespace, pod = %health.name, error = %e, "Failed to get pod metrics");
                    health.metrics_error = Some(e.to_string());
                }
            }
            pod_health.push(health);
        }

        let status = HealthSnapshot::compute_status(available_replicas, desired_replicas, &pod_health);
        Ok(HealthSnapshot {
            deployment_name: deployment
                .metadata
                .name
                .unwrap_or_else(|| workload.to_string()),
            namespace: namespace.to_string(),
            available_replicas,
            desired_replicas,
            status,
            checked_at: Utc::now(),
            pods: pod_health,
        })
    }

    /// Check whether the KEDA operator is deployed in `namespace`
    pub async fn keda_status(&self, namespace: &str) -> Result<KedaStatus> {
        if self
            .cluster
            .get_deployment(namespace, KEDA_OPERATOR)
            .await?
            .is_none()
        {
            return Ok(KedaStatus {
                installed: false,
                operator_pods: 0,
                running_pods: 0,
            });
        }

        let pods = self
            .cluster
            .list_pods(namespace, &app_selector(KEDA_OPERATOR))
            .await?;
        let running_pods = pods
            .iter()
            .filter(|p| {
                p.status
                    .as_ref()
                    .and_then(|s| s.phase.as_deref())
                    == Some("Running")
            })
            .count();

        Ok(KedaStatus {
            installed: true,
            operator_pods: pods.len(),
            running_pods,
        })
    }
}
