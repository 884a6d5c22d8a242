//! Core data models for workload reconciliation

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label key linking a Deployment, its pods and its Service
pub const APP_LABEL: &str = "app";

/// Name of the Service fronting a workload.
///
/// The suffix is always appended, even when the workload name already
/// ends in `-service`.
pub fn service_name(workload: &str) -> String {
    format!("{}-service", workload)
}

/// Label selector matching the pods of a workload
pub fn app_selector(workload: &str) -> String {
    format!("{}={}", APP_LABEL, workload)
}

/// Labels applied to a workload's pod template and used as Service selector
pub fn app_labels(workload: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(APP_LABEL.to_string(), workload.to_string())])
}

/// Parse port strings such as `["80", "443"]`, keeping their order.
pub fn parse_ports<S: AsRef<str>>(values: &[S]) -> Result<Vec<i32>> {
    values
        .iter()
        .map(|value| {
            let value = value.as_ref();
            value
                .trim()
                .parse::<i32>()
                .ok()
                .filter(|port| (1..=65535).contains(port))
                .ok_or_else(|| Error::InvalidPort {
                    value: value.to_string(),
                })
        })
        .collect()
}

/// Desired state of a single-container workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    pub name: String,
    pub namespace: String,
    pub image: String,
    /// Container ports in first-seen order, without duplicates
    pub container_ports: Vec<i32>,
    pub cpu_request: String,
    pub cpu_limit: String,
    pub memory_request: String,
    pub memory_limit: String,
}

impl WorkloadSpec {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        image: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            image: image.into(),
            container_ports: Vec::new(),
            cpu_request: "100m".to_string(),
            cpu_limit: "500m".to_string(),
            memory_request: "128Mi".to_string(),
            memory_limit: "512Mi".to_string(),
        }
    }

    pub fn with_ports(mut self, ports: impl IntoIterator<Item = i32>) -> Self {
        self.container_ports.clear();
        for port in ports {
            if !self.container_ports.contains(&port) {
                self.container_ports.push(port);
            }
        }
        self
    }

    pub fn with_cpu(mut self, request: impl Into<String>, limit: impl Into<String>) -> Self {
        self.cpu_request = request.into();
        self.cpu_limit = limit.into();
        self
    }

    pub fn with_memory(mut self, request: impl Into<String>, limit: impl Into<String>) -> Self {
        self.memory_request = request.into();
        self.memory_limit = limit.into();
        self
    }

    /// `(namespace, name)` identity of the workload
    pub fn key(&self) -> (&str, &str) {
        (&self.namespace, &self.name)
    }
}

/// How the reconciled Service is exposed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceExposure {
    /// Reachable only from inside the cluster
    #[serde(alias = "ClusterIP")]
    ClusterIp,
    /// Externally reachable through a cloud load balancer
    #[serde(alias = "LoadBalancer")]
    LoadBalancer,
}

impl ServiceExposure {
    /// Value of `spec.type` on the Service object
    pub fn service_type(&self) -> &'static str {
        match self {
            ServiceExposure::ClusterIp => "ClusterIP",
            ServiceExposure::LoadBalancer => "LoadBalancer",
        }
    }
}

/// Resource a utilization target is measured against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceMetric {
    Cpu,
    Memory,
}

impl ResourceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceMetric::Cpu => "cpu",
            ResourceMetric::Memory => "memory",
        }
    }
}

/// Autoscaling policy attached to a workload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ScalingPolicy {
    /// Native HorizontalPodAutoscaler on a resource utilization metric
    Hpa(HpaPolicy),
    /// KEDA ScaledObject driven by event-source triggers
    EventDriven(EventDrivenPolicy),
}

impl ScalingPolicy {
    pub fn replica_bounds(&self) -> (i32, i32) {
        match self {
            ScalingPolicy::Hpa(p) => (p.min_replicas, p.max_replicas),
            ScalingPolicy::EventDriven(p) => (p.min_replicas, p.max_replicas),
        }
    }

    /// Human-readable kind of the object this policy reconciles to
    pub fn object_kind(&self) -> &'static str {
        match self {
            ScalingPolicy::Hpa(_) => "HorizontalPodAutoscaler",
            ScalingPolicy::EventDriven(_) => "ScaledObject",
        }
    }

    /// Reject bounds and targets the autoscaler controllers would refuse
    pub fn validate(&self) -> Result<()> {
        let (min, max) = self.replica_bounds();
        if max < 1 {
            return Err(Error::InvalidPolicy(format!(
                "max replicas must be at least 1, got {}",
                max
            )));
        }
        if min < 0 || min > max {
            return Err(Error::InvalidPolicy(format!(
                "min replicas {} must be between 0 and max replicas {}",
                min, max
            )));
        }

        match self {
            ScalingPolicy::Hpa(p) => {
                if p.min_replicas < 1 {
                    return Err(Error::InvalidPolicy(
                        "HorizontalPodAutoscaler needs at least 1 min replica".to_string(),
                    ));
                }
                validate_utilization(p.target_utilization_percent)?;
            }
            ScalingPolicy::EventDriven(p) => {
                if p.polling_interval_seconds < 1 {
                    return Err(Error::InvalidPolicy(
                        "polling interval must be at least 1 second".to_string(),
                    ));
                }
                if p.cooldown_seconds < 0 {
                    return Err(Error::InvalidPolicy(
                        "cooldown period must not be negative".to_string(),
                    ));
                }
                for trigger in p.triggers.iter().filter(|t| t.is_utilization()) {
                    let value = trigger.metadata.get("value").map(String::as_str).unwrap_or("");
                    let percent = value.parse::<i32>().map_err(|_| {
                        Error::InvalidPolicy(format!(
                            "{} trigger needs an integer utilization value, got \"{}\"",
                            trigger.trigger_type, value
                        ))
                    })?;
                    validate_utilization(percent)?;
                }
            }
        }
        Ok(())
    }
}

/// Targets above 100 are valid: utilization is measured against requests.
fn validate_utilization(percent: i32) -> Result<()> {
    if percent >= 1 {
        Ok(())
    } else {
        Err(Error::InvalidPolicy(format!(
            "utilization target must be at least 1, got {}",
            percent
        )))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HpaPolicy {
    pub metric: ResourceMetric,
    pub target_utilization_percent: i32,
    pub min_replicas: i32,
    pub max_replicas: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDrivenPolicy {
    /// Caller triggers, appended after the baseline query trigger
    pub triggers: Vec<Trigger>,
    pub polling_interval_seconds: i32,
    pub cooldown_seconds: i32,
    pub min_replicas: i32,
    pub max_replicas: i32,
    pub baseline: PrometheusBaseline,
}

impl EventDrivenPolicy {
    pub fn new(min_replicas: i32, max_replicas: i32) -> Self {
        Self {
            triggers: Vec::new(),
            polling_interval_seconds: 15,
            cooldown_seconds: 300,
            min_replicas,
            max_replicas,
            baseline: PrometheusBaseline::default(),
        }
    }

    pub fn with_trigger(mut self, trigger: Trigger) -> Self {
        self.triggers.push(trigger);
        self
    }
}

/// One KEDA trigger entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    #[serde(rename = "type")]
    pub trigger_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric_type: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl Trigger {
    /// True for the `cpu` and `memory` resource triggers
    pub fn is_utilization(&self) -> bool {
        self.trigger_type == ResourceMetric::Cpu.as_str()
            || self.trigger_type == ResourceMetric::Memory.as_str()
    }

    /// `cpu` or `memory` trigger scaling on average utilization percent
    pub fn utilization(metric: ResourceMetric, percent: u32) -> Self {
        Self {
            trigger_type: metric.as_str().to_string(),
            metric_type: Some("Utilization".to_string()),
            metadata: BTreeMap::from([
                ("type".to_string(), "Utilization".to_string()),
                ("value".to_string(), percent.to_string()),
            ]),
        }
    }
}

/// Settings for the request-latency trigger every ScaledObject carries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrometheusBaseline {
    pub server_address: String,
    pub threshold: String,
    pub activation_threshold: String,
}

impl Default for PrometheusBaseline {
    fn default() -> Self {
        Self {
            server_address: "http://prometheus-server.monitoring.svc.cluster.local".to_string(),
            threshold: "0.5".to_string(),
            activation_threshold: "0.4".to_string(),
        }
    }
}

impl PrometheusBaseline {
    /// Average request duration over five minutes for the workload's pods
    pub fn query(&self, workload: &str) -> String {
        format!(
            "avg(rate(http_request_duration_seconds_sum{{app=\"{w}\"}}[5m])/rate(http_request_duration_seconds_count{{app=\"{w}\"}}[5m]))",
            w = workload
        )
    }

    pub fn trigger(&self, workload: &str) -> Trigger {
        Trigger {
            trigger_type: "prometheus".to_string(),
            metric_type: None,
            metadata: BTreeMap::from([
                ("serverAddress".to_string(), self.server_address.clone()),
                ("query".to_string(), self.query(workload)),
                ("threshold".to_string(), self.threshold.clone()),
                (
                    "activationThreshold".to_string(),
                    self.activation_threshold.clone(),
                ),
                ("queryValue".to_string(), "value".to_string()),
            ]),
        }
    }
}

/// Outcome of reconciling one object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceOutcome {
    pub name: String,
    /// True when the object was created, false when an existing one was updated
    pub created: bool,
}

/// Outcome of the scaling-policy step, which never aborts the workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ScalingOutcome {
    Applied {
        kind: String,
        name: String,
        created: bool,
    },
    Failed {
        kind: String,
        name: String,
        error: String,
    },
    Skipped,
}

/// Result of a full create-deployment reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileResult {
    pub deployment: ResourceOutcome,
    pub service: ResourceOutcome,
    /// Cluster IP or load-balancer ingress of the Service, when assigned
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_address: Option<String>,
    pub scaling_policy: ScalingOutcome,
}
