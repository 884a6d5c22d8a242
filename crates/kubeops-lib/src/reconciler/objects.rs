//! Construction of the Kubernetes objects a workload reconciles to

use crate::cluster::SCALED_OBJECT;
use crate::error::{Error, Result};
use crate::models::{
    app_labels, EventDrivenPolicy, HpaPolicy, ServiceExposure, Trigger, WorkloadSpec,
};
use crate::quantity::parse_quantity;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::autoscaling::v2::{
    CrossVersionObjectReference, HorizontalPodAutoscaler, HorizontalPodAutoscalerSpec,
    MetricSpec, MetricTarget, ResourceMetricSource,
};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, PodSpec, PodTemplateSpec, ResourceRequirements, Service,
    ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use serde::Serialize;
use std::collections::BTreeMap;

/// Validated CPU and memory settings of a workload's container
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ContainerResources {
    cpu_request: Quantity,
    cpu_limit: Quantity,
    memory_request: Quantity,
    memory_limit: Quantity,
}

impl ContainerResources {
    pub(crate) fn parse(spec: &WorkloadSpec) -> Result<Self> {
        Ok(Self {
            cpu_request: parse_quantity("cpu-request", &spec.cpu_request)?,
            cpu_limit: parse_quantity("cpu-limit", &spec.cpu_limit)?,
            memory_request: parse_quantity("ram-request", &spec.memory_request)?,
            memory_limit: parse_quantity("ram-limit", &spec.memory_limit)?,
        })
    }

    /// Overwrite cpu and memory entries, leaving any other resource keys alone
    fn apply_to(&self, requirements: &mut ResourceRequirements) {
        let requests = requirements.requests.get_or_insert_with(BTreeMap::new);
        requests.insert("cpu".to_string(), self.cpu_request.clone());
        requests.insert("memory".to_string(), self.memory_request.clone());

        let limits = requirements.limits.get_or_insert_with(BTreeMap::new);
        limits.insert("cpu".to_string(), self.cpu_limit.clone());
        limits.insert("memory".to_string(), self.memory_limit.clone());
    }
}

/// Fresh single-replica Deployment for a workload
pub(crate) fn new_deployment(spec: &WorkloadSpec, resources: &ContainerResources) -> Deployment {
    let ports: Vec<ContainerPort> = spec
        .container_ports
        .iter()
        .map(|&port| ContainerPort {
            container_port: port,
            ..Default::default()
        })
        .collect();

    let mut requirements = ResourceRequirements::default();
    resources.apply_to(&mut requirements);

    let container = Container {
        name: spec.name.clone(),
        image: Some(spec.image.clone()),
        ports: (!ports.is_empty()).then_some(ports),
        resources: Some(requirements),
        ..Default::default()
    };

    Deployment {
        metadata: ObjectMeta {
            name: Some(spec.name.clone()),
            namespace: Some(spec.namespace.clone()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(app_labels(&spec.name)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(app_labels(&spec.name)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Overwrite image and resources of the first container in place.
///
/// Labels, replica count and any additional containers are left untouched.
pub(crate) fn update_deployment(
    deployment: &mut Deployment,
    spec: &WorkloadSpec,
    resources: &ContainerResources,
) -> Result<()> {
    let container = deployment
        .spec
        .as_mut()
        .and_then(|s| s.template.spec.as_mut())
        .and_then(|pod| pod.containers.first_mut())
        .ok_or_else(|| Error::UnexpectedState {
            kind: "Deployment",
            name: spec.name.clone(),
            reason: "pod template has no containers".to_string(),
        })?;

    container.image = Some(spec.image.clone());
    resources.apply_to(container.resources.get_or_insert_with(Default::default));
    Ok(())
}

/// Service ports named `port-<i>` in input order
pub(crate) fn service_ports(ports: &[i32]) -> Vec<ServicePort> {
    ports
        .iter()
        .enumerate()
        .map(|(i, &port)| ServicePort {
            name: Some(format!("port-{}", i)),
            port,
            ..Default::default()
        })
        .collect()
}

pub(crate) fn new_service(
    name: &str,
    workload: &str,
    namespace: &str,
    ports: Vec<ServicePort>,
    exposure: ServiceExposure,
) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(app_labels(workload)),
            ports: Some(ports),
            type_: Some(exposure.service_type().to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Externally visible address of a Service, preferring load-balancer ingress
pub(crate) fn service_address(service: &Service) -> Option<String> {
    let ingress = service
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .and_then(|ingress| ingress.first())
        .and_then(|i| i.ip.clone().or_else(|| i.hostname.clone()));

    ingress.or_else(|| {
        service
            .spec
            .as_ref()
            .and_then(|s| s.cluster_ip.clone())
            .filter(|ip| !ip.is_empty() && ip != "None")
    })
}

fn deployment_target(workload: &str) -> CrossVersionObjectReference {
    CrossVersionObjectReference {
        api_version: Some("apps/v1".to_string()),
        kind: "Deployment".to_string(),
        name: workload.to_string(),
    }
}

pub(crate) fn hpa_spec(workload: &str, policy: &HpaPolicy) -> HorizontalPodAutoscalerSpec {
    HorizontalPodAutoscalerSpec {
        scale_target_ref: deployment_target(workload),
        min_replicas: Some(policy.min_replicas),
        max_replicas: policy.max_replicas,
        metrics: Some(vec![MetricSpec {
            type_: "Resource".to_string(),
            resource: Some(ResourceMetricSource {
                name: policy.metric.as_str().to_string(),
                target: MetricTarget {
                    type_: "Utilization".to_string(),
                    average_utilization: Some(policy.target_utilization_percent),
                    ..Default::default()
                },
            }),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

pub(crate) fn new_hpa(workload: &str, namespace: &str, policy: &HpaPolicy) -> HorizontalPodAutoscaler {
    HorizontalPodAutoscaler {
        metadata: ObjectMeta {
            name: Some(workload.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(hpa_spec(workload, policy)),
        ..Default::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ScaleTargetRef {
    pub api_version: String,
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ScaledObjectSpec {
    pub scale_target_ref: ScaleTargetRef,
    pub polling_interval: i32,
    pub cooldown_period: i32,
    pub min_replica_count: i32,
    pub max_replica_count: i32,
    pub triggers: Vec<Trigger>,
}

impl ScaledObjectSpec {
    /// Baseline request-latency trigger first, then the caller's triggers
    pub(crate) fn new(workload: &str, policy: &EventDrivenPolicy) -> Self {
        let mut triggers = Vec::with_capacity(policy.triggers.len() + 1);
        triggers.push(policy.baseline.trigger(workload));
        triggers.extend(policy.triggers.iter().cloned());

        Self {
            scale_target_ref: ScaleTargetRef {
                api_version: "apps/v1".to_string(),
                kind: "Deployment".to_string(),
                name: workload.to_string(),
            },
            polling_interval: policy.polling_interval_seconds,
            cooldown_period: policy.cooldown_seconds,
            min_replica_count: policy.min_replicas,
            max_replica_count: policy.max_replicas,
            triggers,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ScaledObject {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: ScaledObjectSpec,
}

impl ScaledObject {
    pub(crate) fn new(workload: &str, namespace: &str, policy: &EventDrivenPolicy) -> Self {
        Self {
            api_version: SCALED_OBJECT.api_version(),
            kind: SCALED_OBJECT.kind.to_string(),
            metadata: ObjectMeta {
                name: Some(workload.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            spec: ScaledObjectSpec::new(workload, policy),
        }
    }
}
