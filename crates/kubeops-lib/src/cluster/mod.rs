//! Access to a single Kubernetes API server
//!
//! The reconciler and health reporter only see the [`ClusterHandle`] trait.
//! [`KubeCluster`] implements it on top of a `kube` client; tests use an
//! in-memory fake.

mod client;
mod metrics;

pub use client::KubeCluster;
pub use metrics::{ContainerMetrics, ContainerMetricsUsage, PodMetrics};

use crate::error::Result;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{Pod, Service};
use serde_json::Value;
use std::path::PathBuf;

/// Connection settings, built once per invocation
#[derive(Debug, Clone, Default)]
pub struct ClusterConfig {
    /// Explicit kubeconfig file; when unset the client is inferred from
    /// `KUBECONFIG`, `~/.kube/config` or the in-cluster service account
    pub kubeconfig: Option<PathBuf>,
    /// Context to use instead of the kubeconfig's current context
    pub context: Option<String>,
}

impl ClusterConfig {
    pub fn new(kubeconfig: Option<PathBuf>, context: Option<String>) -> Self {
        Self {
            kubeconfig,
            context,
        }
    }
}

/// Group/version/kind of a namespaced custom resource reached through the
/// generic client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustomResourceRef {
    pub group: &'static str,
    pub version: &'static str,
    pub kind: &'static str,
    pub plural: &'static str,
}

impl CustomResourceRef {
    pub fn api_version(&self) -> String {
        format!("{}/{}", self.group, self.version)
    }
}

/// KEDA's event-driven scaling object
pub const SCALED_OBJECT: CustomResourceRef = CustomResourceRef {
    group: "keda.sh",
    version: "v1alpha1",
    kind: "ScaledObject",
    plural: "scaledobjects",
};

/// Operations the reconciler and health reporter need from a cluster.
///
/// Getters return `Ok(None)` when the API server answers 404 and an error
/// for every other failure.
#[async_trait]
pub trait ClusterHandle: Send + Sync {
    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>>;
    async fn create_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<Deployment>;
    async fn update_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<Deployment>;

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>>;
    async fn create_service(&self, namespace: &str, service: &Service) -> Result<Service>;
    async fn update_service(&self, namespace: &str, service: &Service) -> Result<Service>;

    async fn get_hpa(&self, namespace: &str, name: &str) -> Result<Option<HorizontalPodAutoscaler>>;
    async fn create_hpa(
        &self,
        namespace: &str,
        hpa: &HorizontalPodAutoscaler,
    ) -> Result<HorizontalPodAutoscaler>;
    async fn update_hpa(
        &self,
        namespace: &str,
        hpa: &HorizontalPodAutoscaler,
    ) -> Result<HorizontalPodAutoscaler>;

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>>;

    /// Point-in-time usage from the metrics API. Clusters without
    /// metrics-server return an error here, which callers treat as
    /// "metrics unavailable".
    async fn get_pod_metrics(&self, namespace: &str, pod: &str) -> Result<PodMetrics>;

    async fn get_custom(
        &self,
        resource: &CustomResourceRef,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Value>>;
    async fn create_custom(
        &self,
        resource: &CustomResourceRef,
        namespace: &str,
        body: &Value,
    ) -> Result<Value>;
    /// Apply a JSON merge patch
    async fn merge_patch_custom(
        &self,
        resource: &CustomResourceRef,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<Value>;
}
