//! `kube`-backed cluster handle

use super::{ClusterConfig, ClusterHandle, CustomResourceRef, PodMetrics};
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::api::{Api, ApiResource, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::core::GroupVersionKind;
use kube::{Client, Config};
use serde_json::Value;
use tracing::debug;

/// Cluster handle talking to a live API server
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    /// Build a client from explicit connection settings
    pub async fn connect(config: &ClusterConfig) -> Result<Self> {
        let options = KubeConfigOptions {
            context: config.context.clone(),
            ..Default::default()
        };

        let kube_config = match (&config.kubeconfig, &config.context) {
            (Some(path), _) => {
                debug!(path = %path.display(), context = ?config.context, "Loading kubeconfig file");
                let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                    Error::ClientConfig(format!("failed to read {}: {}", path.display(), e))
                })?;
                Config::from_custom_kubeconfig(kubeconfig, &options)
                    .await
                    .map_err(|e| Error::ClientConfig(e.to_string()))?
            }
            (None, Some(context)) => {
                debug!(context = %context, "Using default kubeconfig with explicit context");
                Config::from_kubeconfig(&options)
                    .await
                    .map_err(|e| Error::ClientConfig(format!("context '{}': {}", context, e)))?
            }
            (None, None) => {
                debug!("Inferring cluster configuration");
                Config::infer()
                    .await
                    .map_err(|e| Error::ClientConfig(e.to_string()))?
            }
        };

        let client =
            Client::try_from(kube_config).map_err(|e| Error::ClientConfig(e.to_string()))?;
        Ok(Self { client })
    }

    /// Wrap an already-built client
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn services(&self, namespace: &str) -> Api<Service> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn hpas(&self, namespace: &str) -> Api<HorizontalPodAutoscaler> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn custom(&self, resource: &CustomResourceRef, namespace: &str) -> Api<DynamicObject> {
        let gvk = GroupVersionKind::gvk(resource.group, resource.version, resource.kind);
        let api_resource = ApiResource::from_gvk_with_plural(&gvk, resource.plural);
        Api::namespaced_with(self.client.clone(), namespace, &api_resource)
    }
}

fn object_name(name: Option<&String>, kind: &'static str) -> Result<String> {
    name.cloned().ok_or_else(|| Error::UnexpectedState {
        kind,
        name: String::new(),
        reason: "object has no metadata.name".to_string(),
    })
}

#[async_trait]
impl ClusterHandle for KubeCluster {
    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>> {
        debug!(namespace, name, "GET deployment");
        self.deployments(namespace)
            .get_opt(name)
            .await
            .map_err(|e| Error::api(format!("get deployment {}", name), e))
    }

    async fn create_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<Deployment> {
        let name = object_name(deployment.metadata.name.as_ref(), "Deployment")?;
        debug!(namespace, name = %name, "POST deployment");
        self.deployments(namespace)
            .create(&PostParams::default(), deployment)
            .await
            .map_err(|e| Error::api(format!("create deployment {}", name), e))
    }

    async fn update_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<Deployment> {
        let name = object_name(deployment.metadata.name.as_ref(), "Deployment")?;
        debug!(namespace, name = %name, "PUT deployment");
        self.deployments(namespace)
            .replace(&name, &PostParams::default(), deployment)
            .await
            .map_err(|e| Error::api(format!("update deployment {}", name), e))
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>> {
        debug!(namespace, name, "GET service");
        self.services(namespace)
            .get_opt(name)
            .await
            .map_err(|e| Error::api(format!("get service {}", name), e))
    }

    async fn create_service(&self, namespace: &str, service: &Service) -> Result<Service> {
        let name = object_name(service.metadata.name.as_ref(), "Service")?;
        debug!(namespace, name = %name, "POST service");
        self.services(namespace)
            .create(&PostParams::default(), service)
            .await
            .map_err(|e| Error::api(format!("create service {}", name), e))
    }

    async fn update_service(&self, namespace: &str, service: &Service) -> Result<Service> {
        let name = object_name(service.metadata.name.as_ref(), "Service")?;
        debug!(namespace, name = %name, "PUT service");
        self.services(namespace)
            .replace(&name, &PostParams::default(), service)
            .await
            .map_err(|e| Error::api(format!("update service {}", name), e))
    }

    async fn get_hpa(&self, namespace: &str, name: &str) -> Result<Option<HorizontalPodAutoscaler>> {
        debug!(namespace, name, "GET horizontalpodautoscaler");
        self.hpas(namespace)
            .get_opt(name)
            .await
            .map_err(|e| Error::api(format!("get horizontal pod autoscaler {}", name), e))
    }

    async fn create_hpa(
        &self,
        namespace: &str,
        hpa: &HorizontalPodAutoscaler,
    ) -> Result<HorizontalPodAutoscaler> {
        let name = object_name(hpa.metadata.name.as_ref(), "HorizontalPodAutoscaler")?;
        debug!(namespace, name = %name, "POST horizontalpodautoscaler");
        self.hpas(namespace)
            .create(&PostParams::default(), hpa)
            .await
            .map_err(|e| Error::api(format!("create horizontal pod autoscaler {}", name), e))
    }

    async fn update_hpa(
        &self,
        namespace: &str,
        hpa: &HorizontalPodAutoscaler,
    ) -> Result<HorizontalPodAutoscaler> {
        let name = object_name(hpa.metadata.name.as_ref(), "HorizontalPodAutoscaler")?;
        debug!(namespace, name = %name, "PUT horizontalpodautoscaler");
        self.hpas(namespace)
            .replace(&name, &PostParams::default(), hpa)
            .await
            .map_err(|e| Error::api(format!("update horizontal pod autoscaler {}", name), e))
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>> {
        debug!(namespace, label_selector, "LIST pods");
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = pods
            .list(&ListParams::default().labels(label_selector))
            .await
            .map_err(|e| Error::api(format!("list pods with {}", label_selector), e))?;
        Ok(list.items)
    }

    async fn get_pod_metrics(&self, namespace: &str, pod: &str) -> Result<PodMetrics> {
        debug!(namespace, pod, "GET pod metrics");
        let metrics: Api<PodMetrics> = Api::namespaced(self.client.clone(), namespace);
        metrics
            .get(pod)
            .await
            .map_err(|e| Error::api(format!("get metrics for pod {}", pod), e))
    }

    async fn get_custom(
        &self,
        resource: &CustomResourceRef,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Value>> {
        debug!(namespace, name, kind = resource.kind, "GET custom resource");
        let object = self
            .custom(resource, namespace)
            .get_opt(name)
            .await
            .map_err(|e| Error::api(format!("check for existing {} {}", resource.kind, name), e))?;
        object.map(serde_json::to_value).transpose().map_err(Error::from)
    }

    async fn create_custom(
        &self,
        resource: &CustomResourceRef,
        namespace: &str,
        body: &Value,
    ) -> Result<Value> {
        let object: DynamicObject = serde_json::from_value(body.clone())?;
        let name = object_name(object.metadata.name.as_ref(), resource.kind)?;
        debug!(namespace, name = %name, kind = resource.kind, "POST custom resource");
        let created = self
            .custom(resource, namespace)
            .create(&PostParams::default(), &object)
            .await
            .map_err(|e| Error::api(format!("create {} {}", resource.kind, name), e))?;
        Ok(serde_json::to_value(created)?)
    }

    async fn merge_patch_custom(
        &self,
        resource: &CustomResourceRef,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<Value> {
        debug!(namespace, name, kind = resource.kind, "PATCH custom resource");
        let patched = self
            .custom(resource, namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map_err(|e| Error::api(format!("patch {} {}", resource.kind, name), e))?;
        Ok(serde_json::to_value(patched)?)
    }
}
