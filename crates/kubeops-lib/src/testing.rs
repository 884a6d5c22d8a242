//! In-memory cluster handle for tests

use crate::cluster::{ClusterHandle, CustomResourceRef, PodMetrics};
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::error::ErrorResponse;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

pub(crate) fn api_error(code: u16, message: &str) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: message.to_string(),
        reason: "Test".to_string(),
        code,
    })
}

/// Stores objects by `(namespace, name)` and counts every call
#[derive(Default)]
pub(crate) struct FakeCluster {
    pub deployments: Mutex<HashMap<Key, Deployment>>,
    pub services: Mutex<HashMap<Key, Service>>,
    pub hpas: Mutex<HashMap<Key, HorizontalPodAutoscaler>>,
    pub custom: Mutex<HashMap<Key, Value>>,
    pub pods: Mutex<Vec<Pod>>,
    pub metrics: Mutex<HashMap<String, PodMetrics>>,
    /// Custom resource endpoints answer 503
    pub custom_unavailable: bool,
    /// Deployment reads answer 403
    pub deployments_forbidden: bool,
    /// Pod list requests answer 403
    pub pods_forbidden: bool,
    pub calls: AtomicUsize,
    pub created: AtomicUsize,
    pub updated: AtomicUsize,
    pub patches: Mutex<Vec<Value>>,
    pub metrics_requests: AtomicUsize,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn bump_version(meta: &mut k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta) {
        let next = meta
            .resource_version
            .as_deref()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0)
            + 1;
        meta.resource_version = Some(next.to_string());
    }

    fn name_of(meta: &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta) -> String {
        meta.name.clone().unwrap_or_default()
    }

    pub fn deployment(&self, namespace: &str, name: &str) -> Option<Deployment> {
        self.deployments.lock().unwrap().get(&key(namespace, name)).cloned()
    }

    pub fn service(&self, namespace: &str, name: &str) -> Option<Service> {
        self.services.lock().unwrap().get(&key(namespace, name)).cloned()
    }

    pub fn insert_deployment(&self, namespace: &str, deployment: Deployment) {
        let name = Self::name_of(&deployment.metadata);
        self.deployments
            .lock()
            .unwrap()
            .insert(key(namespace, &name), deployment);
    }

    pub fn insert_service(&self, namespace: &str, service: Service) {
        let name = Self::name_of(&service.metadata);
        self.services.lock().unwrap().insert(key(namespace, &name), service);
    }
}

#[async_trait]
impl ClusterHandle for FakeCluster {
    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>> {
        self.record();
        if self.deployments_forbidden {
            return Err(Error::api("get deployment", api_error(403, "forbidden")));
        }
        Ok(self.deployment(namespace, name))
    }

    async fn create_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<Deployment> {
        self.record();
        self.created.fetch_add(1, Ordering::SeqCst);
        let mut stored = deployment.clone();
        Self::bump_version(&mut stored.metadata);
        self.insert_deployment(namespace, stored.clone());
        Ok(stored)
    }

    async fn update_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<Deployment> {
        self.record();
        self.updated.fetch_add(1, Ordering::SeqCst);
        let mut stored = deployment.clone();
        Self::bump_version(&mut stored.metadata);
        self.insert_deployment(namespace, stored.clone());
        Ok(stored)
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>> {
        self.record();
        Ok(self.service(namespace, name))
    }

    async fn create_service(&self, namespace: &str, service: &Service) -> Result<Service> {
        self.record();
        self.created.fetch_add(1, Ordering::SeqCst);
        let mut stored = service.clone();
        Self::bump_version(&mut stored.metadata);
        if let Some(spec) = stored.spec.as_mut() {
            spec.cluster_ip.get_or_insert_with(|| "10.96.0.10".to_string());
        }
        self.insert_service(namespace, stored.clone());
        Ok(stored)
    }

    async fn update_service(&self, namespace: &str, service: &Service) -> Result<Service> {
        self.record();
        self.updated.fetch_add(1, Ordering::SeqCst);
        let mut stored = service.clone();
        Self::bump_version(&mut stored.metadata);
        self.insert_service(namespace, stored.clone());
        Ok(stored)
    }

    async fn get_hpa(&self, namespace: &str, name: &str) -> Result<Option<HorizontalPodAutoscaler>> {
        self.record();
        Ok(self.hpas.lock().unwrap().get(&key(namespace, name)).cloned())
    }

    async fn create_hpa(
        &self,
        namespace: &str,
        hpa: &HorizontalPodAutoscaler,
    ) -> Result<HorizontalPodAutoscaler> {
        self.record();
        self.created.fetch_add(1, Ordering::SeqCst);
        let name = Self::name_of(&hpa.metadata);
        self.hpas.lock().unwrap().insert(key(namespace, &name), hpa.clone());
        Ok(hpa.clone())
    }

    async fn update_hpa(
        &self,
        namespace: &str,
        hpa: &HorizontalPodAutoscaler,
    ) -> Result<HorizontalPodAutoscaler> {
        self.record();
        self.updated.fetch_add(1, Ordering::SeqCst);
        let name = Self::name_of(&hpa.metadata);
        self.hpas.lock().unwrap().insert(key(namespace, &name), hpa.clone());
        Ok(hpa.clone())
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>> {
        self.record();
        if self.pods_forbidden {
            return Err(Error::api("list pods", api_error(403, "forbidden")));
        }
        let (label, value) = label_selector.split_once('=').unwrap_or((label_selector, ""));
        Ok(self
            .pods
            .lock()
            .unwrap()
            .iter()
            .filter(|pod| pod.metadata.namespace.as_deref() == Some(namespace))
            .filter(|pod| {
                pod.metadata
                    .labels
                    .as_ref()
                    .and_then(|labels| labels.get(label))
                    .map_or(false, |v| v == value)
            })
            .cloned()
            .collect())
    }

    async fn get_pod_metrics(&self, _namespace: &str, pod: &str) -> Result<PodMetrics> {
        self.record();
        self.metrics_requests.fetch_add(1, Ordering::SeqCst);
        self.metrics
            .lock()
            .unwrap()
            .get(pod)
            .cloned()
            .ok_or_else(|| Error::api("get pod metrics", api_error(404, "the server could not find the requested resource")))
    }

    async fn get_custom(
        &self,
        _resource: &CustomResourceRef,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Value>> {
        self.record();
        if self.custom_unavailable {
            return Err(Error::api("check for existing ScaledObject", api_error(503, "service unavailable")));
        }
        Ok(self.custom.lock().unwrap().get(&key(namespace, name)).cloned())
    }

    async fn create_custom(
        &self,
        _resource: &CustomResourceRef,
        namespace: &str,
        body: &Value,
    ) -> Result<Value> {
        self.record();
        self.created.fetch_add(1, Ordering::SeqCst);
        let name = body["metadata"]["name"].as_str().unwrap_or_default().to_string();
        self.custom
            .lock()
            .unwrap()
            .insert(key(namespace, &name), body.clone());
        Ok(body.clone())
    }

    async fn merge_patch_custom(
        &self,
        _resource: &CustomResourceRef,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<Value> {
        self.record();
        self.updated.fetch_add(1, Ordering::SeqCst);
        self.patches.lock().unwrap().push(patch.clone());
        let mut store = self.custom.lock().unwrap();
        let object = store
            .get_mut(&key(namespace, name))
            .ok_or_else(|| Error::api("patch ScaledObject", api_error(404, "not found")))?;
        if let Some(spec) = patch.get("spec") {
            object["spec"] = spec.clone();
        }
        Ok(object.clone())
    }
}
