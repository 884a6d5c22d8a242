//! Idempotent reconciliation of a workload's Deployment, Service and autoscaler
//!
//! Every step follows the same read-then-write pattern: get the object,
//! create it when the API server reports it missing, otherwise overwrite the
//! owned fields and update it. There is no retry and no optimistic
//! concurrency check, so concurrent writers race and the last one wins.

mod objects;

#[cfg(test)]
mod tests;

use crate::cluster::{ClusterHandle, SCALED_OBJECT};
use crate::error::Result;
use crate::models::{
    parse_ports, service_name, EventDrivenPolicy, HpaPolicy, ReconcileResult, ResourceOutcome,
    ScalingOutcome, ScalingPolicy, ServiceExposure, WorkloadSpec,
};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use objects::{ContainerResources, ScaledObject};
use serde_json::json;
use tracing::{info, warn};

/// An object as stored by the API server after reconciliation
#[derive(Debug, Clone)]
pub struct Reconciled<T> {
    pub object: T,
    /// True when the object did not exist before
    pub created: bool,
}

/// Brings a cluster's objects in line with workload specs
pub struct Reconciler<'a> {
    cluster: &'a dyn ClusterHandle,
}

impl<'a> Reconciler<'a> {
    pub fn new(cluster: &'a dyn ClusterHandle) -> Self {
        Self { cluster }
    }

    /// Create or update the Deployment for `spec`.
    ///
    /// Quantities are validated before the first request, so malformed
    /// input never reaches the API server.
    pub async fn reconcile_workload(&self, spec: &WorkloadSpec) -> Result<Reconciled<Deployment>> {
        let resources = ContainerResources::parse(spec)?;
        let (namespace, name) = spec.key();

        match self.cluster.get_deployment(namespace, name).await? {
            None => {
                let deployment = objects::new_deployment(spec, &resources);
                let created = self.cluster.create_deployment(namespace, &deployment).await?;
                info!(namespace, deployment = name, "Created deployment");
                Ok(Reconciled {
                    object: created,
                    created: true,
                })
            }
            Some(mut existing) => {
                objects::update_deployment(&mut existing, spec, &resources)?;
                let updated = self.cluster.update_deployment(namespace, &existing).await?;
                info!(namespace, deployment = name, "Updated deployment");
                Ok(Reconciled {
                    object: updated,
                    created: false,
                })
            }
        }
    }

    /// Create or update the `<workload>-service` Service.
    ///
    /// An existing Service only has its port list replaced; its selector and
    /// type stay as they are.
    pub async fn reconcile_service<S: AsRef<str> + Sync>(
        &self,
        workload: &str,
        namespace: &str,
        ports: &[S],
        exposure: ServiceExposure,
    ) -> Result<Reconciled<Service>> {
        let ports = objects::service_ports(&parse_ports(ports)?);
        let name = service_name(workload);

        match self.cluster.get_service(namespace, &name).await? {
            None => {
                let service = objects::new_service(&name, workload, namespace, ports, exposure);
                let created = self.cluster.create_service(namespace, &service).await?;
                info!(namespace, service = %name, service_type = exposure.service_type(), "Created service");
                Ok(Reconciled {
                    object: created,
                    created: true,
                })
            }
            Some(mut existing) => {
                existing.spec.get_or_insert_with(Default::default).ports = Some(ports);
                let updated = self.cluster.update_service(namespace, &existing).await?;
                info!(namespace, service = %name, "Updated service");
                Ok(Reconciled {
                    object: updated,
                    created: false,
                })
            }
        }
    }

    /// Create or update the autoscaler targeting the workload's Deployment
    pub async fn reconcile_scaling_policy(
        &self,
        workload: &str,
        namespace: &str,
        policy: &ScalingPolicy,
    ) -> Result<ResourceOutcome> {
        policy.validate()?;
        match policy {
            ScalingPolicy::Hpa(hpa) => self.reconcile_hpa(workload, namespace, hpa).await,
            ScalingPolicy::EventDriven(event_driven) => {
                self.reconcile_scaled_object(workload, namespace, event_driven)
                    .await
            }
        }
    }

    async fn reconcile_hpa(
        &self,
        workload: &str,
        namespace: &str,
        policy: &HpaPolicy,
    ) -> Result<ResourceOutcome> {
        let created = match self.cluster.get_hpa(namespace, workload).await? {
            None => {
                let hpa = objects::new_hpa(workload, namespace, policy);
                self.cluster.create_hpa(namespace, &hpa).await?;
                info!(namespace, hpa = workload, "Created horizontal pod autoscaler");
                true
            }
            Some(mut existing) => {
                existing.spec = Some(objects::hpa_spec(workload, policy));
                self.cluster.update_hpa(namespace, &existing).await?;
                info!(namespace, hpa = workload, "Updated horizontal pod autoscaler");
                false
            }
        };

        Ok(ResourceOutcome {
            name: workload.to_string(),
            created,
        })
    }

    async fn reconcile_scaled_object(
        &self,
        workload: &str,
        namespace: &str,
        policy: &EventDrivenPolicy,
    ) -> Result<ResourceOutcome> {
        let scaled_object = ScaledObject::new(workload, namespace, policy);

        let created = match self
            .cluster
            .get_custom(&SCALED_OBJECT, namespace, workload)
            .await?
        {
            None => {
                let body = serde_json::to_value(&scaled_object)?;
                self.cluster
                    .create_custom(&SCALED_OBJECT, namespace, &body)
                    .await?;
                info!(namespace, scaled_object = workload, "Created scaled object");
                true
            }
            Some(_) => {
                let patch = json!({ "spec": serde_json::to_value(&scaled_object.spec)? });
                self.cluster
                    .merge_patch_custom(&SCALED_OBJECT, namespace, workload, &patch)
                    .await?;
                info!(namespace, scaled_object = workload, "Updated scaled object");
                false
            }
        };

        Ok(ResourceOutcome {
            name: workload.to_string(),
            created,
        })
    }

    /// Reconcile the full Deployment, Service and autoscaler triple.
    ///
    /// Deployment and Service failures abort and are returned. A failing
    /// scaling policy is reported in the result and leaves the Deployment
    /// and Service in place.
    pub async fn apply(
        &self,
        workload: &WorkloadSpec,
        exposure: ServiceExposure,
        policy: Option<&ScalingPolicy>,
    ) -> Result<ReconcileResult> {
        let ports: Vec<String> = workload
            .container_ports
            .iter()
            .map(ToString::to_string)
            .collect();
        ContainerResources::parse(workload)?;
        parse_ports(&ports)?;
        if let Some(policy) = policy {
            policy.validate()?;
        }

        let deployment = self.reconcile_workload(workload).await?;
        let service = self
            .reconcile_service(&workload.name, &workload.namespace, &ports, exposure)
            .await?;

        let scaling_policy = match policy {
            None => ScalingOutcome::Skipped,
            Some(policy) => {
                match self
                    .reconcile_scaling_policy(&workload.name, &workload.namespace, policy)
                    .await
                {
                    Ok(outcome) => ScalingOutcome::Applied {
                        kind: policy.object_kind().to_string(),
                        name: outcome.name,
                        created: outcome.created,
                    },
                    Err(e) => {
                        warn!(
                            namespace = %workload.namespace,
                            workload = %workload.name,
                            error = %e,
                            "Failed to reconcile scaling policy"
                        );
                        ScalingOutcome::Failed {
                            kind: policy.object_kind().to_string(),
                            name: workload.name.clone(),
                            error: e.to_string(),
                        }
                    }
                }
            }
        };

        Ok(ReconcileResult {
            deployment: ResourceOutcome {
                name: object_name(&deployment.object, &workload.name),
                created: deployment.created,
            },
            service: ResourceOutcome {
                name: service
                    .object
                    .metadata
                    .name
                    .clone()
                    .unwrap_or_else(|| service_name(&workload.name)),
                created: service.created,
            },
            service_address: objects::service_address(&service.object),
            scaling_policy,
        })
    }
}

fn object_name(deployment: &Deployment, fallback: &str) -> String {
    deployment
        .metadata
        .name
        .clone()
        .unwrap_or_else(|| fallback.to_string())
}
