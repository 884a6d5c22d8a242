//! Reconciliation tests against the in-memory cluster
//!
//! These tests verify:
//! - Create-then-update idempotence for Deployments and Services
//! - Input validation happens before any API call
//! - Scaling-policy failures do not undo the workload

use super::*;
use crate::error::Error;
use crate::models::{HpaPolicy, ResourceMetric, Trigger};
use crate::testing::FakeCluster;
use k8s_openapi::api::core::v1::Container;
use std::sync::atomic::Ordering;

fn workload() -> WorkloadSpec {
    WorkloadSpec::new("web", "shop", "nginx:1.25")
        .with_ports([80, 443])
        .with_cpu("100m", "500m")
        .with_memory("128Mi", "512Mi")
}

fn first_container(deployment: &Deployment) -> &Container {
    &deployment
        .spec
        .as_ref()
        .unwrap()
        .template
        .spec
        .as_ref()
        .unwrap()
        .containers[0]
}

mod workload_tests {
    use super::*;

    #[tokio::test]
    async fn test_first_reconcile_creates_deployment() {
        let cluster = FakeCluster::new();
        let reconciler = Reconciler::new(&cluster);

        let result = reconciler.reconcile_workload(&workload()).await.unwrap();

        assert!(result.created);
        let stored = cluster.deployment("shop", "web").unwrap();
        assert_eq!(stored.spec.as_ref().unwrap().replicas, Some(1));
        assert_eq!(first_container(&stored).image.as_deref(), Some("nginx:1.25"));
    }

    #[tokio::test]
    async fn test_reconcile_twice_is_idempotent() {
        let cluster = FakeCluster::new();
        let reconciler = Reconciler::new(&cluster);
        let spec = workload();

        let first = reconciler.reconcile_workload(&spec).await.unwrap();
        let second = reconciler.reconcile_workload(&spec).await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.object.spec, second.object.spec);
        assert_eq!(cluster.created.load(Ordering::SeqCst), 1);
        assert_eq!(cluster.updated.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_update_touches_only_first_container() {
        let cluster = FakeCluster::new();
        let reconciler = Reconciler::new(&cluster);
        reconciler.reconcile_workload(&workload()).await.unwrap();

        // Someone scaled the deployment and added a sidecar
        let mut live = cluster.deployment("shop", "web").unwrap();
        {
            let spec = live.spec.as_mut().unwrap();
            spec.replicas = Some(4);
            spec.template.spec.as_mut().unwrap().containers.push(Container {
                name: "sidecar".to_string(),
                image: Some("envoy:1.29".to_string()),
                ..Default::default()
            });
        }
        cluster.insert_deployment("shop", live);

        let updated = workload().with_cpu("200m", "1");
        let updated = WorkloadSpec {
            image: "nginx:1.26".to_string(),
            ..updated
        };
        let result = reconciler.reconcile_workload(&updated).await.unwrap();
        assert!(!result.created);

        let stored = cluster.deployment("shop", "web").unwrap();
        let spec = stored.spec.as_ref().unwrap();
        assert_eq!(spec.replicas, Some(4));
        let containers = &spec.template.spec.as_ref().unwrap().containers;
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0].image.as_deref(), Some("nginx:1.26"));
        assert_eq!(containers[1].image.as_deref(), Some("envoy:1.29"));
        let requests = containers[0].resources.as_ref().unwrap().requests.as_ref().unwrap();
        assert_eq!(requests["cpu"].0, "200m");
    }

    #[tokio::test]
    async fn test_invalid_quantity_makes_no_api_call() {
        let cluster = FakeCluster::new();
        let reconciler = Reconciler::new(&cluster);
        let spec = workload().with_cpu("notanumber", "500m");

        let err = reconciler.reconcile_workload(&spec).await.unwrap_err();

        assert!(err.is_invalid_input());
        assert_eq!(cluster.call_count(), 0);
    }

    #[tokio::test]
    async fn test_nano_and_micro_quantities_accepted() {
        let cluster = FakeCluster::new();
        let reconciler = Reconciler::new(&cluster);
        let spec = workload().with_cpu("250000000n", "500000u");

        let result = reconciler.reconcile_workload(&spec).await.unwrap();

        assert!(result.created);
        let stored = cluster.deployment("shop", "web").unwrap();
        let resources = first_container(&stored).resources.as_ref().unwrap();
        assert_eq!(resources.requests.as_ref().unwrap()["cpu"].0, "250000000n");
        assert_eq!(resources.limits.as_ref().unwrap()["cpu"].0, "500000u");
    }

    #[tokio::test]
    async fn test_lookup_error_is_fatal() {
        let cluster = FakeCluster {
            deployments_forbidden: true,
            ..Default::default()
        };
        let reconciler = Reconciler::new(&cluster);

        let err = reconciler.reconcile_workload(&workload()).await.unwrap_err();

        assert!(matches!(err, Error::Api { .. }));
        assert_eq!(cluster.created.load(Ordering::SeqCst), 0);
    }
}

mod service_tests {
    use super::*;

    #[tokio::test]
    async fn test_service_ports_and_selector() {
        let cluster = FakeCluster::new();
        let reconciler = Reconciler::new(&cluster);

        let result = reconciler
            .reconcile_service("web", "shop", &["80", "443"], ServiceExposure::ClusterIp)
            .await
            .unwrap();

        assert!(result.created);
        let service = cluster.service("shop", "web-service").unwrap();
        let spec = service.spec.unwrap();
        let ports = spec.ports.unwrap();
        assert_eq!(ports.len(), 2);
        assert_eq!(ports[0].name.as_deref(), Some("port-0"));
        assert_eq!(ports[0].port, 80);
        assert_eq!(ports[1].name.as_deref(), Some("port-1"));
        assert_eq!(ports[1].port, 443);
        assert_eq!(spec.selector.unwrap()["app"], "web");
        assert_eq!(spec.type_.as_deref(), Some("ClusterIP"));
    }

    #[tokio::test]
    async fn test_service_name_suffix_always_added() {
        let cluster = FakeCluster::new();
        let reconciler = Reconciler::new(&cluster);

        reconciler
            .reconcile_service("api-service", "shop", &["8080"], ServiceExposure::ClusterIp)
            .await
            .unwrap();

        assert!(cluster.service("shop", "api-service-service").is_some());
        assert!(cluster.service("shop", "api-service").is_none());
    }

    #[tokio::test]
    async fn test_existing_service_keeps_selector_and_type() {
        let cluster = FakeCluster::new();
        let reconciler = Reconciler::new(&cluster);
        reconciler
            .reconcile_service("web", "shop", &["80"], ServiceExposure::LoadBalancer)
            .await
            .unwrap();

        let result = reconciler
            .reconcile_service("web", "shop", &["8080", "9090"], ServiceExposure::ClusterIp)
            .await
            .unwrap();

        assert!(!result.created);
        let spec = cluster.service("shop", "web-service").unwrap().spec.unwrap();
        assert_eq!(spec.type_.as_deref(), Some("LoadBalancer"));
        let ports: Vec<i32> = spec.ports.unwrap().iter().map(|p| p.port).collect();
        assert_eq!(ports, vec![8080, 9090]);
    }

    #[tokio::test]
    async fn test_invalid_port_rejected_before_lookup() {
        let cluster = FakeCluster::new();
        let reconciler = Reconciler::new(&cluster);

        let err = reconciler
            .reconcile_service("web", "shop", &["80", "https"], ServiceExposure::ClusterIp)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidPort { ref value } if value == "https"));
        assert_eq!(cluster.call_count(), 0);
    }
}

mod scaling_tests {
    use super::*;

    fn keda_policy() -> ScalingPolicy {
        ScalingPolicy::EventDriven(
            EventDrivenPolicy::new(2, 10).with_trigger(Trigger::utilization(ResourceMetric::Cpu, 60)),
        )
    }

    #[tokio::test]
    async fn test_scaled_object_created_then_merge_patched() {
        let cluster = FakeCluster::new();
        let reconciler = Reconciler::new(&cluster);

        let first = reconciler
            .reconcile_scaling_policy("web", "shop", &keda_policy())
            .await
            .unwrap();
        assert!(first.created);

        let second = reconciler
            .reconcile_scaling_policy("web", "shop", &keda_policy())
            .await
            .unwrap();
        assert!(!second.created);

        let patches = cluster.patches.lock().unwrap();
        assert_eq!(patches.len(), 1);
        let patch = patches[0].as_object().unwrap();
        assert_eq!(patch.len(), 1);
        assert!(patch.contains_key("spec"));
        assert_eq!(patch["spec"]["triggers"][0]["type"], "prometheus");
        assert_eq!(patch["spec"]["triggers"][1]["type"], "cpu");
    }

    #[tokio::test]
    async fn test_baseline_trigger_always_present() {
        let cluster = FakeCluster::new();
        let reconciler = Reconciler::new(&cluster);

        reconciler
            .reconcile_scaling_policy(
                "web",
                "shop",
                &ScalingPolicy::EventDriven(EventDrivenPolicy::new(1, 3)),
            )
            .await
            .unwrap();

        let stored = cluster.custom.lock().unwrap()[&("shop".to_string(), "web".to_string())].clone();
        let triggers = stored["spec"]["triggers"].as_array().unwrap();
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0]["type"], "prometheus");
        assert_eq!(stored["spec"]["scaleTargetRef"]["apiVersion"], "apps/v1");
    }

    #[tokio::test]
    async fn test_hpa_create_then_update() {
        let cluster = FakeCluster::new();
        let reconciler = Reconciler::new(&cluster);
        let policy = |max| {
            ScalingPolicy::Hpa(HpaPolicy {
                metric: ResourceMetric::Memory,
                target_utilization_percent: 75,
                min_replicas: 1,
                max_replicas: max,
            })
        };

        assert!(reconciler
            .reconcile_scaling_policy("web", "shop", &policy(4))
            .await
            .unwrap()
            .created);
        assert!(!reconciler
            .reconcile_scaling_policy("web", "shop", &policy(8))
            .await
            .unwrap()
            .created);

        let hpas = cluster.hpas.lock().unwrap();
        let hpa = &hpas[&("shop".to_string(), "web".to_string())];
        assert_eq!(hpa.spec.as_ref().unwrap().max_replicas, 8);
    }

    #[tokio::test]
    async fn test_scaling_failure_keeps_workload_result() {
        let cluster = FakeCluster {
            custom_unavailable: true,
            ..Default::default()
        };
        let reconciler = Reconciler::new(&cluster);

        let result = reconciler
            .apply(&workload(), ServiceExposure::ClusterIp, Some(&keda_policy()))
            .await
            .unwrap();

        assert_eq!(result.deployment.name, "web");
        assert!(result.deployment.created);
        assert_eq!(result.service.name, "web-service");
        assert!(result.service.created);
        assert!(matches!(
            result.scaling_policy,
            ScalingOutcome::Failed { ref error, .. } if error.contains("service unavailable")
        ));
        assert!(cluster.deployment("shop", "web").is_some());
        assert!(cluster.service("shop", "web-service").is_some());
    }

    #[tokio::test]
    async fn test_apply_full_triple() {
        let cluster = FakeCluster::new();
        let reconciler = Reconciler::new(&cluster);

        let result = reconciler
            .apply(&workload(), ServiceExposure::LoadBalancer, Some(&keda_policy()))
            .await
            .unwrap();

        assert_eq!(
            result.scaling_policy,
            ScalingOutcome::Applied {
                kind: "ScaledObject".to_string(),
                name: "web".to_string(),
                created: true,
            }
        );
        assert_eq!(result.service_address.as_deref(), Some("10.96.0.10"));
    }

    #[tokio::test]
    async fn test_apply_without_policy_skips_scaling() {
        let cluster = FakeCluster::new();
        let reconciler = Reconciler::new(&cluster);

        let result = reconciler
            .apply(&workload(), ServiceExposure::ClusterIp, None)
            .await
            .unwrap();

        assert_eq!(result.scaling_policy, ScalingOutcome::Skipped);
        assert!(cluster.custom.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_apply_rejects_out_of_range_port_before_any_call() {
        let cluster = FakeCluster::new();
        let reconciler = Reconciler::new(&cluster);
        let spec = WorkloadSpec {
            container_ports: vec![80, 70000],
            ..workload()
        };

        let err = reconciler
            .apply(&spec, ServiceExposure::ClusterIp, None)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidPort { ref value } if value == "70000"));
        assert_eq!(cluster.call_count(), 0);
    }

    #[tokio::test]
    async fn test_apply_rejects_invalid_policy_before_any_call() {
        let cluster = FakeCluster::new();
        let reconciler = Reconciler::new(&cluster);
        let policy = ScalingPolicy::EventDriven(EventDrivenPolicy::new(5, 2));

        let err = reconciler
            .apply(&workload(), ServiceExposure::ClusterIp, Some(&policy))
            .await
            .unwrap_err();

        assert!(err.is_invalid_input());
        assert_eq!(cluster.call_count(), 0);
    }
}
