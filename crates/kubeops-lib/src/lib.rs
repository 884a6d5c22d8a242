//! Library for the kubeops command-line tool
//!
//! This crate provides the core functionality for:
//! - Talking to a Kubernetes API server through a narrow cluster handle
//! - Reconciling a Deployment, Service and autoscaler from a workload spec
//! - Reporting deployment and pod health with point-in-time usage metrics

pub mod cluster;
pub mod error;
pub mod health;
pub mod models;
pub mod quantity;
pub mod reconciler;

#[cfg(test)]
mod testing;

pub use cluster::{ClusterConfig, ClusterHandle, CustomResourceRef, KubeCluster, PodMetrics};
pub use error::{Error, Result};
pub use health::{HealthReporter, HealthStatus, KedaStatus};
pub use models::*;
pub use reconciler::{Reconciled, Reconciler};
