//! k8s-visualizer - live Kubernetes cluster snapshots over WebSocket
//!
//! Polls the Kubernetes API for namespaces and their workloads, assembles a
//! snapshot of the whole cluster every cycle, and pushes it to every
//! connected WebSocket subscriber.
//!
//! ## Features
//!
//! - Namespace, pod, deployment, service, secret and config map collection
//! - Partial snapshots when individual namespaces fail
//! - Health supervision with credential fallback (kubeconfig, then in-cluster)
//! - Bounded fan-out that evicts stalled subscribers
//! - Health and status endpoints

pub mod api;
pub mod broadcast;
pub mod cluster;
pub mod collector;
pub mod config;
pub mod context;
pub mod error;
pub mod models;

pub use config::Config;
pub use context::{MonitorContext, MonitorTasks};
pub use error::{Result, VisualizerError};
