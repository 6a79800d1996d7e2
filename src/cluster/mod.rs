//! Cluster API access
//!
//! This module provides everything the collector needs from the control plane:
//! - The `ClusterClient` trait and its kube-backed implementation
//! - Ordered credential sources for (re)building a client
//! - The shared, atomically swapped client handle
//! - The health supervisor that keeps that handle working

pub mod credentials;
pub mod health;
pub mod kube_client;

pub use credentials::{ClientFactory, CredentialSource, KubeClientFactory};
pub use health::{HealthSupervisor, HealthSupervisorConfig};
pub use kube_client::KubeClusterClient;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::models::{ConfigMap, Deployment, NamespaceMeta, Pod, Secret, Service};

/// Resource kinds listed during a collection cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Namespaces,
    Pods,
    Deployments,
    Services,
    Secrets,
    ConfigMaps,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Namespaces => "namespaces",
            Self::Pods => "pods",
            Self::Deployments => "deployments",
            Self::Services => "services",
            Self::Secrets => "secrets",
            Self::ConfigMaps => "configmaps",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Read access to the cluster control plane
///
/// Implementations return plain records; deadlines are applied by callers.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Lightweight liveness check against the API server
    async fn probe(&self) -> Result<()>;

    async fn list_namespaces(&self) -> Result<Vec<NamespaceMeta>>;

    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>>;

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<Deployment>>;

    async fn list_services(&self, namespace: &str) -> Result<Vec<Service>>;

    async fn list_secrets(&self, namespace: &str) -> Result<Vec<Secret>>;

    async fn list_config_maps(&self, namespace: &str) -> Result<Vec<ConfigMap>>;

    /// Where this client's credentials came from, for logs
    fn source(&self) -> String;
}

/// A loaded client, kept alive for as long as a caller holds it
pub type SharedClient = Arc<Box<dyn ClusterClient>>;

/// Shared handle to the current cluster client.
///
/// Read by the collector, replaced by the health supervisor. Replacement is a
/// single atomic pointer swap; a cycle that already loaded the old client keeps
/// using it until it finishes.
#[derive(Clone)]
pub struct ClientHandle {
    inner: Arc<ArcSwapOption<Box<dyn ClusterClient>>>,
}

impl ClientHandle {
    /// A handle with no client installed yet
    pub fn empty() -> Self {
        Self {
            inner: Arc::new(ArcSwapOption::empty()),
        }
    }

    pub fn with_client(client: Box<dyn ClusterClient>) -> Self {
        let handle = Self::empty();
        handle.install(client);
        handle
    }

    /// The currently installed client, if any
    pub fn current(&self) -> Option<SharedClient> {
        self.inner.load_full()
    }

    /// Atomically replace the installed client
    pub fn install(&self, client: Box<dyn ClusterClient>) {
        self.inner.store(Some(Arc::new(client)));
    }

    pub fn is_installed(&self) -> bool {
        self.inner.load().is_some()
    }
}

impl Default for ClientHandle {
    fn default() -> Self {
        Self::empty()
    }
}
