//! Credential sources for building cluster clients
//!
//! Sources are tried in a fixed priority order: an explicit kubeconfig file
//! first, then the in-cluster service account.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{ClusterClient, KubeClusterClient};
use crate::config::ClusterConfig;
use crate::error::{Result, VisualizerError};

/// Where cluster credentials are read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// A kubeconfig file at an explicit path
    Kubeconfig(PathBuf),
    /// The service account mounted into a pod running in the cluster
    InCluster,
}

impl CredentialSource {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Kubeconfig(_) => "kubeconfig",
            Self::InCluster => "in-cluster",
        }
    }
}

impl std::fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Kubeconfig(path) => write!(f, "kubeconfig {}", path.display()),
            Self::InCluster => write!(f, "in-cluster"),
        }
    }
}

/// Builds fresh cluster clients
#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// Build a client from the first credential source that works
    async fn connect(&self) -> Result<Box<dyn ClusterClient>>;
}

/// Factory producing `KubeClusterClient`s
pub struct KubeClientFactory {
    sources: Vec<CredentialSource>,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl KubeClientFactory {
    pub fn new(config: &ClusterConfig) -> Self {
        let mut sources = Vec::with_capacity(2);
        if let Some(path) = &config.kubeconfig {
            sources.push(CredentialSource::Kubeconfig(path.clone()));
        }
        sources.push(CredentialSource::InCluster);

        Self {
            sources,
            connect_timeout: config.connect_timeout,
            request_timeout: config.request_timeout,
        }
    }

    pub fn sources(&self) -> &[CredentialSource] {
        &self.sources
    }

    /// Resolve a kube client configuration from one source
    pub async fn build_config(&self, source: &CredentialSource) -> Result<kube::Config> {
        let failed = |message: String| VisualizerError::CredentialSource {
            source_name: source.name(),
            message,
        };

        let mut config = match source {
            CredentialSource::Kubeconfig(path) => {
                let kubeconfig = Kubeconfig::read_from(path).map_err(|e| failed(e.to_string()))?;
                kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .map_err(|e| failed(e.to_string()))?
            }
            CredentialSource::InCluster => {
                kube::Config::incluster().map_err(|e| failed(e.to_string()))?
            }
        };

        config.connect_timeout = Some(self.connect_timeout);
        config.read_timeout = Some(self.request_timeout);
        Ok(config)
    }

    async fn build_client(&self, source: &CredentialSource) -> Result<KubeClusterClient> {
        let config = self.build_config(source).await?;
        debug!("Built client config for {} ({})", source, config.cluster_url);
        let client = Client::try_from(config)?;
        Ok(KubeClusterClient::new(client, source.clone()))
    }
}

#[async_trait]
impl ClientFactory for KubeClientFactory {
    async fn connect(&self) -> Result<Box<dyn ClusterClient>> {
        let client = try_in_order(&self.sources, self.connect_timeout, |source| {
            self.build_client(source)
        })
        .await?;
        Ok(Box::new(client))
    }
}

/// Try each source in order, bounding every attempt by `deadline`.
///
/// Returns the first success, or `CredentialsExhausted` when none worked.
pub(crate) async fn try_in_order<'a, T, F, Fut>(
    sources: &'a [CredentialSource],
    deadline: Duration,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut(&'a CredentialSource) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    for source in sources {
        match timeout(deadline, attempt(source)).await {
            Ok(Ok(value)) => {
                info!("Connected using {} credentials", source);
                return Ok(value);
            }
            Ok(Err(e)) => {
                warn!("Credential source {} failed: {}", source, e);
            }
            Err(_) => {
                warn!(
                    "Credential source {} timed out after {}s",
                    source,
                    deadline.as_secs()
                );
            }
        }
    }

    Err(VisualizerError::CredentialsExhausted {
        attempts: sources.len(),
    })
}
