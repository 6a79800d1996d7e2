//! A single collection cycle
//!
//! `collect_snapshot` is a plain function over a client: it lists namespaces,
//! fetches each namespace's workloads, and reports what happened as a value.

use std::future::Future;
use std::time::Duration;

use futures::StreamExt;
use tokio::time::timeout;
use tracing::warn;

use crate::cluster::{ClusterClient, ResourceKind};
use crate::config::SecretValues;
use crate::error::{Result, VisualizerError};
use crate::models::{CycleKind, Namespace, NamespaceWorkloads, Snapshot};

/// Limits applied to one cycle
#[derive(Debug, Clone)]
pub struct CycleSettings {
    /// Deadline for every individual list call
    pub request_timeout: Duration,
    /// Namespaces collected at the same time
    pub namespace_concurrency: usize,
    pub secret_values: SecretValues,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            namespace_concurrency: 4,
            secret_values: SecretValues::Reveal,
        }
    }
}

/// A namespace left out of this cycle's snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceFailure {
    pub namespace: String,
    pub kind: Option<ResourceKind>,
    pub error: String,
}

/// Result of one collection cycle
#[derive(Debug)]
pub enum CycleOutcome {
    /// Every namespace was collected
    Complete(Snapshot),
    /// Some namespaces were skipped; the snapshot holds the rest
    Partial {
        snapshot: Snapshot,
        failures: Vec<NamespaceFailure>,
    },
    /// Nothing to broadcast this cycle
    Failed(VisualizerError),
    /// The cycle task panicked
    Faulted(String),
}

impl CycleOutcome {
    pub fn kind(&self) -> CycleKind {
        match self {
            CycleOutcome::Complete(_) => CycleKind::Complete,
            CycleOutcome::Partial { .. } => CycleKind::Partial,
            CycleOutcome::Failed(_) => CycleKind::Failed,
            CycleOutcome::Faulted(_) => CycleKind::Faulted,
        }
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        match self {
            CycleOutcome::Complete(snapshot) | CycleOutcome::Partial { snapshot, .. } => {
                Some(snapshot)
            }
            _ => None,
        }
    }

    pub fn into_snapshot(self) -> Option<Snapshot> {
        match self {
            CycleOutcome::Complete(snapshot) | CycleOutcome::Partial { snapshot, .. } => {
                Some(snapshot)
            }
            _ => None,
        }
    }
}

/// Collect one snapshot through `client`.
///
/// A failed namespace listing fails the whole cycle. A failure in any of a
/// namespace's sub-resources leaves that namespace out.
pub async fn collect_snapshot(client: &dyn ClusterClient, settings: &CycleSettings) -> CycleOutcome {
    let namespaces = match bounded(
        ResourceKind::Namespaces,
        settings.request_timeout,
        client.list_namespaces(),
    )
    .await
    {
        Ok(namespaces) => namespaces,
        Err(e) => return CycleOutcome::Failed(e),
    };

    let results: Vec<_> = futures::stream::iter(namespaces)
        .map(|meta| async move {
            let workloads = collect_namespace(client, &meta.name, settings).await;
            (meta, workloads)
        })
        .buffered(settings.namespace_concurrency.max(1))
        .collect()
        .await;

    let mut collected = Vec::with_capacity(results.len());
    let mut failures = Vec::new();

    for (meta, workloads) in results {
        match workloads {
            Ok(mut workloads) => {
                if settings.secret_values == SecretValues::Redact {
                    workloads.secrets.iter_mut().for_each(|s| s.redact());
                }
                collected.push(Namespace::assemble(meta, workloads));
            }
            Err(e) => {
                let kind = e.resource_kind();
                warn!(
                    namespace = %meta.name,
                    kind = kind.map(|k| k.as_str()).unwrap_or("unknown"),
                    "Skipping namespace this cycle: {}",
                    e
                );
                failures.push(NamespaceFailure {
                    namespace: meta.name,
                    kind,
                    error: e.to_string(),
                });
            }
        }
    }

    let snapshot = Snapshot::new(collected);
    if failures.is_empty() {
        CycleOutcome::Complete(snapshot)
    } else {
        CycleOutcome::Partial { snapshot, failures }
    }
}

/// Fetch all sub-resources of one namespace, failing on the first error
async fn collect_namespace(
    client: &dyn ClusterClient,
    namespace: &str,
    settings: &CycleSettings,
) -> Result<NamespaceWorkloads> {
    let deadline = settings.request_timeout;

    let (pods, deployments, services, secrets, config_maps) = tokio::try_join!(
        bounded(ResourceKind::Pods, deadline, client.list_pods(namespace)),
        bounded(
            ResourceKind::Deployments,
            deadline,
            client.list_deployments(namespace)
        ),
        bounded(ResourceKind::Services, deadline, client.list_services(namespace)),
        bounded(ResourceKind::Secrets, deadline, client.list_secrets(namespace)),
        bounded(
            ResourceKind::ConfigMaps,
            deadline,
            client.list_config_maps(namespace)
        ),
    )?;

    Ok(NamespaceWorkloads {
        pods,
        deployments,
        services,
        secrets,
        config_maps,
    })
}

async fn bounded<T, F>(kind: ResourceKind, deadline: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(VisualizerError::RequestTimeout {
            kind,
            after: deadline,
        }),
    }
}
