//! `ClusterClient` backed by `kube::Client`
//!
//! Lists core/apps resources and converts the k8s-openapi objects into the
//! snapshot records.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1 as apps;
use k8s_openapi::api::core::v1 as core;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, ListParams};
use kube::Client;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::{debug, instrument};

use super::{ClusterClient, CredentialSource, ResourceKind};
use crate::error::{Result, VisualizerError};
use crate::models::{ConfigMap, Deployment, NamespaceMeta, Pod, Secret, Service};

/// Status reported for a deployment that has no conditions yet
pub const UNKNOWN_STATUS: &str = "Unknown";

/// Cluster client talking to a real API server
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
    source: CredentialSource,
}

impl KubeClusterClient {
    pub fn new(client: Client, source: CredentialSource) -> Self {
        Self { client, source }
    }

    async fn list_all<K>(&self, api: Api<K>, kind: ResourceKind) -> Result<Vec<K>>
    where
        K: Clone + DeserializeOwned + Debug,
    {
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| VisualizerError::ListFailed {
                kind,
                message: e.to_string(),
            })?;
        Ok(list.items)
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    #[instrument(skip(self), fields(source = %self.source))]
    async fn probe(&self) -> Result<()> {
        let request = http::Request::get("/healthz")
            .body(Vec::new())
            .map_err(|e| VisualizerError::Internal(e.to_string()))?;

        let body = self
            .client
            .request_text(request)
            .await
            .map_err(|e| VisualizerError::ProbeFailed(e.to_string()))?;

        debug!("API server healthz: {}", body.trim());
        Ok(())
    }

    async fn list_namespaces(&self) -> Result<Vec<NamespaceMeta>> {
        let namespaces = self
            .list_all(
                Api::<core::Namespace>::all(self.client.clone()),
                ResourceKind::Namespaces,
            )
            .await?;
        Ok(namespaces.iter().map(namespace_meta).collect())
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>> {
        let pods = self
            .list_all(
                Api::<core::Pod>::namespaced(self.client.clone(), namespace),
                ResourceKind::Pods,
            )
            .await?;
        Ok(pods.iter().map(pod_record).collect())
    }

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<Deployment>> {
        let deployments = self
            .list_all(
                Api::<apps::Deployment>::namespaced(self.client.clone(), namespace),
                ResourceKind::Deployments,
            )
            .await?;
        Ok(deployments.iter().map(deployment_record).collect())
    }

    async fn list_services(&self, namespace: &str) -> Result<Vec<Service>> {
        let services = self
            .list_all(
                Api::<core::Service>::namespaced(self.client.clone(), namespace),
                ResourceKind::Services,
            )
            .await?;
        Ok(services.iter().map(service_record).collect())
    }

    async fn list_secrets(&self, namespace: &str) -> Result<Vec<Secret>> {
        let secrets = self
            .list_all(
                Api::<core::Secret>::namespaced(self.client.clone(), namespace),
                ResourceKind::Secrets,
            )
            .await?;
        Ok(secrets.iter().map(secret_record).collect())
    }

    async fn list_config_maps(&self, namespace: &str) -> Result<Vec<ConfigMap>> {
        let config_maps = self
            .list_all(
                Api::<core::ConfigMap>::namespaced(self.client.clone(), namespace),
                ResourceKind::ConfigMaps,
            )
            .await?;
        Ok(config_maps
            .iter()
            .map(|cm| ConfigMap {
                name: name_of(&cm.metadata),
            })
            .collect())
    }

    fn source(&self) -> String {
        self.source.to_string()
    }
}

fn name_of(meta: &ObjectMeta) -> String {
    meta.name.clone().unwrap_or_default()
}

fn uid_of(meta: &ObjectMeta) -> String {
    meta.uid.clone().unwrap_or_default()
}

fn created_at(meta: &ObjectMeta) -> Option<chrono::DateTime<chrono::Utc>> {
    meta.creation_timestamp.as_ref().map(|t| t.0)
}

pub(crate) fn namespace_meta(ns: &core::Namespace) -> NamespaceMeta {
    NamespaceMeta {
        name: name_of(&ns.metadata),
        created_at: created_at(&ns.metadata),
        unique_id: uid_of(&ns.metadata),
    }
}

pub(crate) fn pod_record(pod: &core::Pod) -> Pod {
    let status = pod.status.as_ref();
    Pod {
        name: name_of(&pod.metadata),
        status: status.and_then(|s| s.phase.clone()).unwrap_or_default(),
        created_at: created_at(&pod.metadata),
        unique_id: uid_of(&pod.metadata),
        node_name: pod
            .spec
            .as_ref()
            .and_then(|s| s.node_name.clone())
            .unwrap_or_default(),
        ip: status.and_then(|s| s.pod_ip.clone()).unwrap_or_default(),
    }
}

pub(crate) fn deployment_record(deployment: &apps::Deployment) -> Deployment {
    let status = deployment
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conditions| conditions.first())
        .map(|c| c.status.clone())
        .unwrap_or_else(|| UNKNOWN_STATUS.to_string());

    Deployment {
        name: name_of(&deployment.metadata),
        status,
        created_at: created_at(&deployment.metadata),
        unique_id: uid_of(&deployment.metadata),
        labels: deployment.metadata.labels.clone().unwrap_or_default(),
    }
}

pub(crate) fn service_record(service: &core::Service) -> Service {
    Service {
        name: name_of(&service.metadata),
        service_type: service
            .spec
            .as_ref()
            .and_then(|s| s.type_.clone())
            .unwrap_or_default(),
        created_at: created_at(&service.metadata),
        unique_id: uid_of(&service.metadata),
    }
}

/// Decodes the secret payload; non UTF-8 bytes are replaced lossily
pub(crate) fn secret_record(secret: &core::Secret) -> Secret {
    let secret_map = secret
        .data
        .as_ref()
        .map(|data| {
            data.iter()
                .map(|(key, value)| (key.clone(), String::from_utf8_lossy(&value.0).into_owned()))
                .collect()
        })
        .unwrap_or_default();

    Secret {
        name: name_of(&secret.metadata),
        secret_type: secret.type_.clone().unwrap_or_default(),
        created_at: created_at(&secret.metadata),
        unique_id: uid_of(&secret.metadata),
        secret_map,
    }
}
