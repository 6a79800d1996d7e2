use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One polling pass over the cluster, in the order namespaces were listed.
///
/// Serializes as a bare JSON array of namespaces.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    namespaces: Vec<Namespace>,
}

impl Snapshot {
    pub fn new(namespaces: Vec<Namespace>) -> Self {
        Self { namespaces }
    }

    pub fn namespaces(&self) -> &[Namespace] {
        &self.namespaces
    }

    pub fn len(&self) -> usize {
        self.namespaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }

    /// Serialize once for every subscriber of a fan-out pass
    pub fn to_frame(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Namespace with all of its collected workloads
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Namespace {
    pub name: String,
    #[serde(with = "timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    pub unique_id: String,
    pub pods: Vec<Pod>,
    pub deployments: Vec<Deployment>,
    pub services: Vec<Service>,
    pub secrets: Vec<Secret>,
    pub config_maps: Vec<ConfigMap>,
}

/// Namespace metadata as returned by the namespace listing, before its
/// workloads are fetched
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NamespaceMeta {
    pub name: String,
    pub created_at: Option<DateTime<Utc>>,
    pub unique_id: String,
}

impl NamespaceMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Everything listed inside a single namespace
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NamespaceWorkloads {
    pub pods: Vec<Pod>,
    pub deployments: Vec<Deployment>,
    pub services: Vec<Service>,
    pub secrets: Vec<Secret>,
    pub config_maps: Vec<ConfigMap>,
}

impl Namespace {
    pub fn assemble(meta: NamespaceMeta, workloads: NamespaceWorkloads) -> Self {
        Self {
            name: meta.name,
            created_at: meta.created_at,
            unique_id: meta.unique_id,
            pods: workloads.pods,
            deployments: workloads.deployments,
            services: workloads.services,
            secrets: workloads.secrets,
            config_maps: workloads.config_maps,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Pod {
    pub name: String,
    /// Pod phase (Pending, Running, Succeeded, Failed, Unknown)
    pub status: String,
    #[serde(with = "timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    pub unique_id: String,
    /// Empty until the pod is scheduled
    pub node_name: String,
    /// Empty until the pod is assigned an address
    pub ip: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Deployment {
    pub name: String,
    /// Status of the first reported condition, `Unknown` without conditions
    pub status: String,
    #[serde(with = "timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    pub unique_id: String,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(with = "timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    pub unique_id: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Secret {
    pub name: String,
    #[serde(rename = "type")]
    pub secret_type: String,
    #[serde(with = "timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    pub unique_id: String,
    pub secret_map: BTreeMap<String, String>,
}

impl Secret {
    /// Keep the keys, blank every value
    pub fn redact(&mut self) {
        for value in self.secret_map.values_mut() {
            value.clear();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfigMap {
    pub name: String,
}

/// Creation timestamps go on the wire as RFC 3339 strings, empty when unknown
mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(at) => serializer.serialize_str(&at.to_rfc3339_opts(SecondsFormat::Secs, true)),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        if raw.is_empty() {
            return Ok(None);
        }
        DateTime::parse_from_rfc3339(&raw)
            .map(|at| Some(at.with_timezone(&Utc)))
            .map_err(serde::de::Error::custom)
    }
}
