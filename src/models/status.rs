use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Connection state of the cluster client as seen by the health supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClusterState {
    /// A client is installed and its last probe succeeded
    Connected,
    /// The last probe failed, or no client has been built yet
    #[default]
    Lost,
    /// Credential sources are being tried
    Rebuilding,
}

impl ClusterState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterState::Connected => "connected",
            ClusterState::Lost => "lost",
            ClusterState::Rebuilding => "rebuilding",
        }
    }
}

impl std::fmt::Display for ClusterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of result a collection cycle ended with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleKind {
    Complete,
    Partial,
    Failed,
    Faulted,
}

/// Summary of the most recent collection cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub outcome: CycleKind,
    /// Namespaces in the emitted snapshot, zero if none was emitted
    pub namespaces: usize,
    pub at: DateTime<Utc>,
}

/// Body of the status endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub cluster: ClusterState,
    pub subscribers: usize,
    pub uptime_secs: u64,
    pub last_cycle: Option<CycleSummary>,
}
