use std::time::Duration;

use thiserror::Error;

use crate::cluster::ResourceKind;

/// Unified error type for the visualizer
#[derive(Error, Debug)]
pub enum VisualizerError {
    // Cluster API errors
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("No cluster client available")]
    ClientUnavailable,

    #[error("Failed to list {kind}: {message}")]
    ListFailed { kind: ResourceKind, message: String },

    #[error("{kind} request timed out after {}s", .after.as_secs())]
    RequestTimeout { kind: ResourceKind, after: Duration },

    #[error("Liveness probe failed: {0}")]
    ProbeFailed(String),

    // Credential errors
    #[error("Credential source {source_name} failed: {message}")]
    CredentialSource {
        source_name: &'static str,
        message: String,
    },

    #[error("All credential sources exhausted after {attempts} attempts")]
    CredentialsExhausted { attempts: usize },

    // Pipeline errors
    #[error("Snapshot queue closed")]
    QueueClosed,

    #[error("Subscriber send timed out")]
    SendTimeout,

    #[error("Subscriber {0} disconnected")]
    SubscriberGone(uuid::Uuid),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for visualizer operations
pub type Result<T> = std::result::Result<T, VisualizerError>;

impl VisualizerError {
    /// Whether retrying the same operation later may succeed.
    ///
    /// Upstream and transport failures are transient; configuration and
    /// serialization failures are not.
    pub fn is_transient(&self) -> bool {
        match self {
            VisualizerError::Kube(_)
            | VisualizerError::ClientUnavailable
            | VisualizerError::ListFailed { .. }
            | VisualizerError::RequestTimeout { .. }
            | VisualizerError::ProbeFailed(_)
            | VisualizerError::CredentialSource { .. }
            | VisualizerError::CredentialsExhausted { .. }
            | VisualizerError::SendTimeout
            | VisualizerError::SubscriberGone(_)
            | VisualizerError::Io(_) => true,

            VisualizerError::QueueClosed
            | VisualizerError::InvalidConfig(_)
            | VisualizerError::Serialization(_)
            | VisualizerError::Internal(_) => false,
        }
    }

    /// The resource kind a failed listing refers to, if any
    pub fn resource_kind(&self) -> Option<ResourceKind> {
        match self {
            VisualizerError::ListFailed { kind, .. }
            | VisualizerError::RequestTimeout { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}
