use crate::error::{Result, VisualizerError};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Subscription server configuration
    pub server: ServerConfig,
    /// Cluster credentials and request limits
    pub cluster: ClusterConfig,
    /// Snapshot collector configuration
    pub collector: CollectorConfig,
    /// Health supervisor configuration
    pub health: HealthConfig,
    /// Broadcast configuration
    pub broadcast: BroadcastConfig,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port for the subscription endpoint (default: 5000)
    pub port: u16,
    /// Host to bind to (default: 0.0.0.0)
    pub host: String,
    /// Allowed CORS origins (comma-separated, empty = any origin)
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Explicit kubeconfig path, tried before in-cluster credentials
    pub kubeconfig: Option<PathBuf>,
    /// Deadline for every list call and liveness probe
    pub request_timeout: Duration,
    /// Deadline for establishing a connection to the API server
    pub connect_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Time between successful polling cycles
    pub poll_interval: Duration,
    /// Delay after a failed or faulted cycle
    pub fault_backoff: Duration,
    /// How long a submission may wait for room in the snapshot queue
    pub submit_timeout: Duration,
    /// Capacity of the snapshot queue
    pub queue_capacity: usize,
    /// Number of namespaces collected concurrently
    pub namespace_concurrency: usize,
    /// What to do with decoded secret values
    pub secret_values: SecretValues,
}

#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Interval between liveness probes
    pub probe_interval: Duration,
    /// Delay before retrying a failed rebuild
    pub retry_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    /// Deadline for handing a frame to one subscriber
    pub send_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

/// Handling of decoded secret payloads in snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecretValues {
    /// Decoded values are included
    #[default]
    Reveal,
    /// Keys are kept, values are blanked
    Redact,
}

impl FromStr for SecretValues {
    type Err = VisualizerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "reveal" | "include" | "" => Ok(Self::Reveal),
            "redact" | "hide" => Ok(Self::Redact),
            other => Err(VisualizerError::InvalidConfig(format!(
                "SECRET_VALUES must be 'reveal' or 'redact', got '{}'",
                other
            ))),
        }
    }
}

impl Default for Config {
    /// The built-in defaults, without reading the environment
    fn default() -> Self {
        Config {
            server: ServerConfig {
                port: 5000,
                host: "0.0.0.0".to_string(),
                cors_origins: Vec::new(),
            },
            cluster: ClusterConfig {
                kubeconfig: None,
                request_timeout: Duration::from_secs(10),
                connect_timeout: Duration::from_secs(10),
            },
            collector: CollectorConfig {
                poll_interval: Duration::from_secs(30),
                fault_backoff: Duration::from_secs(5),
                submit_timeout: Duration::from_secs(5),
                queue_capacity: 20,
                namespace_concurrency: 4,
                secret_values: SecretValues::Reveal,
            },
            health: HealthConfig {
                probe_interval: Duration::from_secs(30),
                retry_delay: Duration::from_secs(5),
            },
            broadcast: BroadcastConfig {
                send_timeout: Duration::from_secs(5),
            },
            log: LogConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            server: ServerConfig {
                port: get_env_or("SERVER_PORT", "5000").parse().map_err(|_| {
                    VisualizerError::InvalidConfig("SERVER_PORT must be a valid port number".into())
                })?,
                host: get_env_or("SERVER_HOST", "0.0.0.0"),
                cors_origins: get_env_or("CORS_ORIGINS", "")
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            cluster: ClusterConfig {
                kubeconfig: resolve_kubeconfig(),
                request_timeout: get_secs("CLUSTER_REQUEST_TIMEOUT_SECS", 10)?,
                connect_timeout: get_secs("CLUSTER_CONNECT_TIMEOUT_SECS", 10)?,
            },
            collector: CollectorConfig {
                poll_interval: get_secs("COLLECTOR_POLL_INTERVAL_SECS", 30)?,
                fault_backoff: get_secs("COLLECTOR_FAULT_BACKOFF_SECS", 5)?,
                submit_timeout: get_secs("COLLECTOR_SUBMIT_TIMEOUT_SECS", 5)?,
                queue_capacity: get_positive("COLLECTOR_QUEUE_CAPACITY", 20)?,
                namespace_concurrency: get_positive("COLLECTOR_NAMESPACE_CONCURRENCY", 4)?,
                secret_values: get_env_or("SECRET_VALUES", "reveal").parse()?,
            },
            health: HealthConfig {
                probe_interval: get_secs("HEALTH_PROBE_INTERVAL_SECS", 30)?,
                retry_delay: get_secs("HEALTH_RETRY_DELAY_SECS", 5)?,
            },
            broadcast: BroadcastConfig {
                send_timeout: get_secs("BROADCAST_SEND_TIMEOUT_SECS", 5)?,
            },
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: get_env_or("LOG_FORMAT", "pretty"),
            },
        })
    }

    /// Get the subscription server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Pick the kubeconfig path: `KUBECONFIG_PATH`, then `KUBECONFIG`, then
/// `$HOME/.kube/config`.
fn resolve_kubeconfig() -> Option<PathBuf> {
    ["KUBECONFIG_PATH", "KUBECONFIG"]
        .iter()
        .filter_map(|key| env::var(key).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            env::var("HOME")
                .ok()
                .filter(|home| !home.is_empty())
                .map(|home| PathBuf::from(home).join(".kube").join("config"))
        })
}

/// Parse a whole number of seconds; zero is rejected
fn get_secs(key: &str, default: u64) -> Result<Duration> {
    let secs: u64 = get_env_or(key, &default.to_string())
        .parse()
        .map_err(|_| VisualizerError::InvalidConfig(format!("{} must be a number of seconds", key)))?;
    if secs == 0 {
        return Err(VisualizerError::InvalidConfig(format!(
            "{} must be greater than zero",
            key
        )));
    }
    Ok(Duration::from_secs(secs))
}

fn get_positive(key: &str, default: usize) -> Result<usize> {
    match get_env_or(key, &default.to_string()).parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(VisualizerError::InvalidConfig(format!(
            "{} must be a positive number",
            key
        ))),
    }
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
