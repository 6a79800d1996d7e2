//! Health supervision for the cluster client
//!
//! Periodically probes the installed client and rebuilds it from the
//! credential sources when the API server stops answering.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use super::{ClientFactory, ClientHandle, ClusterClient};
use crate::config::Config;
use crate::error::{Result, VisualizerError};
use crate::models::ClusterState;

/// Health supervisor configuration
#[derive(Clone, Debug)]
pub struct HealthSupervisorConfig {
    /// Interval between liveness probes
    pub probe_interval: Duration,
    /// Delay before retrying after every credential source failed
    pub retry_delay: Duration,
    /// Deadline for a single probe
    pub probe_timeout: Duration,
}

impl Default for HealthSupervisorConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(30),
            retry_delay: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&Config> for HealthSupervisorConfig {
    fn from(config: &Config) -> Self {
        Self {
            probe_interval: config.health.probe_interval,
            retry_delay: config.health.retry_delay,
            probe_timeout: config.cluster.request_timeout,
        }
    }
}

/// Keeps a working client installed in the shared `ClientHandle`
pub struct HealthSupervisor {
    handle: ClientHandle,
    factory: Arc<dyn ClientFactory>,
    config: HealthSupervisorConfig,
    state_tx: watch::Sender<ClusterState>,
}

impl HealthSupervisor {
    /// Create a new health supervisor
    pub fn new(
        handle: ClientHandle,
        factory: Arc<dyn ClientFactory>,
        config: HealthSupervisorConfig,
    ) -> Self {
        let initial = if handle.is_installed() {
            ClusterState::Connected
        } else {
            ClusterState::Lost
        };
        let (state_tx, _) = watch::channel(initial);

        Self {
            handle,
            factory,
            config,
            state_tx,
        }
    }

    /// Subscribe to cluster connection state changes
    pub fn state(&self) -> watch::Receiver<ClusterState> {
        self.state_tx.subscribe()
    }

    /// Run the supervisor (call in a spawned task)
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting health supervisor with {}s probe interval",
            self.config.probe_interval.as_secs()
        );

        let mut probe_interval = interval(self.config.probe_interval);
        probe_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = probe_interval.tick() => {
                    if let Err(e) = self.check().await {
                        warn!("Lost connection to Kubernetes API server: {}", e);
                        if !self.recover(&mut shutdown).await {
                            break;
                        }
                        probe_interval.reset();
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Health supervisor shutting down");
    }

    /// Probe the installed client
    pub async fn check(&self) -> Result<()> {
        let client = self.handle.current().ok_or(VisualizerError::ClientUnavailable)?;
        self.probe(&**client).await?;

        debug!("Cluster client {} is healthy", client.source());
        self.transition(ClusterState::Connected);
        Ok(())
    }

    /// Rebuild until a working client is installed.
    ///
    /// Returns false only when shutdown was requested.
    pub async fn recover(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        self.transition(ClusterState::Lost);

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            self.transition(ClusterState::Rebuilding);

            match self.rebuild().await {
                Ok(client) => {
                    let source = client.source();
                    self.handle.install(client);
                    self.transition(ClusterState::Connected);
                    info!(
                        "Reconnected to Kubernetes API server via {} after {} attempt(s)",
                        source, attempt
                    );
                    return true;
                }
                Err(e) => {
                    error!(
                        "Failed to reconnect to Kubernetes API server: {}, retrying in {}s",
                        e,
                        self.config.retry_delay.as_secs()
                    );
                }
            }

            tokio::select! {
                _ = sleep(self.config.retry_delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return false;
                    }
                }
            }
        }
    }

    /// Build a client from the credential sources and make sure it answers
    async fn rebuild(&self) -> Result<Box<dyn ClusterClient>> {
        let client = self.factory.connect().await?;
        self.probe(client.as_ref()).await?;
        Ok(client)
    }

    async fn probe(&self, client: &dyn ClusterClient) -> Result<()> {
        match timeout(self.config.probe_timeout, client.probe()).await {
            Ok(result) => result,
            Err(_) => Err(VisualizerError::ProbeFailed(format!(
                "no answer within {}s",
                self.config.probe_timeout.as_secs()
            ))),
        }
    }

    fn transition(&self, next: ClusterState) {
        let previous = self.state_tx.send_replace(next);
        if previous != next {
            info!("Cluster connection state: {} -> {}", previous, next);
        }
    }
}
