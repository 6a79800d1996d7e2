//! Snapshot collector
//!
//! Runs one collection cycle per poll interval and submits the result to the
//! broadcast queue. Each cycle runs in its own task; whatever happens inside
//! it comes back as a `CycleOutcome` and decides how long to wait before the
//! next one.

pub mod cycle;

pub use cycle::{collect_snapshot, CycleOutcome, CycleSettings, NamespaceFailure};

use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use crate::broadcast::{SnapshotSender, Submission};
use crate::cluster::ClientHandle;
use crate::config::Config;
use crate::error::VisualizerError;
use crate::models::{CycleKind, CycleSummary, Snapshot};

/// Snapshot collector configuration
#[derive(Clone, Debug)]
pub struct SnapshotCollectorConfig {
    /// Wait after a cycle that produced a snapshot
    pub poll_interval: Duration,
    /// Wait after a failed or faulted cycle
    pub fault_backoff: Duration,
    pub cycle: CycleSettings,
}

impl Default for SnapshotCollectorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            fault_backoff: Duration::from_secs(5),
            cycle: CycleSettings::default(),
        }
    }
}

impl From<&Config> for SnapshotCollectorConfig {
    fn from(config: &Config) -> Self {
        Self {
            poll_interval: config.collector.poll_interval,
            fault_backoff: config.collector.fault_backoff,
            cycle: CycleSettings {
                request_timeout: config.cluster.request_timeout,
                namespace_concurrency: config.collector.namespace_concurrency,
                secret_values: config.collector.secret_values,
            },
        }
    }
}

/// Periodic producer of snapshots
pub struct SnapshotCollector {
    client: ClientHandle,
    queue: SnapshotSender,
    config: SnapshotCollectorConfig,
    last_cycle: watch::Sender<Option<CycleSummary>>,
}

impl SnapshotCollector {
    /// Create a new collector
    pub fn new(client: ClientHandle, queue: SnapshotSender, config: SnapshotCollectorConfig) -> Self {
        let (last_cycle, _) = watch::channel(None);
        Self {
            client,
            queue,
            config,
            last_cycle,
        }
    }

    /// Subscribe to the summary of the most recent cycle
    pub fn last_cycle(&self) -> watch::Receiver<Option<CycleSummary>> {
        self.last_cycle.subscribe()
    }

    /// Run the collector (call in a spawned task)
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting snapshot collector with {}s poll interval",
            self.config.poll_interval.as_secs()
        );

        loop {
            let outcome = self.run_cycle().await;
            let delay = self.settle(outcome).await;

            tokio::select! {
                _ = sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Snapshot collector shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Run one cycle in its own task against the current client
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Some(client) = self.client.current() else {
            return CycleOutcome::Failed(VisualizerError::ClientUnavailable);
        };
        let settings = self.config.cycle.clone();

        let task = tokio::spawn(async move { collect_snapshot(&**client, &settings).await });

        match task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => CycleOutcome::Faulted(panic_message(e.into_panic())),
            Err(e) => CycleOutcome::Faulted(e.to_string()),
        }
    }

    /// Act on a cycle outcome and return how long to wait before the next cycle
    pub async fn settle(&self, outcome: CycleOutcome) -> Duration {
        let kind = outcome.kind();

        let (delay, namespaces) = match outcome {
            CycleOutcome::Complete(snapshot) => {
                debug!("Collected {} namespaces", snapshot.len());
                self.emit(snapshot).await
            }
            CycleOutcome::Partial { snapshot, failures } => {
                warn!(
                    "Collected {} namespaces, skipped {}",
                    snapshot.len(),
                    failures.len()
                );
                self.emit(snapshot).await
            }
            CycleOutcome::Failed(e) => {
                error!(
                    "Collection cycle failed: {}, retrying in {}s",
                    e,
                    self.config.fault_backoff.as_secs()
                );
                (self.config.fault_backoff, 0)
            }
            CycleOutcome::Faulted(reason) => {
                error!(
                    "Collection cycle faulted: {}, retrying in {}s",
                    reason,
                    self.config.fault_backoff.as_secs()
                );
                (self.config.fault_backoff, 0)
            }
        };

        self.last_cycle.send_replace(Some(CycleSummary {
            outcome: kind,
            namespaces,
            at: Utc::now(),
        }));

        delay
    }

    /// Submit a snapshot; returns the next delay and the namespaces actually queued
    async fn emit(&self, snapshot: Snapshot) -> (Duration, usize) {
        let namespaces = snapshot.len();
        match self.queue.submit(snapshot).await {
            Ok(Submission::Queued) => (self.config.poll_interval, namespaces),
            Ok(Submission::Dropped) => (self.config.poll_interval, 0),
            Err(e) => {
                error!("Could not submit snapshot: {}", e);
                (self.config.fault_backoff, 0)
            }
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::snapshot_queue;
    use crate::cluster::testing::{FakeCluster, FakeFactory};
    use crate::cluster::{HealthSupervisor, HealthSupervisorConfig};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    fn test_config() -> SnapshotCollectorConfig {
        SnapshotCollectorConfig {
            poll_interval: Duration::from_secs(30),
            fault_backoff: Duration::from_secs(5),
            cycle: CycleSettings::default(),
        }
    }

    #[test]
    fn test_config_default() {
        let config = SnapshotCollectorConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.fault_backoff, Duration::from_secs(5));
        assert_eq!(config.cycle.request_timeout, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_cycle_without_client_fails() {
        let (tx, _rx) = snapshot_queue(1, Duration::from_secs(1));
        let collector = SnapshotCollector::new(ClientHandle::empty(), tx, test_config());

        let outcome = collector.run_cycle().await;
        assert!(matches!(
            outcome,
            CycleOutcome::Failed(VisualizerError::ClientUnavailable)
        ));
        assert_eq!(collector.settle(outcome).await, Duration::from_secs(5));
        assert_eq!(
            collector.last_cycle().borrow().as_ref().map(|c| c.outcome),
            Some(CycleKind::Failed)
        );
    }

    #[tokio::test]
    async fn test_panicking_cycle_is_contained() {
        let mut cluster = FakeCluster::with_namespaces("panics", &["default"]);
        cluster.panic_on_namespaces = true;
        let (tx, _rx) = snapshot_queue(1, Duration::from_secs(1));
        let collector = SnapshotCollector::new(ClientHandle::with_client(Box::new(cluster)), tx, test_config());

        let outcome = collector.run_cycle().await;

        match &outcome {
            CycleOutcome::Faulted(reason) => assert!(reason.contains("malformed namespace list")),
            other => panic!("expected a fault, got {:?}", other.kind()),
        }
        assert_eq!(collector.settle(outcome).await, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_successful_cycle_submits_snapshot() {
        let cluster = FakeCluster::with_namespaces("ok", &["default", "kube-system"]);
        let (tx, mut rx) = snapshot_queue(1, Duration::from_secs(1));
        let collector = SnapshotCollector::new(ClientHandle::with_client(Box::new(cluster)), tx, test_config());

        let outcome = collector.run_cycle().await;
        assert_eq!(collector.settle(outcome).await, Duration::from_secs(30));

        assert_eq!(rx.recv().await.unwrap().len(), 2);
        let summary = collector.last_cycle().borrow().clone().unwrap();
        assert_eq!(summary.outcome, CycleKind::Complete);
        assert_eq!(summary.namespaces, 2);
    }

    #[tokio::test]
    async fn test_closed_queue_backs_off() {
        let cluster = FakeCluster::with_namespaces("ok", &["default"]);
        let (tx, rx) = snapshot_queue(1, Duration::from_secs(1));
        drop(rx);
        let collector = SnapshotCollector::new(ClientHandle::with_client(Box::new(cluster)), tx, test_config());

        let outcome = collector.run_cycle().await;
        assert_eq!(collector.settle(outcome).await, Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_survives_failures_and_picks_up_new_client() {
        let mut down = FakeCluster::with_namespaces("down", &[]);
        down.fail_namespaces = true;
        let attempts = down.namespace_lists.clone();
        let handle = ClientHandle::with_client(Box::new(down));

        let (tx, mut rx) = snapshot_queue(4, Duration::from_secs(1));
        let collector = Arc::new(SnapshotCollector::new(handle.clone(), tx, test_config()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn({
            let collector = collector.clone();
            async move { collector.run(shutdown_rx).await }
        });

        // Three failed cycles, five seconds apart
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 3);

        handle.install(Box::new(FakeCluster::with_namespaces("up", &["default"])));

        let snapshot = rx.recv().await.unwrap();
        assert_eq!(snapshot.namespaces()[0].name, "default");

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_does_not_stall_collector() {
        let cluster = FakeCluster::with_namespaces("ok", &["default"]);
        let lists = cluster.namespace_lists.clone();
        let (tx, _rx) = snapshot_queue(1, Duration::from_secs(1));
        let collector = Arc::new(SnapshotCollector::new(
            ClientHandle::with_client(Box::new(cluster)),
            tx,
            test_config(),
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn({
            let collector = collector.clone();
            async move { collector.run(shutdown_rx).await }
        });

        // Nobody drains the queue; cycles keep coming regardless
        tokio::time::sleep(Duration::from_secs(100)).await;
        assert!(lists.load(Ordering::SeqCst) >= 3);

        // The last cycle's snapshot was dropped, so nothing was emitted
        let summary = collector.last_cycle().borrow().clone().unwrap();
        assert_eq!(summary.outcome, CycleKind::Complete);
        assert_eq!(summary.namespaces, 0);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_collector_uses_client_rebuilt_by_supervisor() {
        const FAILING_PROBES: usize = 3;

        let handle = ClientHandle::empty();
        let factory = Arc::new(FakeFactory::new(&["default"], FAILING_PROBES));
        let supervisor = Arc::new(HealthSupervisor::new(
            handle.clone(),
            factory.clone(),
            HealthSupervisorConfig {
                probe_interval: Duration::from_secs(30),
                retry_delay: Duration::from_secs(5),
                probe_timeout: Duration::from_secs(1),
            },
        ));

        let (tx, mut rx) = snapshot_queue(4, Duration::from_secs(1));
        let collector = Arc::new(SnapshotCollector::new(handle.clone(), tx, test_config()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let supervisor_task = tokio::spawn({
            let supervisor = supervisor.clone();
            let shutdown = shutdown_rx.clone();
            async move { supervisor.run(shutdown).await }
        });
        let collector_task = tokio::spawn({
            let collector = collector.clone();
            async move { collector.run(shutdown_rx).await }
        });

        // Rebuilt after K failed probes, picked up by the next collection
        let budget = Duration::from_secs(5) * FAILING_PROBES as u32
            + test_config().fault_backoff
            + Duration::from_secs(1);
        let snapshot = tokio::time::timeout(budget, rx.recv())
            .await
            .expect("no snapshot from the rebuilt client")
            .unwrap();

        assert_eq!(snapshot.namespaces()[0].name, "default");
        assert_eq!(factory.builds.load(Ordering::SeqCst), FAILING_PROBES + 1);
        assert_eq!(
            handle.current().unwrap().source(),
            format!("fake:build-{}", FAILING_PROBES + 1)
        );

        shutdown_tx.send(true).unwrap();
        supervisor_task.await.unwrap();
        collector_task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_shutdown_sender_stops_loop() {
        let cluster = FakeCluster::with_namespaces("ok", &["default"]);
        let lists = cluster.namespace_lists.clone();
        let (tx, _rx) = snapshot_queue(4, Duration::from_secs(1));
        let collector = SnapshotCollector::new(ClientHandle::with_client(Box::new(cluster)), tx, test_config());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        drop(shutdown_tx);

        tokio::time::timeout(Duration::from_secs(1), collector.run(shutdown_rx))
            .await
            .expect("collector kept polling without a shutdown sender");
        assert_eq!(lists.load(Ordering::SeqCst), 1);
    }
}
