//! Process-wide monitor state
//!
//! Everything the long-lived tasks share is built here once and handed to
//! them explicitly.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::api::AppState;
use crate::broadcast::{snapshot_queue, BroadcastServer, ConnectionRegistry};
use crate::cluster::{ClientFactory, ClientHandle, HealthSupervisor, HealthSupervisorConfig};
use crate::collector::{SnapshotCollector, SnapshotCollectorConfig};
use crate::config::Config;
use crate::models::{ClusterState, CycleSummary};

/// Shared state of one visualizer process
#[derive(Clone)]
pub struct MonitorContext {
    pub config: Config,
    pub client: ClientHandle,
    pub registry: Arc<ConnectionRegistry>,
}

/// Handles to the background tasks started by `MonitorContext::spawn`
pub struct MonitorTasks {
    pub supervisor: JoinHandle<()>,
    pub collector: JoinHandle<()>,
    pub broadcaster: JoinHandle<()>,
    pub cluster_state: watch::Receiver<ClusterState>,
    pub last_cycle: watch::Receiver<Option<CycleSummary>>,
}

impl MonitorTasks {
    /// Wait for every task to finish
    pub async fn join(self) {
        let _ = tokio::join!(self.supervisor, self.collector, self.broadcaster);
    }
}

impl MonitorContext {
    pub fn new(config: Config, client: ClientHandle) -> Self {
        Self {
            config,
            client,
            registry: Arc::new(ConnectionRegistry::new()),
        }
    }

    /// Start the health supervisor, the collector and the broadcast server
    pub fn spawn(&self, factory: Arc<dyn ClientFactory>, shutdown: &watch::Sender<bool>) -> MonitorTasks {
        let (queue_tx, queue_rx) = snapshot_queue(
            self.config.collector.queue_capacity,
            self.config.collector.submit_timeout,
        );

        let supervisor = HealthSupervisor::new(
            self.client.clone(),
            factory,
            HealthSupervisorConfig::from(&self.config),
        );
        let cluster_state = supervisor.state();

        let collector = SnapshotCollector::new(
            self.client.clone(),
            queue_tx,
            SnapshotCollectorConfig::from(&self.config),
        );
        let last_cycle = collector.last_cycle();

        let broadcaster = BroadcastServer::new(
            self.registry.clone(),
            queue_rx,
            self.config.broadcast.send_timeout,
        );

        let supervisor_shutdown = shutdown.subscribe();
        let supervisor = tokio::spawn(async move { supervisor.run(supervisor_shutdown).await });

        let collector_shutdown = shutdown.subscribe();
        let collector = tokio::spawn(async move { collector.run(collector_shutdown).await });

        let broadcaster = tokio::spawn(broadcaster.run(shutdown.subscribe()));

        info!("Monitor tasks started");

        MonitorTasks {
            supervisor,
            collector,
            broadcaster,
            cluster_state,
            last_cycle,
        }
    }

    /// State for the subscription server's handlers
    pub fn app_state(&self, tasks: &MonitorTasks) -> AppState {
        AppState::new(
            self.registry.clone(),
            tasks.cluster_state.clone(),
            tasks.last_cycle.clone(),
            self.config.broadcast.send_timeout,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::Connection;
    use crate::cluster::testing::FakeFactory;

    #[tokio::test]
    async fn test_spawned_tasks_deliver_to_registered_subscriber() {
        let config = Config::default();

        let factory = Arc::new(FakeFactory::new(&["default", "kube-system"], 0));
        let client = factory.connect().await.unwrap();
        let context = MonitorContext::new(config, ClientHandle::with_client(client));

        let (connection, mut rx) = Connection::new(4);
        context.registry.register(connection);

        let (shutdown_tx, _) = watch::channel(false);
        let tasks = context.spawn(factory, &shutdown_tx);

        let frame = rx.recv().await.unwrap();
        let names: Vec<String> = serde_json::from_str::<serde_json::Value>(&frame)
            .unwrap()
            .as_array()
            .unwrap()
            .iter()
            .map(|ns| ns["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["default", "kube-system"]);

        let state = context.app_state(&tasks);
        assert_eq!(*state.cluster_state.borrow(), ClusterState::Connected);

        shutdown_tx.send(true).unwrap();
        tasks.join().await;
    }
}
