//! Fan-out of snapshots to every registered subscriber

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use super::queue::SnapshotReceiver;
use super::registry::{ConnectionRegistry, Frame};
use crate::error::Result;
use crate::models::Snapshot;

/// Outcome of one fan-out pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FanOutReport {
    /// Connections registered when the pass started
    pub recipients: usize,
    pub delivered: usize,
    pub evicted: usize,
}

/// Drains the snapshot queue and delivers each snapshot to all subscribers
pub struct BroadcastServer {
    registry: Arc<ConnectionRegistry>,
    queue: SnapshotReceiver,
    send_timeout: Duration,
}

impl BroadcastServer {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        queue: SnapshotReceiver,
        send_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            queue,
            send_timeout,
        }
    }

    /// Run the fan-out loop (call in a spawned task)
    #[instrument(skip(self, shutdown))]
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("Broadcasting snapshots");

        loop {
            tokio::select! {
                next = self.queue.recv() => {
                    let Some(snapshot) = next else {
                        info!("Snapshot queue closed, broadcast loop stopping");
                        break;
                    };
                    match self.broadcast(&snapshot).await {
                        Ok(report) => debug!(
                            "Broadcast {} namespaces: {}/{} delivered, {} evicted",
                            snapshot.len(),
                            report.delivered,
                            report.recipients,
                            report.evicted
                        ),
                        Err(e) => error!("Failed to broadcast snapshot: {}", e),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Broadcast server shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Serialize once and deliver to every registered connection
    pub async fn broadcast(&self, snapshot: &Snapshot) -> Result<FanOutReport> {
        let frame: Frame = Arc::from(snapshot.to_frame()?);
        Ok(self.fan_out(frame).await)
    }

    /// Send one frame to the connections registered right now.
    ///
    /// Sends run concurrently, each bounded by the send timeout. A failed
    /// connection is evicted without affecting the others.
    pub async fn fan_out(&self, frame: Frame) -> FanOutReport {
        let recipients = self.registry.snapshot();
        let mut report = FanOutReport {
            recipients: recipients.len(),
            ..Default::default()
        };

        let results = join_all(recipients.iter().map(|connection| {
            let frame = frame.clone();
            async move { (connection.id(), connection.send(frame, self.send_timeout).await) }
        }))
        .await;
        drop(recipients);

        for (id, result) in results {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    if self.registry.unregister(id) {
                        warn!("Evicted subscriber {}: {}", id, e);
                    }
                    report.evicted += 1;
                }
            }
        }

        report
    }
}
