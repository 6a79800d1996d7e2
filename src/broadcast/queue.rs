//! Bounded snapshot queue between the collector and the broadcast server
//!
//! Single producer, single consumer, FIFO. A submission waits up to the
//! configured deadline for room; after that the new snapshot is dropped.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::warn;

use crate::error::{Result, VisualizerError};
use crate::models::Snapshot;

/// What happened to a submitted snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Queued,
    /// The queue stayed full for the whole submit deadline
    Dropped,
}

/// Create a queue holding at most `capacity` pending snapshots
pub fn snapshot_queue(capacity: usize, submit_timeout: Duration) -> (SnapshotSender, SnapshotReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        SnapshotSender { tx, submit_timeout },
        SnapshotReceiver { rx },
    )
}

#[derive(Debug, Clone)]
pub struct SnapshotSender {
    tx: mpsc::Sender<Snapshot>,
    submit_timeout: Duration,
}

impl SnapshotSender {
    /// Queue a snapshot for broadcast.
    ///
    /// Fails only when the broadcast server has gone away.
    pub async fn submit(&self, snapshot: Snapshot) -> Result<Submission> {
        match self.tx.send_timeout(snapshot, self.submit_timeout).await {
            Ok(()) => Ok(Submission::Queued),
            Err(mpsc::error::SendTimeoutError::Timeout(dropped)) => {
                warn!(
                    "Snapshot queue full for {}s, dropping snapshot of {} namespaces",
                    self.submit_timeout.as_secs(),
                    dropped.len()
                );
                Ok(Submission::Dropped)
            }
            Err(mpsc::error::SendTimeoutError::Closed(_)) => Err(VisualizerError::QueueClosed),
        }
    }
}

#[derive(Debug)]
pub struct SnapshotReceiver {
    rx: mpsc::Receiver<Snapshot>,
}

impl SnapshotReceiver {
    /// Next snapshot in submission order, `None` once every sender is gone
    pub async fn recv(&mut self) -> Option<Snapshot> {
        self.rx.recv().await
    }
}
