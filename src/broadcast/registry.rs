//! Registry of live subscriber connections
//!
//! Every mutation and every iteration takes the same mutex. Nothing performs
//! I/O while holding it: the fan-out path copies the handles out with
//! `snapshot()` and sends afterwards.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{Result, VisualizerError};

pub type ConnectionId = Uuid;

/// One serialized snapshot, shared by every recipient of a pass
pub type Frame = Arc<str>;

/// Sending half of one subscriber's outbound queue.
///
/// The registry holds the only long-lived clone; once it is unregistered the
/// queue closes and the connection's writer shuts the socket.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    tx: mpsc::Sender<Frame>,
    connected_at: DateTime<Utc>,
}

impl Connection {
    /// Create a connection with an outbound queue of `buffer` frames
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let connection = Self {
            id: Uuid::new_v4(),
            tx,
            connected_at: Utc::now(),
        };
        (connection, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Queue a frame, waiting at most `deadline` for room
    pub async fn send(&self, frame: Frame, deadline: Duration) -> Result<()> {
        match self.tx.send_timeout(frame, deadline).await {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendTimeoutError::Timeout(_)) => Err(VisualizerError::SendTimeout),
            Err(mpsc::error::SendTimeoutError::Closed(_)) => {
                Err(VisualizerError::SubscriberGone(self.id))
            }
        }
    }
}

/// The authoritative set of subscribed connections
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<ConnectionId, Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection. Returns false if this identity is already registered.
    pub fn register(&self, connection: Connection) -> bool {
        match self.connections.lock().entry(connection.id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(connection);
                true
            }
        }
    }

    /// Remove a connection and release its outbound queue.
    ///
    /// Returns true only for the call that actually removed it.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        let removed = self.connections.lock().remove(&id);
        removed.is_some()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.lock().contains_key(&id)
    }

    /// Copy of the current set, for sending outside the lock
    pub fn snapshot(&self) -> Vec<Connection> {
        self.connections.lock().values().cloned().collect()
    }

    /// Visit every connection under the lock. `visit` must not block.
    pub fn for_each<F>(&self, mut visit: F)
    where
        F: FnMut(&Connection),
    {
        for connection in self.connections.lock().values() {
            visit(connection);
        }
    }

    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.lock().is_empty()
    }
}
