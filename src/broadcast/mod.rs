//! Snapshot broadcasting
//!
//! - `queue`: bounded FIFO between the collector and the fan-out loop
//! - `registry`: the set of live subscriber connections
//! - `server`: the fan-out loop evicting subscribers that fail to receive

pub mod queue;
pub mod registry;
pub mod server;

pub use queue::{snapshot_queue, SnapshotReceiver, SnapshotSender, Submission};
pub use registry::{Connection, ConnectionId, ConnectionRegistry, Frame};
pub use server::{BroadcastServer, FanOutReport};
