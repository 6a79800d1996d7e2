//! WebSocket handlers
//!
//! Each subscriber gets a bounded outbound queue drained by its own writer
//! task, so a slow socket never holds up the fan-out.

pub mod subscribe;

/// Frames buffered per subscriber before fan-out sends start waiting
pub const WS_BUFFER_SIZE: usize = 16;
