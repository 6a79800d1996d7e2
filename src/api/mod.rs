//! Subscription server
//!
//! Accepts WebSocket subscribers on `/ws` and exposes health and status
//! endpoints for operators.

pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod websocket;

pub use server::{ApiServer, AppState};
