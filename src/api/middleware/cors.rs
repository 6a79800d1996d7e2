//! CORS middleware configuration
//!
//! The visualizer front end is usually served from another origin. With no
//! origins configured every origin may subscribe; otherwise only the listed
//! ones get CORS headers.

use axum::http::header;
use axum::http::{HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, warn};

/// Create a CORS layer for the given allowed origins
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    if allowed_origins.is_empty() {
        debug!("CORS: No origins specified, allowing any origin");
        return base.allow_origin(Any);
    }

    debug!("CORS: Allowing origins: {:?}", allowed_origins);
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("CORS: Ignoring invalid origin {:?}", origin);
                None
            }
        })
        .collect();

    base.allow_origin(origins)
}
