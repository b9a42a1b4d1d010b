// crates/server/src/routes/mod.rs
//! API route handlers for the holoforge server.

pub mod artifacts;
pub mod health;
pub mod status;
pub mod upload;
pub mod watch;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined API router.
///
/// Routes:
/// - POST /upload - Submit one media file, get a job id back
/// - GET  /ws/{job_id} - WebSocket stream of status transitions
/// - GET  /status/{job_id} - One-shot job snapshot
/// - GET  /download/{job_id} - Stream the finished artifact
/// - GET  /health - Liveness probe
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(health::router())
        .merge(upload::router())
        .merge(watch::router())
        .merge(status::router())
        .merge(artifacts::router())
        .with_state(state)
}
