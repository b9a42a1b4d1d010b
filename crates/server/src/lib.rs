// crates/server/src/lib.rs
//! Holoforge server library.
//!
//! Axum-based HTTP server for the holoforge render service: clients upload
//! one media file, follow the render over a WebSocket, and download the
//! finished artifact.

pub mod error;
pub mod registry;
pub mod render;
pub mod routes;
pub mod state;
pub mod worker;

pub use error::*;
pub use routes::api_routes;
pub use state::AppState;

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Create the Axum application with all routes and middleware.
///
/// This sets up:
/// - API routes (upload, watch, status, download, health)
/// - static serving of finished artifacts under /outputs
/// - an optional static frontend at the root
/// - CORS for development (allows any origin)
/// - request tracing
pub fn create_app(state: Arc<AppState>, static_dir: Option<PathBuf>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // The transport cap sits above the policy ceiling so an oversized upload
    // still reaches the policy check and gets the contractual size message
    // instead of a bare 413.
    let body_limit = DefaultBodyLimit::max((2 * state.config.max_file_size) as usize);

    let outputs = ServeDir::new(&state.config.output_dir);

    let mut app = Router::new()
        .merge(api_routes(state))
        .nest_service("/outputs", outputs);

    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir).append_index_html_on_directories(true));
    }

    app.layer(body_limit)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

// ============================================================================
// Integration Tests
// ============================================================================
