// crates/server/src/main.rs
//! Holoforge server binary.
//!
//! Reads its configuration from the environment, prepares the upload and
//! output directories, then serves the API until killed.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use holoforge_core::AppConfig;
use holoforge_server::{create_app, AppState};
use tracing_subscriber::EnvFilter;

/// Get the static directory for serving frontend files.
///
/// Priority:
/// 1. STATIC_DIR environment variable (explicit override)
/// 2. ./static directory (if it exists)
/// 3. None (API-only mode)
fn get_static_dir() -> Option<PathBuf> {
    std::env::var("STATIC_DIR")
        .ok()
        .map(PathBuf::from)
        .or_else(|| {
            let dir = PathBuf::from("static");
            dir.exists().then_some(dir)
        })
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .init();

    let config = AppConfig::from_env();
    config.ensure_dirs()?;

    eprintln!("\n\u{1f52e} holoforge v{}\n", env!("CARGO_PKG_VERSION"));

    let port = config.port;
    let state = AppState::new(config);
    let app = create_app(state, get_static_dir());

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    eprintln!("  \u{2192} http://localhost:{}\n", port);
    tracing::info!(%addr, "Holoforge listening");

    axum::serve(listener, app).await?;

    Ok(())
}
