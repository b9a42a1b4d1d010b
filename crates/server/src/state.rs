// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::Instant;

use holoforge_core::AppConfig;

use crate::registry::JobRegistry;
use crate::render::{self, Renderer};

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    /// Runtime configuration: directories, size ceiling, renderer command.
    pub config: AppConfig,
    /// Authoritative job records and their progress channels.
    pub registry: JobRegistry,
    /// The media pipeline behind the opaque-worker seam.
    pub renderer: Arc<dyn Renderer>,
}

impl AppState {
    /// Create application state, selecting the renderer from the config
    /// (external command when `render_cmd` is set, built-in otherwise).
    pub fn new(config: AppConfig) -> Arc<Self> {
        let renderer = render::from_config(&config);
        Self::with_renderer(config, renderer)
    }

    /// Create application state with an explicit renderer.
    pub fn with_renderer(config: AppConfig, renderer: Arc<dyn Renderer>) -> Arc<Self> {
        Arc::new(Self {
            start_time: Instant::now(),
            config,
            registry: JobRegistry::new(),
            renderer,
        })
    }

    /// Server uptime in whole seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
