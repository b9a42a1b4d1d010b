// crates/core/src/config.rs
//! Runtime configuration, read once from the environment at startup.

use std::path::PathBuf;

use crate::media::{UploadPolicy, DEFAULT_MAX_BYTES};

/// Default port for the server.
pub const DEFAULT_PORT: u16 = 47810;

/// Where uploads land, where artifacts go, and how much we accept.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
    pub max_file_size: u64,
    /// External renderer command; `None` selects the built-in pipeline.
    pub render_cmd: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            upload_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("outputs"),
            max_file_size: DEFAULT_MAX_BYTES,
            render_cmd: None,
        }
    }
}

impl AppConfig {
    /// Read configuration from the environment.
    ///
    /// `HOLOFORGE_PORT` falls back to `PORT` so container platforms that
    /// inject the latter keep working.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: std::env::var("HOLOFORGE_PORT")
                .ok()
                .or_else(|| std::env::var("PORT").ok())
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            upload_dir: std::env::var("HOLOFORGE_UPLOAD_DIR")
                .ok()
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            output_dir: std::env::var("HOLOFORGE_OUTPUT_DIR")
                .ok()
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            max_file_size: std::env::var("HOLOFORGE_MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_file_size),
            render_cmd: std::env::var("HOLOFORGE_RENDER_CMD")
                .ok()
                .filter(|cmd| !cmd.trim().is_empty()),
        }
    }

    /// Create the upload and output directories if they are missing.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.upload_dir)?;
        std::fs::create_dir_all(&self.output_dir)?;
        Ok(())
    }

    pub fn policy(&self) -> UploadPolicy {
        UploadPolicy::new(self.max_file_size)
    }

    pub fn upload_path(&self, basename: &str) -> PathBuf {
        self.upload_dir.join(basename)
    }

    pub fn output_path(&self, basename: &str) -> PathBuf {
        self.output_dir.join(basename)
    }
}
