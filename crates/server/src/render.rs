// crates/server/src/render.rs
//! The media pipeline behind the opaque-worker seam.
//!
//! The server never looks at pixels. It hands a renderer an input path, an
//! output path and a progress sink, and waits for one terminal answer.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use holoforge_core::AppConfig;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Progress sink handed to renderers. Values are percentages, 0..=100;
/// out-of-order values are the driver's problem, not the renderer's.
pub type ProgressSink = Box<dyn Fn(u8) + Send + Sync>;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to read input {path}: {source}")]
    Input {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write output {path}: {source}")]
    Output {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start renderer command: {0}")]
    Spawn(#[source] std::io::Error),

    /// What the pipeline itself reported. The message becomes the job's
    /// `error_detail` verbatim.
    #[error("{message}")]
    Pipeline { message: String },
}

/// Transforms one input file into one output artifact.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(
        &self,
        input: &Path,
        output: &Path,
        progress: ProgressSink,
    ) -> Result<(), RenderError>;
}

/// Renderer selection for a configuration: the external command when
/// `render_cmd` is set, the built-in pipeline otherwise.
pub fn from_config(config: &AppConfig) -> Arc<dyn Renderer> {
    match config.render_cmd.as_deref() {
        Some(cmd) => match CommandRenderer::from_command_line(cmd) {
            Some(renderer) => {
                tracing::info!(command = %cmd, "Using external renderer");
                Arc::new(renderer)
            }
            None => {
                tracing::warn!("Renderer command is empty; using built-in pipeline");
                Arc::new(PassthroughRenderer)
            }
        },
        None => Arc::new(PassthroughRenderer),
    }
}

/// Built-in stand-in pipeline: streams the source media to the artifact
/// path in fixed-size chunks, reporting byte-proportional progress. Large
/// uploads produce a visible progress ramp; small ones complete in one hop.
#[derive(Debug, Default)]
pub struct PassthroughRenderer;

const COPY_CHUNK_BYTES: usize = 64 * 1024;

#[async_trait]
impl Renderer for PassthroughRenderer {
    async fn render(
        &self,
        input: &Path,
        output: &Path,
        progress: ProgressSink,
    ) -> Result<(), RenderError> {
        let input_err = |source| RenderError::Input {
            path: input.display().to_string(),
            source,
        };
        let output_err = |source| RenderError::Output {
            path: output.display().to_string(),
            source,
        };

        let mut src = tokio::fs::File::open(input).await.map_err(input_err)?;
        let total = src.metadata().await.map_err(input_err)?.len().max(1);
        let mut dst = tokio::fs::File::create(output).await.map_err(output_err)?;

        progress(0);
        let mut buf = vec![0u8; COPY_CHUNK_BYTES];
        let mut copied: u64 = 0;
        loop {
            let n = src.read(&mut buf).await.map_err(input_err)?;
            if n == 0 {
                break;
            }
            dst.write_all(&buf[..n]).await.map_err(output_err)?;
            copied += n as u64;
            progress(((copied * 100) / total).min(100) as u8);
        }
        dst.flush().await.map_err(output_err)?;
        progress(100);
        Ok(())
    }
}

/// Runs a configured external command as `<program> [args..] <input> <output>`.
///
/// The tool owns its own progress reporting channel (if any), so this
/// renderer only marks start and end. Stderr is captured and becomes the
/// failure detail on a non-zero exit.
pub struct CommandRenderer {
    program: String,
    args: Vec<String>,
}

impl CommandRenderer {
    /// Parse a whitespace-separated command line, e.g. the value of
    /// `HOLOFORGE_RENDER_CMD`. Returns `None` for a blank string.
    pub fn from_command_line(cmd: &str) -> Option<Self> {
        let mut parts = cmd.split_whitespace().map(String::from);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }
}

#[async_trait]
impl Renderer for CommandRenderer {
    async fn render(
        &self,
        input: &Path,
        output: &Path,
        progress: ProgressSink,
    ) -> Result<(), RenderError> {
        progress(0);

        let result = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(input)
            .arg(output)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(RenderError::Spawn)?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                format!("renderer exited with {}", result.status)
            } else {
                stderr
            };
            return Err(RenderError::Pipeline { message });
        }

        progress(100);
        Ok(())
    }
}
