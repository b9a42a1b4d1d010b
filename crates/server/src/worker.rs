// crates/server/src/worker.rs
//! Background driver for one render job.
//!
//! Spawned per accepted upload. Owns the job's entire lifecycle after
//! `Queued`: promotes it to `Processing`, forwards renderer progress
//! through the registry guards, and applies exactly one terminal
//! transition. Nothing here can touch any other job.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use holoforge_core::{JobId, MediaKind};

use crate::registry::JobEntry;
use crate::render::ProgressSink;
use crate::state::AppState;

/// Artifact basename for a finished job. Derived from the client's file
/// stem plus the job id, so names are server-controlled and collision-free.
pub fn artifact_name(original_name: &str, kind: MediaKind, id: &JobId) -> String {
    let stem = Path::new(original_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("upload");
    format!("hologram_{stem}_{id}.{ext}", ext = kind.artifact_extension())
}

/// Drive one job to a terminal state on a background task.
pub fn spawn_render(
    state: Arc<AppState>,
    entry: Arc<JobEntry>,
    input: PathBuf,
    original_name: String,
    kind: MediaKind,
) {
    let guard_entry = entry.clone();
    tokio::spawn(async move {
        let task = tokio::spawn(run(state, entry, input, original_name, kind));
        // A renderer panic must still leave the job terminal, or watchers
        // would hang on a record that never settles.
        if let Err(e) = task.await {
            if e.is_panic() {
                tracing::error!(job_id = %guard_entry.id(), "Render task panicked");
                let _ = guard_entry.fail("internal error: render task panicked");
            }
        }
    });
}

async fn run(
    state: Arc<AppState>,
    entry: Arc<JobEntry>,
    input: PathBuf,
    original_name: String,
    kind: MediaKind,
) {
    let job_id = entry.id().clone();
    let _ = entry.begin();

    let artifact = artifact_name(&original_name, kind, &job_id);
    let output = state.config.output_path(&artifact);

    let sink_entry = entry.clone();
    let progress: ProgressSink = Box::new(move |pct| {
        let _ = sink_entry.advance(pct);
    });

    let started = Instant::now();
    match state.renderer.render(&input, &output, progress).await {
        Ok(()) => {
            let _ = entry.complete(&artifact);
            tracing::info!(
                job_id = %job_id,
                artifact = %artifact,
                duration_secs = started.elapsed().as_secs_f64(),
                "Render complete"
            );
        }
        Err(e) => {
            tracing::warn!(job_id = %job_id, error = %e, "Render failed");
            let _ = entry.fail(e.to_string());
        }
    }
}
