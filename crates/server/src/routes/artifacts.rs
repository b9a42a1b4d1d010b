// crates/server/src/routes/artifacts.rs
//! Finished-artifact download.
//!
//! `GET /download/{job_id}` streams the rendered artifact as an attachment.
//! Anything short of a completed job with its file on disk is reported as
//! not ready; the caller cannot tell (and must not care) whether the job is
//! still running, failed, or never existed.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    routing::get,
    Router,
};
use holoforge_core::{JobId, JobState};
use tokio_util::io::ReaderStream;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// GET /download/{job_id} - stream the artifact of a completed job.
pub async fn download_artifact(
    Path(job_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<impl IntoResponse> {
    let id = JobId::from(job_id);
    let job = state
        .registry
        .snapshot(&id)
        .ok_or_else(|| ApiError::NotReady(id.to_string()))?;

    if job.state != JobState::Completed {
        return Err(ApiError::NotReady(id.to_string()));
    }
    // Completed implies output_ref is set; an empty one means the record
    // was corrupted, which reads the same as a missing artifact.
    let Some(output_ref) = job.output_ref.filter(|r| !r.is_empty()) else {
        tracing::error!(job_id = %id, "Completed job has no artifact reference");
        return Err(ApiError::NotReady(id.to_string()));
    };

    let path = state.config.output_path(&output_ref);
    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) => {
            tracing::error!(job_id = %id, path = %path.display(), error = %e, "Artifact file missing");
            return Err(ApiError::NotReady(id.to_string()));
        }
    };

    let content_type = match path.extension().and_then(|e| e.to_str()) {
        Some("png") => "image/png",
        Some("mp4") => "video/mp4",
        _ => "application/octet-stream",
    };

    let body = Body::from_stream(ReaderStream::new(file));
    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{output_ref}\""),
            ),
        ],
        body,
    ))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/download/{job_id}", get(download_artifact))
}
