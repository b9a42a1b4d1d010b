// crates/server/src/routes/upload.rs
//! Media submission endpoint.
//!
//! `POST /upload` (multipart, field `file`) validates the upload against
//! the policy, persists it under a server-controlled name, registers a
//! `Queued` job and spawns its render worker. The job id is returned only
//! after the record exists, so a status check or watch that races the
//! response can never miss the job.

use std::path::Path;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Multipart, State},
    routing::post,
    Json, Router,
};
use holoforge_core::{JobId, ValidationError};
use serde::Serialize;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::worker;

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct UploadResponse {
    pub job_id: JobId,
    pub message: String,
    pub status_url: String,
}

/// POST /upload - accept one media file and start a render job.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let Some((filename, declared_mime, bytes)) = next_file_field(&mut multipart).await? else {
        return Err(ValidationError::MissingFile.into());
    };

    let kind = state
        .config
        .policy()
        .validate(&filename, declared_mime.as_deref(), &bytes)?;

    // Client names are used for display and stem only; the stored name is
    // the job id plus the basename, rooted in the upload dir.
    let basename = Path::new(&filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string();

    let entry = state.registry.create();
    let stored = format!("{}_{}", entry.id(), basename);
    let input_path = state.config.upload_path(&stored);

    if let Err(e) = tokio::fs::write(&input_path, &bytes).await {
        tracing::error!(job_id = %entry.id(), error = %e, "Failed to persist upload");
        // The record must still settle; nothing will ever process it.
        let _ = entry.fail("could not persist upload");
        return Err(ApiError::Internal(format!(
            "failed to persist upload: {e}"
        )));
    }

    tracing::info!(
        job_id = %entry.id(),
        file = %basename,
        size_bytes = bytes.len(),
        kind = ?kind,
        "Upload accepted"
    );

    let job_id = entry.id().clone();
    worker::spawn_render(state.clone(), entry, input_path, basename, kind);

    Ok(Json(UploadResponse {
        status_url: format!("/status/{job_id}"),
        message: "File uploaded successfully. Processing started.".to_string(),
        job_id,
    }))
}

/// Pull the `file` field out of the multipart stream.
async fn next_file_field(
    multipart: &mut Multipart,
) -> ApiResult<Option<(String, Option<String>, Bytes)>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let declared_mime = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read upload body: {e}")))?;
        return Ok(Some((filename, declared_mime, bytes)));
    }
    Ok(None)
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/upload", post(upload))
}
