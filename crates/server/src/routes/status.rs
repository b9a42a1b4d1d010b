// crates/server/src/routes/status.rs
//! One-shot job snapshot, for clients that poll instead of watching.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use holoforge_core::{Job, JobId, JobState};
use serde::Serialize;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub job_id: JobId,
    pub status: JobState,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<Job> for StatusResponse {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.id,
            status: job.state,
            progress: job.progress,
            output_ref: job.output_ref,
            error_detail: job.error_detail,
            created_at: job.created_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
        }
    }
}

/// GET /status/{job_id} - current record for one job.
pub async fn job_status(
    Path(job_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<StatusResponse>> {
    let id = JobId::from(job_id);
    let job = state
        .registry
        .snapshot(&id)
        .ok_or_else(|| ApiError::JobNotFound(id.to_string()))?;
    Ok(Json(job.into()))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/status/{job_id}", get(job_status))
}
