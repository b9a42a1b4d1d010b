// crates/client/src/api.rs
//! REST client for a Holoforge server.

use std::path::Path;
use std::time::Duration;

use holoforge_core::{JobId, JobState, MediaKind, StatusEvent};
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::Client;
use serde::Deserialize;

use crate::error::{ClientError, Result};

fn normalize(endpoint: String) -> String {
    endpoint.trim_end_matches('/').to_string()
}

/// Pull the server's human-readable `error` message out of an error body,
/// falling back to the raw body when it is not the JSON shape we expect.
fn error_body(status: u16, body: String) -> ClientError {
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
        .unwrap_or(body);
    ClientError::Http {
        status,
        body: message,
    }
}

fn filename_from_disposition(value: &str) -> Option<String> {
    let start = value.find("filename=\"")? + "filename=\"".len();
    let rest = &value[start..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

/// Response to an accepted upload.
#[derive(Debug, Clone, Deserialize)]
pub struct Submission {
    pub job_id: JobId,
    #[serde(default)]
    pub message: String,
    pub status_url: String,
}

/// One `GET /status/{job_id}` snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub status: JobState,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub output_ref: Option<String>,
    #[serde(default)]
    pub error_detail: Option<String>,
}

impl JobSnapshot {
    /// Project the snapshot onto the wire-event shape, so the poll fallback
    /// feeds the reconciler exactly like the live channel does.
    pub fn to_event(&self) -> StatusEvent {
        match self.status {
            JobState::Queued => StatusEvent::Queued,
            JobState::Processing => StatusEvent::Processing {
                progress: self.progress,
            },
            JobState::Completed => StatusEvent::Completed {
                output_ref: self.output_ref.clone().unwrap_or_default(),
            },
            JobState::Failed => StatusEvent::Failed {
                error_detail: self.error_detail.clone().unwrap_or_default(),
            },
        }
    }
}

/// A downloaded output artifact.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Async client for a Holoforge server.
///
/// REST methods for submitting media, reading job snapshots, and fetching
/// artifacts. The live progress channel lives in [`crate::watch`] and
/// derives its URL from [`HoloClient::ws_endpoint`].
///
/// # Example
/// ```no_run
/// use holoforge_client::HoloClient;
///
/// # async fn example() -> holoforge_client::Result<()> {
/// let client = HoloClient::new("http://127.0.0.1:47810");
/// let healthy = client.health().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HoloClient {
    http: Client,
    endpoint: String,
}

impl HoloClient {
    /// Create a new client pointing at the given server endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            endpoint: normalize(endpoint.into()),
        }
    }

    /// Use a custom `reqwest::Client` (connection pooling, proxies, TLS).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// Returns the configured endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The progress-channel URL for one job.
    pub fn ws_endpoint(&self, job_id: &JobId) -> String {
        format!(
            "{}/ws/{}",
            self.endpoint
                .replace("http://", "ws://")
                .replace("https://", "wss://"),
            job_id
        )
    }

    /// Check whether the server is reachable via `/health`.
    pub async fn health(&self) -> Result<bool> {
        let url = format!("{}/health", self.endpoint);
        let resp = self
            .http
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| ClientError::Network {
                context: format!("cannot reach {}", self.endpoint),
                source: e,
            })?;
        Ok(resp.status().is_success())
    }

    /// Upload one media file. Returns the accepted job's identity.
    ///
    /// The declared content type is a hint derived from the extension; the
    /// server validates the actual bytes either way.
    pub async fn submit(&self, path: &Path) -> Result<Submission> {
        let bytes = tokio::fs::read(path).await.map_err(|e| ClientError::File {
            path: path.display().to_string(),
            source: e,
        })?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();
        let mime = MediaKind::from_extension(&filename)
            .map(MediaKind::mime)
            .unwrap_or("application/octet-stream");

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename)
            .mime_str(mime)
            .map_err(|e| ClientError::Network {
                context: "invalid upload content type".into(),
                source: e,
            })?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let url = format!("{}/upload", self.endpoint);
        let resp = self
            .http
            .post(&url)
            .timeout(Duration::from_secs(120))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ClientError::Network {
                context: format!("cannot reach {}", self.endpoint),
                source: e,
            })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(error_body(status, body));
        }

        let submission: Submission =
            resp.json().await.map_err(|e| ClientError::Network {
                context: "failed to parse upload response".into(),
                source: e,
            })?;
        if submission.job_id.as_str().is_empty() {
            return Err(ClientError::InvalidResponse(
                "upload response missing job id".into(),
            ));
        }
        Ok(submission)
    }

    /// Fetch one job snapshot.
    pub async fn status(&self, job_id: &JobId) -> Result<JobSnapshot> {
        let url = format!("{}/status/{}", self.endpoint, job_id);
        let resp = self
            .http
            .get(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| ClientError::Network {
                context: format!("cannot reach {}", self.endpoint),
                source: e,
            })?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ClientError::JobNotFound);
        }
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(error_body(status, body));
        }

        resp.json().await.map_err(|e| ClientError::Network {
            context: "failed to parse status response".into(),
            source: e,
        })
    }

    /// Download a completed job's artifact.
    pub async fn download(&self, job_id: &JobId) -> Result<Artifact> {
        let url = format!("{}/download/{}", self.endpoint, job_id);
        let resp = self
            .http
            .get(&url)
            .timeout(Duration::from_secs(60))
            .send()
            .await
            .map_err(|e| ClientError::Network {
                context: format!("cannot reach {}", self.endpoint),
                source: e,
            })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(error_body(status, body));
        }

        // The server always names the attachment; the job id is a fallback
        // for a stripped header.
        let filename = resp
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(filename_from_disposition)
            .unwrap_or_else(|| job_id.to_string());

        let bytes = resp.bytes().await.map_err(|e| ClientError::Network {
            context: "failed to read artifact bytes".into(),
            source: e,
        })?;

        Ok(Artifact {
            filename,
            bytes: bytes.to_vec(),
        })
    }
}
