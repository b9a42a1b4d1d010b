// crates/client/src/error.rs
use thiserror::Error;

use crate::reconciler::PhaseError;

/// Errors returned by Holoforge client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The server returned a non-success HTTP status. `body` carries the
    /// server's human-readable `error` message when one was sent.
    #[error("server returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The response was missing expected fields.
    #[error("{0}")]
    InvalidResponse(String),

    /// The server does not know this job.
    #[error("job not found")]
    JobNotFound,

    /// Timed out waiting for the job to settle.
    #[error("timed out waiting for the job to settle")]
    Timeout,

    /// Network-level request failure with context.
    #[error("{context}: {source}")]
    Network {
        context: String,
        source: reqwest::Error,
    },

    /// WebSocket-level transport failure.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// A local file could not be read for upload.
    #[error("cannot read {path}: {source}")]
    File {
        path: String,
        source: std::io::Error,
    },

    /// A flow call arrived in a phase that forbids it.
    #[error(transparent)]
    Phase(#[from] PhaseError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ClientError>;
