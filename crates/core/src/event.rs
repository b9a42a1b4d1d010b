// crates/core/src/event.rs
//! Status events: the wire frames pushed over a job's progress channel.

use serde::{Deserialize, Serialize};

/// One frame on the progress channel, tagged by `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatusEvent {
    /// Hydration frame for a job that has not started work yet.
    Queued,
    Processing { progress: u8 },
    Completed { output_ref: String },
    Failed { error_detail: String },
}

impl StatusEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}

/// Lenient decode for channel consumers.
///
/// Known frames parse into `StatusEvent`. A frame with a `status` the
/// consumer does not recognize is informational, not a transition, so it
/// comes back as `Frame::Info`. Everything else is `Frame::Malformed` and
/// callers are expected to log and drop it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Event(StatusEvent),
    Info(String),
    Malformed,
}

pub fn parse_frame(text: &str) -> Frame {
    if let Ok(event) = serde_json::from_str::<StatusEvent>(text) {
        return Frame::Event(event);
    }
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value) => match value.get("status").and_then(|s| s.as_str()) {
            Some(status) => Frame::Info(status.to_string()),
            None => Frame::Malformed,
        },
        Err(_) => Frame::Malformed,
    }
}
