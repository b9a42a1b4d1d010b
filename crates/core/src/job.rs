// crates/core/src/job.rs
//! Job lifecycle: the state machine every other component projects from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TransitionError;
use crate::event::StatusEvent;

/// Opaque job identifier. UUIDv4 under the hood, so identifiers are never
/// reused across restarts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl From<&str> for JobId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

/// Lifecycle states. `Completed` and `Failed` are terminal: once entered,
/// the record never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of submitted work.
///
/// The registry holds the authoritative copy; everything on the wire is a
/// projection of this record. All mutation goes through the guarded methods
/// below, which reject anything the lifecycle forbids (regressions, edits
/// after a terminal state) so callers can log and discard bad updates
/// instead of corrupting the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub state: JobState,
    /// Percent complete, 0..=100. Meaningful while `Processing`; forced to
    /// 100 on completion.
    pub progress: u8,
    /// Output-directory basename. `Some` iff `Completed`.
    pub output_ref: Option<String>,
    /// Worker-supplied failure cause. `Some` iff `Failed`.
    pub error_detail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(id: JobId) -> Self {
        Self {
            id,
            state: JobState::Queued,
            progress: 0,
            output_ref: None,
            error_detail: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Queued → Processing. A no-op when already processing.
    pub fn begin(&mut self) -> Result<(), TransitionError> {
        match self.state {
            JobState::Queued => {
                self.state = JobState::Processing;
                self.started_at = Some(Utc::now());
                Ok(())
            }
            JobState::Processing => Ok(()),
            state => Err(TransitionError::Terminal { state }),
        }
    }

    /// Raise progress. Regressions and values above 100 are rejected.
    /// A progress report implies work has started, so a `Queued` job is
    /// promoted to `Processing` first.
    pub fn advance(&mut self, pct: u8) -> Result<(), TransitionError> {
        if self.state.is_terminal() {
            return Err(TransitionError::Terminal { state: self.state });
        }
        if pct > 100 {
            return Err(TransitionError::OutOfRange { proposed: pct });
        }
        if pct < self.progress {
            return Err(TransitionError::Regressive {
                current: self.progress,
                proposed: pct,
            });
        }
        self.begin()?;
        self.progress = pct;
        Ok(())
    }

    /// The single transition into `Completed`. `output_ref` must be an
    /// output-directory basename, never a client-supplied path.
    pub fn complete(&mut self, output_ref: impl Into<String>) -> Result<(), TransitionError> {
        if self.state.is_terminal() {
            return Err(TransitionError::Terminal { state: self.state });
        }
        self.state = JobState::Completed;
        self.progress = 100;
        self.output_ref = Some(output_ref.into());
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// The single transition into `Failed`.
    pub fn fail(&mut self, detail: impl Into<String>) -> Result<(), TransitionError> {
        if self.state.is_terminal() {
            return Err(TransitionError::Terminal { state: self.state });
        }
        self.state = JobState::Failed;
        self.error_detail = Some(detail.into());
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Wire projection of the current state, used to hydrate new
    /// subscribers before live events start flowing.
    pub fn status_event(&self) -> StatusEvent {
        match self.state {
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

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_job() -> Job {
        Job::new(JobId::generate())
    }

    #[test]
    fn test_happy_path_lifecycle() {
        let mut job = fresh_job();
        assert_eq!(job.state, JobState::Queued);
        assert_eq!(job.progress, 0);

        job.begin().unwrap();
        assert_eq!(job.state, JobState::Processing);
        assert!(job.started_at.is_some());

        job.advance(40).unwrap();
        job.advance(80).unwrap();
        assert_eq!(job.progress, 80);

        job.complete("hologram_photo_abc.png").unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.progress, 100, "completion forces progress to 100");
        assert_eq!(job.output_ref.as_deref(), Some("hologram_photo_abc.png"));
        assert!(job.finished_at.is_some());
    }

    #[test]
    fn test_terminal_states_are_sticky() {
        let mut job = fresh_job();
        job.complete("out.png").unwrap();

        assert_eq!(
            job.fail("late failure"),
            Err(TransitionError::Terminal {
                state: JobState::Completed
            })
        );
        assert_eq!(
            job.advance(50),
            Err(TransitionError::Terminal {
                state: JobState::Completed
            })
        );
        assert_eq!(
            job.complete("other.png"),
            Err(TransitionError::Terminal {
                state: JobState::Completed
            })
        );

        // The record is untouched by the rejected updates.
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.output_ref.as_deref(), Some("out.png"));
        assert!(job.error_detail.is_none());
    }

    #[test]
    fn test_progress_never_regresses() {
        let mut job = fresh_job();
        job.advance(60).unwrap();

        assert_eq!(
            job.advance(30),
            Err(TransitionError::Regressive {
                current: 60,
                proposed: 30
            })
        );
        assert_eq!(job.progress, 60, "rejected update must not change progress");

        // Duplicate delivery of the same value is harmless.
        job.advance(60).unwrap();
        assert_eq!(job.progress, 60);
    }

    #[test]
    fn test_progress_out_of_range_rejected() {
        let mut job = fresh_job();
        assert_eq!(
            job.advance(101),
            Err(TransitionError::OutOfRange { proposed: 101 })
        );
        assert_eq!(job.state, JobState::Queued);
    }

    #[test]
    fn test_advance_promotes_queued_job() {
        let mut job = fresh_job();
        job.advance(10).unwrap();
        assert_eq!(job.state, JobState::Processing);
        assert!(job.started_at.is_some());
    }

    #[test]
    fn test_failure_records_detail() {
        let mut job = fresh_job();
        job.begin().unwrap();
        job.advance(30).unwrap();
        job.fail("decode error").unwrap();

        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.error_detail.as_deref(), Some("decode error"));
        assert!(job.output_ref.is_none());
        assert_eq!(job.progress, 30, "failure keeps the last known progress");
    }

    #[test]
    fn test_begin_is_idempotent_while_processing() {
        let mut job = fresh_job();
        job.begin().unwrap();
        let started = job.started_at;
        job.begin().unwrap();
        assert_eq!(job.started_at, started);
    }

    #[test]
    fn test_status_event_projection() {
        let mut job = fresh_job();
        assert_eq!(job.status_event(), StatusEvent::Queued);

        job.advance(45).unwrap();
        assert_eq!(
            job.status_event(),
            StatusEvent::Processing { progress: 45 }
        );

        job.complete("hologram_x_1.png").unwrap();
        assert_eq!(
            job.status_event(),
            StatusEvent::Completed {
                output_ref: "hologram_x_1.png".into()
            }
        );
    }

    #[test]
    fn test_job_ids_are_unique() {
        let a = JobId::generate();
        let b = JobId::generate();
        assert_ne!(a, b);
    }
}
