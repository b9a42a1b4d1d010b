// crates/client/src/reconciler.rs
//! Status reconciliation: turning a stream of wire frames into display
//! state without races or stuck states.
//!
//! The reconciler is a pure state machine, no I/O. The transport
//! (`watch.rs`) feeds it frames; every application returns an [`Applied`]
//! outcome so callers and tests can see exactly what was accepted and what
//! was dropped.

use holoforge_core::{Frame, JobId, StatusEvent};
use thiserror::Error;

/// Where the submission flow currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Uploading,
    /// Upload accepted; the live channel is not open yet.
    Submitted { job_id: JobId },
    /// Live channel open, frames flowing.
    Watching { job_id: JobId },
    Done { output_ref: String },
    Errored { detail: String },
}

impl Phase {
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Errored { .. })
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Uploading => "uploading",
            Self::Submitted { .. } => "submitted",
            Self::Watching { .. } => "watching",
            Self::Done { .. } => "done",
            Self::Errored { .. } => "errored",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A flow call the current phase forbids.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {action} while {phase}")]
pub struct PhaseError {
    pub action: &'static str,
    pub phase: &'static str,
}

/// What one frame did to the display state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// Displayed progress advanced to this value.
    Progress(u8),
    Completed { output_ref: String },
    Failed { detail: String },
    /// Informational frame: recorded, no transition.
    Note(String),
    /// Dropped without touching display state.
    Ignored(Anomaly),
}

/// Why a frame was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anomaly {
    /// Progress lower than what is already displayed.
    Regressive,
    /// Progress equal to what is already displayed.
    Duplicate,
    /// Progress above 100.
    OutOfRange,
    /// Frame arrived after the job settled.
    AfterTerminal,
    /// Frame arrived before any job was being observed.
    NotWatching,
    Malformed,
}

/// Client-side mirror of one job's lifecycle.
///
/// Displayed progress is non-decreasing no matter how frames arrive; a
/// settled reconciler ignores everything, so duplicate terminal delivery
/// produces no observable change.
#[derive(Debug)]
pub struct StatusReconciler {
    phase: Phase,
    progress: u8,
    live_updates: bool,
    degraded_reason: Option<String>,
}

impl Default for StatusReconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusReconciler {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            progress: 0,
            live_updates: true,
            degraded_reason: None,
        }
    }

    /// Start observing a job that already exists on the server, skipping
    /// the upload phases.
    pub fn attached(job_id: JobId) -> Self {
        Self {
            phase: Phase::Submitted { job_id },
            progress: 0,
            live_updates: true,
            degraded_reason: None,
        }
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    /// Displayed progress, 0..=100.
    pub fn progress(&self) -> u8 {
        self.progress
    }

    /// False once the live channel has degraded to manual status checks.
    pub fn live_updates(&self) -> bool {
        self.live_updates
    }

    pub fn degraded_reason(&self) -> Option<&str> {
        self.degraded_reason.as_deref()
    }

    pub fn is_settled(&self) -> bool {
        self.phase.is_settled()
    }

    /// The job under observation, if any.
    pub fn job_id(&self) -> Option<&JobId> {
        match &self.phase {
            Phase::Submitted { job_id } | Phase::Watching { job_id } => Some(job_id),
            _ => None,
        }
    }

    /// Start a new submission. Allowed from `Idle` and from either settled
    /// phase, so a finished or failed flow can be retried. Resets the
    /// displayed progress.
    pub fn begin_upload(&mut self) -> Result<(), PhaseError> {
        match self.phase {
            Phase::Idle | Phase::Done { .. } | Phase::Errored { .. } => {
                self.phase = Phase::Uploading;
                self.progress = 0;
                self.live_updates = true;
                self.degraded_reason = None;
                Ok(())
            }
            _ => Err(self.forbidden("begin upload")),
        }
    }

    pub fn upload_succeeded(&mut self, job_id: JobId) -> Result<(), PhaseError> {
        match self.phase {
            Phase::Uploading => {
                self.phase = Phase::Submitted { job_id };
                Ok(())
            }
            _ => Err(self.forbidden("record an accepted upload")),
        }
    }

    /// Upload rejected or never reached the server. Actionable: a new
    /// `begin_upload` is permitted.
    pub fn upload_failed(&mut self, reason: impl Into<String>) -> Result<(), PhaseError> {
        match self.phase {
            Phase::Uploading => {
                self.phase = Phase::Errored {
                    detail: reason.into(),
                };
                Ok(())
            }
            _ => Err(self.forbidden("record a failed upload")),
        }
    }

    /// The live channel is open. Also accepted while already `Watching`,
    /// which is a reconnect; either way the degraded flag clears.
    pub fn channel_opened(&mut self) -> Result<(), PhaseError> {
        match &self.phase {
            Phase::Submitted { job_id } | Phase::Watching { job_id } => {
                self.phase = Phase::Watching {
                    job_id: job_id.clone(),
                };
                self.live_updates = true;
                self.degraded_reason = None;
                Ok(())
            }
            _ => Err(self.forbidden("open a channel")),
        }
    }

    /// The live channel is gone. Non-fatal by construction: the phase is
    /// preserved so a manual status check can still settle the job.
    pub fn channel_unavailable(&mut self, reason: impl Into<String>) {
        self.live_updates = false;
        self.degraded_reason = Some(reason.into());
    }

    /// Fold one frame into the display state.
    ///
    /// Accepted while a job is under observation (`Submitted` or
    /// `Watching`); anything arriving outside that window, and every frame
    /// after settlement, is dropped.
    pub fn apply(&mut self, frame: Frame) -> Applied {
        if self.phase.is_settled() {
            tracing::warn!(phase = %self.phase, "frame after settlement dropped");
            return Applied::Ignored(Anomaly::AfterTerminal);
        }
        if self.job_id().is_none() {
            tracing::warn!(phase = %self.phase, "frame with no job under observation dropped");
            return Applied::Ignored(Anomaly::NotWatching);
        }

        let event = match frame {
            Frame::Event(event) => event,
            Frame::Info(status) => {
                tracing::debug!(status = %status, "informational frame");
                return Applied::Note(status);
            }
            Frame::Malformed => {
                tracing::warn!("malformed frame dropped");
                return Applied::Ignored(Anomaly::Malformed);
            }
        };

        match event {
            StatusEvent::Queued => Applied::Note("queued".to_string()),
            StatusEvent::Processing { progress } => self.apply_progress(progress),
            StatusEvent::Completed { output_ref } => {
                self.progress = 100;
                self.phase = Phase::Done {
                    output_ref: output_ref.clone(),
                };
                Applied::Completed { output_ref }
            }
            StatusEvent::Failed { error_detail } => {
                self.phase = Phase::Errored {
                    detail: error_detail.clone(),
                };
                Applied::Failed {
                    detail: error_detail,
                }
            }
        }
    }

    /// Monotonic progress guard. Duplicates are expected (hydration resend,
    /// broadcast overlap) and logged quietly; regressions and out-of-range
    /// values are protocol anomalies.
    fn apply_progress(&mut self, proposed: u8) -> Applied {
        if proposed > 100 {
            tracing::warn!(proposed, "out-of-range progress dropped");
            return Applied::Ignored(Anomaly::OutOfRange);
        }
        if proposed < self.progress {
            tracing::warn!(
                displayed = self.progress,
                proposed,
                "regressive progress dropped"
            );
            return Applied::Ignored(Anomaly::Regressive);
        }
        if proposed == self.progress {
            tracing::debug!(displayed = self.progress, "duplicate progress dropped");
            return Applied::Ignored(Anomaly::Duplicate);
        }
        self.progress = proposed;
        Applied::Progress(proposed)
    }

    fn forbidden(&self, action: &'static str) -> PhaseError {
        PhaseError {
            action,
            phase: self.phase.name(),
        }
    }
}
