// crates/core/src/error.rs
use thiserror::Error;

use crate::job::JobState;

/// Upload rejections. Display strings are shown to users verbatim, so they
/// are part of the contract and pinned by tests.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("No file provided")]
    MissingFile,

    #[error("Please select a valid file type (PNG, JPG, AVI, MP4)")]
    UnsupportedType { declared: String },

    #[error("File size must be less than {limit_mb}MB")]
    TooLarge { size: u64, limit_mb: u64 },

    #[error("File content does not match a supported media type")]
    ContentMismatch,
}

/// Rejected job state transitions. Callers log these and discard the
/// offending update; they never tear anything down.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("job is already {state} and cannot change")]
    Terminal { state: JobState },

    #[error("progress cannot move backwards ({current} -> {proposed})")]
    Regressive { current: u8, proposed: u8 },

    #[error("progress {proposed} is outside 0-100")]
    OutOfRange { proposed: u8 },
}
