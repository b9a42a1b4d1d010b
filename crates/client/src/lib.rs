// crates/client/src/lib.rs
//! # holoforge-client
//!
//! Async client for a Holoforge server: submit media, follow the job's
//! progress channel in real time (with automatic polling fallback), and
//! fetch the finished artifact.
//!
//! The display state lives in a pure [`StatusReconciler`], so progress is
//! non-decreasing and terminal states are sticky no matter how frames
//! arrive.
//!
//! ## Quick Start
//!
//! ```no_run
//! use holoforge_client::{follow, Applied, HoloClient, Phase, StatusReconciler};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> holoforge_client::Result<()> {
//! let client = HoloClient::new("http://127.0.0.1:47810");
//!
//! let submission = client.submit(std::path::Path::new("clip.mp4")).await?;
//!
//! let mut reconciler = StatusReconciler::attached(submission.job_id.clone());
//! let phase = follow(
//!     &client,
//!     &submission.job_id,
//!     &mut reconciler,
//!     &CancellationToken::new(),
//!     |applied, state| {
//!         if let Applied::Progress(pct) = applied {
//!             println!("{pct}% (live: {})", state.live_updates());
//!         }
//!     },
//! )
//! .await?;
//!
//! if let Phase::Done { output_ref } = phase {
//!     let artifact = client.download(&submission.job_id).await?;
//!     std::fs::write(&output_ref, &artifact.bytes).unwrap();
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod error;
pub mod reconciler;
pub mod watch;

pub use api::{Artifact, HoloClient, JobSnapshot, Submission};
pub use error::{ClientError, Result};
pub use reconciler::{Anomaly, Applied, Phase, PhaseError, StatusReconciler};
pub use watch::{connect_channel, follow, Monitor, WatchUpdate};
