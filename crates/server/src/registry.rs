// crates/server/src/registry.rs
//! Authoritative job records and their progress channels.
//!
//! Each accepted upload gets one [`JobEntry`]: the guarded [`Job`] record
//! plus a broadcast channel fanning its status events out to watchers. The
//! record is the source of truth; every frame on the channel is a projection
//! of it, and an update the record rejects is never broadcast.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use holoforge_core::{Job, JobId, StatusEvent, TransitionError};
use tokio::sync::broadcast;

/// Capacity of each job's event channel. Small on purpose: frames are
/// snapshots of the record, and a lagged watcher recovers by re-hydrating.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// One registered job.
pub struct JobEntry {
    id: JobId,
    job: RwLock<Job>,
    events: broadcast::Sender<StatusEvent>,
    /// Bumped per subscriber. A watcher holding an older epoch has been
    /// superseded by a newer channel and must close.
    watch_epoch: AtomicU64,
}

/// A live subscription to one job's events.
pub struct JobWatch {
    pub rx: broadcast::Receiver<StatusEvent>,
    epoch: u64,
}

impl JobEntry {
    fn new(job: Job) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            id: job.id.clone(),
            job: RwLock::new(job),
            events,
            watch_epoch: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    /// Copy of the current record.
    pub fn snapshot(&self) -> Job {
        self.read_job().clone()
    }

    /// Queued → Processing.
    pub fn begin(&self) -> Result<(), TransitionError> {
        self.apply(|job| job.begin())
    }

    /// Monotonic progress update. Regressions and out-of-range values are
    /// rejected by the record, logged here, and never broadcast.
    pub fn advance(&self, pct: u8) -> Result<(), TransitionError> {
        self.apply(move |job| job.advance(pct))
    }

    /// Terminal transition: the artifact is ready under `output_ref`.
    pub fn complete(&self, output_ref: impl Into<String>) -> Result<(), TransitionError> {
        let output_ref = output_ref.into();
        self.apply(move |job| job.complete(output_ref))
    }

    /// Terminal transition: the worker gave up with `detail`.
    pub fn fail(&self, detail: impl Into<String>) -> Result<(), TransitionError> {
        let detail = detail.into();
        self.apply(move |job| job.fail(detail))
    }

    /// Subscribe to live events, superseding any previous subscriber.
    /// Older watchers observe `is_current() == false` and close.
    pub fn watch(&self) -> JobWatch {
        let epoch = self.watch_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        JobWatch {
            rx: self.events.subscribe(),
            epoch,
        }
    }

    /// Whether `watch` is still the newest subscription for this job.
    pub fn is_current(&self, watch: &JobWatch) -> bool {
        self.watch_epoch.load(Ordering::SeqCst) == watch.epoch
    }

    fn apply<F>(&self, f: F) -> Result<(), TransitionError>
    where
        F: FnOnce(&mut Job) -> Result<(), TransitionError>,
    {
        let event = {
            let mut guard = self.write_job();
            if let Err(e) = f(&mut guard) {
                tracing::warn!(job_id = %self.id, error = %e, "Rejected job update");
                return Err(e);
            }
            guard.status_event()
        };
        // Ignore send errors (no subscribers is fine).
        let _ = self.events.send(event);
        Ok(())
    }

    // A poisoned lock still holds a consistent record: mutations are plain
    // field writes behind the guards above. Recover the value and move on.
    fn read_job(&self) -> RwLockReadGuard<'_, Job> {
        match self.job.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_job(&self) -> RwLockWriteGuard<'_, Job> {
        match self.job.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Registry of all jobs this process has accepted.
///
/// `std::sync::RwLock` (not tokio's): the map is touched only for quick
/// insert/lookup and the lock is never held across an `.await`.
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Arc<JobEntry>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Create a record in `Queued` and return its entry. The record exists
    /// before the upload response is sent, so a status check or watch that
    /// races the response can never miss it.
    pub fn create(&self) -> Arc<JobEntry> {
        let entry = Arc::new(JobEntry::new(Job::new(JobId::generate())));
        self.write_map().insert(entry.id().clone(), entry.clone());
        entry
    }

    pub fn get(&self, id: &JobId) -> Option<Arc<JobEntry>> {
        self.read_map().get(id).cloned()
    }

    /// Copy of a job's current record, if registered.
    pub fn snapshot(&self, id: &JobId) -> Option<Job> {
        self.get(id).map(|entry| entry.snapshot())
    }

    pub fn len(&self) -> usize {
        self.read_map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_map().is_empty()
    }

    fn read_map(&self) -> RwLockReadGuard<'_, HashMap<JobId, Arc<JobEntry>>> {
        match self.jobs.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_map(&self) -> RwLockWriteGuard<'_, HashMap<JobId, Arc<JobEntry>>> {
        match self.jobs.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}
