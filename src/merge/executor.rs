//! Merge Executor
//!
//! Background thread that runs merges handed to it by `put`.
//!
//! `put` never waits for a merge: it queues a job and returns. The executor
//! takes the exclusive lock as its first action, so every later `put`/`get`
//! waits until the swap is complete and never sees a half-merged state.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info};

use crate::db::{DbState, Shared};
use crate::error::Result;

use super::merge_segments;

/// Work accepted by the executor thread
enum MergeJob {
    Compact,
}

/// Tracks whether a merge is queued or running
///
/// At most one job is outstanding; further threshold crossings while it is
/// pending are coalesced into it.
#[derive(Default)]
pub(crate) struct MergeTracker {
    pending: Mutex<bool>,
    idle: Condvar,
}

impl MergeTracker {
    /// Claim the single pending slot; false if a merge is already pending
    fn try_claim(&self) -> bool {
        let mut pending = self.pending.lock();
        if *pending {
            return false;
        }
        *pending = true;
        true
    }

    fn release(&self) {
        *self.pending.lock() = false;
        self.idle.notify_all();
    }

    /// Block until no merge is queued or running
    pub(crate) fn wait_idle(&self) {
        let mut pending = self.pending.lock();
        while *pending {
            self.idle.wait(&mut pending);
        }
    }
}

/// Handle to the merge thread
pub(crate) struct MergeExecutor {
    jobs: Option<Sender<MergeJob>>,
    handle: Option<JoinHandle<()>>,
    shared: Arc<Shared>,
}

impl MergeExecutor {
    pub(crate) fn start(shared: Arc<Shared>) -> Result<Self> {
        let (jobs, inbox) = channel::unbounded();
        let worker_shared = Arc::clone(&shared);

        let handle = thread::Builder::new()
            .name("segstore-merge".to_string())
            .spawn(move || run_executor(worker_shared, inbox))?;

        Ok(Self {
            jobs: Some(jobs),
            handle: Some(handle),
            shared,
        })
    }

    /// Queue a merge unless one is already pending; never blocks
    pub(crate) fn schedule(&self) -> bool {
        let tracker = &self.shared.merges;
        if !tracker.try_claim() {
            return false;
        }

        match &self.jobs {
            Some(jobs) if jobs.send(MergeJob::Compact).is_ok() => {
                debug!("Scheduled background merge");
                true
            }
            _ => {
                tracker.release();
                false
            }
        }
    }

    /// Stop accepting jobs, finish queued ones, and join the thread
    ///
    /// Must not be called while holding the state lock.
    pub(crate) fn stop(&mut self) {
        drop(self.jobs.take());

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Merge executor panicked");
                self.shared.merges.release();
            }
        }
    }
}

impl Drop for MergeExecutor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Executor loop: one merge per job until the sender is dropped
fn run_executor(shared: Arc<Shared>, inbox: Receiver<MergeJob>) {
    for job in inbox.iter() {
        match job {
            MergeJob::Compact => run_scheduled_merge(&shared),
        }
    }
    debug!("Merge executor stopped");
}

fn run_scheduled_merge(shared: &Shared) {
    let mut state = shared.state.write();
    // Declared after the lock guard so it drops first: the slot is released
    // under the lock, even if the merge panics
    let _pending = PendingMerge(&shared.merges);

    merge_if_needed(&mut state, shared);
}

/// Releases the tracker's pending slot when dropped
struct PendingMerge<'a>(&'a MergeTracker);

impl Drop for PendingMerge<'_> {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// Failures are logged, never surfaced to `put`/`get`
fn merge_if_needed(state: &mut DbState, shared: &Shared) {
    let threshold = shared.config.merge_threshold;
    if state.is_closed() || state.segment_count() < threshold {
        debug!(
            segments = state.segment_count(),
            threshold, "Skipping merge, below threshold"
        );
        return;
    }

    match merge_segments(state, &shared.config) {
        Ok(stats) => info!(
            segments_merged = stats.segments_merged,
            records_scanned = stats.records_scanned,
            records_kept = stats.records_kept,
            bytes_before = stats.bytes_before,
            bytes_after = stats.bytes_after,
            "Merge completed"
        ),
        Err(e) => error!(error = %e, "Merge failed, keeping existing segments"),
    }
}
