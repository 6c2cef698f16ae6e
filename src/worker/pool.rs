//! Read Worker Pool
//!
//! Exactly one worker per passive segment, keyed by segment id.

use std::collections::HashMap;

use tracing::warn;

use crate::codec::Entry;
use crate::error::{Result, StoreError};
use crate::index::RecordLocation;
use crate::segment::SegmentId;

use super::ReadWorker;

/// Registry of live read workers
#[derive(Default)]
pub struct ReadWorkerPool {
    workers: HashMap<SegmentId, ReadWorker>,
}

impl ReadWorkerPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker, replacing (and stopping) any previous one for the
    /// same segment
    pub fn attach(&mut self, worker: ReadWorker) {
        if let Some(previous) = self.workers.insert(worker.segment(), worker) {
            warn!(segment = %previous.segment(), "Replaced an existing read worker");
            previous.shutdown();
        }
    }

    /// Resolve a location through its segment's worker
    ///
    /// Fails with `WorkerNotFound` if the segment has no live worker.
    pub fn read(&self, location: RecordLocation) -> Result<Entry> {
        self.workers
            .get(&location.segment)
            .ok_or(StoreError::WorkerNotFound(location.segment))?
            .read(location.offset)
    }

    /// Stop and remove the worker for `segment`; false if there was none
    pub fn retire(&mut self, segment: SegmentId) -> bool {
        match self.workers.remove(&segment) {
            Some(worker) => {
                worker.shutdown();
                true
            }
            None => false,
        }
    }

    /// Stop every worker
    pub fn shutdown_all(&mut self) {
        for (_, worker) in self.workers.drain() {
            worker.shutdown();
        }
    }

    pub fn contains(&self, segment: SegmentId) -> bool {
        self.workers.contains_key(&segment)
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}
