//! Database State
//!
//! Everything guarded by the database's read-write lock.

use std::io;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::index::{GlobalIndex, KeyIndex};
use crate::segment::{ActiveSegment, Segment, SegmentId};
use crate::worker::{ReadWorker, ReadWorkerPool};

/// Segment list, active segment, global index and read workers
///
/// ## Invariants
/// - `passive` is ordered oldest → newest and every id in it is lower than
///   the active segment's id
/// - every passive segment has exactly one worker in `workers`
/// - `active` is `None` only after the database has been closed
pub(crate) struct DbState {
    pub(crate) dir: PathBuf,
    pub(crate) passive: Vec<Segment>,
    pub(crate) active: Option<ActiveSegment>,
    pub(crate) index: GlobalIndex,
    pub(crate) workers: ReadWorkerPool,
    pub(crate) next_id: SegmentId,
    /// Merged-away segment files whose deletion failed; retried after
    /// every merge
    pub(crate) stale: Vec<Segment>,
}

impl DbState {
    pub(crate) fn active(&self) -> Result<&ActiveSegment> {
        self.active.as_ref().ok_or(StoreError::Closed)
    }

    pub(crate) fn active_mut(&mut self) -> Result<&mut ActiveSegment> {
        self.active.as_mut().ok_or(StoreError::Closed)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.active.is_none()
    }

    /// Passive segments plus the active one; 0 once closed
    pub(crate) fn segment_count(&self) -> usize {
        match self.active {
            Some(_) => self.passive.len() + 1,
            None => 0,
        }
    }

    /// Seal the active segment and start a new one
    ///
    /// Steps:
    /// 1. Sync the active segment
    /// 2. Start a read worker for it (it is about to become passive)
    /// 3. Create and activate the next segment
    /// 4. Swap, folding the sealed segment's local index into the global one
    ///
    /// A failure in steps 1-3 leaves the state untouched.
    pub(crate) fn rotate(&mut self, config: &Config) -> Result<()> {
        let active = self.active.as_mut().ok_or(StoreError::Closed)?;

        active.sync()?;
        let worker = ReadWorker::spawn(active.segment(), config.worker_queue_depth)?;
        let next = Segment::new(&self.dir, self.next_id).activate(
            0,
            KeyIndex::new(),
            config.sync_strategy,
        )?;

        let sealed = std::mem::replace(active, next);
        let (segment, local) = sealed.into_parts();

        debug!(
            sealed = %segment.id(),
            active = %self.next_id,
            keys = local.len(),
            "Rotated active segment"
        );

        self.index.absorb(segment.id(), local);
        self.workers.attach(worker);
        self.passive.push(segment);
        self.next_id = self.next_id.next();

        Ok(())
    }

    /// Delete stale segment files, keeping the ones that still fail
    pub(crate) fn purge_stale(&mut self) {
        self.stale.retain(|segment| match segment.delete() {
            Ok(()) => false,
            Err(StoreError::Io(e)) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => {
                warn!(
                    segment = %segment.id(),
                    error = %e,
                    "Failed to delete merged segment file, will retry"
                );
                true
            }
        });
    }

    /// Distinct keys across the global index and the active segment
    pub(crate) fn key_count(&self) -> usize {
        let shadow_only = self
            .active
            .as_ref()
            .map(|active| {
                active
                    .index()
                    .keys()
                    .filter(|key| self.index.get(key).is_none())
                    .count()
            })
            .unwrap_or(0);

        self.index.len() + shadow_only
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::db::recovery;

    #[test]
    fn purge_stale_retries_until_delete_succeeds() {
        let temp = TempDir::new().unwrap();
        let config = Config::builder().data_dir(temp.path()).build();
        let mut state = recovery::recover(&config).unwrap();

        // A directory where a segment file should be: remove_file fails
        let stuck = Segment::new(temp.path(), SegmentId(7));
        fs::create_dir(stuck.path()).unwrap();
        let gone = Segment::new(temp.path(), SegmentId(8));
        state.stale = vec![stuck.clone(), gone];

        state.purge_stale();
        assert_eq!(state.stale, vec![stuck.clone()]);

        fs::remove_dir(stuck.path()).unwrap();
        fs::write(stuck.path(), b"leftover").unwrap();

        state.purge_stale();
        assert!(state.stale.is_empty());
        assert!(!stuck.path().exists());
    }
}
