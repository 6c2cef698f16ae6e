//! Db Module
//!
//! The database handle that coordinates all components.
//!
//! ## Responsibilities
//! - Recover segments and indexes on open
//! - Append puts to the active segment, rotating when it fills up
//! - Resolve gets through the active segment or a read worker
//! - Schedule background merges once enough segments accumulate
//!
//! ## Lifecycle
//! ```text
//!   open() ──▶ Operational ──close()──▶ Closed
//!                  │  ▲                  (every call fails with Closed)
//!           put ───┘  └─── get / size
//! ```

mod recovery;
mod state;

use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::codec::Entry;
use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::merge::{self, MergeExecutor, MergeStats, MergeTracker};
use crate::segment::SegmentId;

pub(crate) use state::DbState;

/// State shared between the handle and the merge executor thread
pub(crate) struct Shared {
    pub(crate) config: Config,
    pub(crate) state: RwLock<DbState>,
    pub(crate) merges: MergeTracker,
}

/// Point-in-time counters for observability
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbStats {
    /// Passive plus active segments
    pub segment_count: usize,
    /// Passive segment ids, oldest first
    pub passive_segments: Vec<SegmentId>,
    pub active_segment: SegmentId,
    /// Bytes in the active segment
    pub active_size: u64,
    /// Distinct keys stored
    pub key_count: usize,
    /// Live read workers (one per passive segment)
    pub worker_count: usize,
}

/// An open database
///
/// ## Concurrency Model
///
/// One `RwLock` guards the segment list, active segment, global index and
/// worker pool:
///
/// - **get / size**: shared lock. Active-segment reads go through the
///   segment's own read handle; passive reads go through that segment's
///   worker, so reads against different segments run in parallel.
/// - **put / rotation / merge / close**: exclusive lock.
///
/// A `put` that crosses the merge threshold queues a job for the merge
/// executor and returns. The executor takes the exclusive lock itself, so
/// later calls wait for the merge instead of the `put` that triggered it.
pub struct Db {
    /// Declared first so the merge thread stops before the state drops
    executor: Mutex<Option<MergeExecutor>>,
    shared: Arc<Shared>,
}

impl Db {
    /// Open or create a database with the given config
    ///
    /// Fails with `Io` on filesystem errors and `CorruptSegment` if any
    /// segment ends in a partial or damaged record.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let state = recovery::recover(&config)?;
        let shared = Arc::new(Shared {
            config,
            state: RwLock::new(state),
            merges: MergeTracker::default(),
        });
        let executor = MergeExecutor::start(Arc::clone(&shared))?;

        // A directory left over the threshold is compacted right away
        if shared.state.read().segment_count() >= shared.config.merge_threshold {
            executor.schedule();
        }

        Ok(Self {
            executor: Mutex::new(Some(executor)),
            shared,
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the given directory and segment size limit
    pub fn open_path(path: impl AsRef<Path>, segment_size_limit: u64) -> Result<Self> {
        let config = Config::builder()
            .data_dir(path.as_ref())
            .segment_size_limit(segment_size_limit)
            .build();
        Self::open(config)
    }

    /// Store `value` under `key`
    ///
    /// Steps:
    /// 1. Encode the record
    /// 2. Rotate if the append would overflow a non-empty active segment
    /// 3. Append, then record the offset in the active index
    /// 4. Schedule a merge if the segment count reached the threshold
    ///
    /// Returns only after the append completed; on error no index changes.
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        let entry = Entry::new(key, value);
        let data = entry.encode()?;
        let config = &self.shared.config;

        let mut state = self.shared.state.write();

        let active = state.active()?;
        if !active.is_empty() && active.size() + data.len() as u64 > config.segment_size_limit {
            state.rotate(config)?;
        }

        let active = state.active_mut()?;
        let offset = active.append(&data)?;
        active.record_key(entry.key, offset);

        if state.segment_count() >= config.merge_threshold {
            self.schedule_merge();
        }

        Ok(())
    }

    /// Get the latest value for `key`
    ///
    /// Search order:
    /// 1. Active segment's local index (always the newest write)
    /// 2. Global index, resolved through the segment's read worker
    ///
    /// Fails with `KeyNotFound` if neither index has the key.
    pub fn get(&self, key: &str) -> Result<String> {
        let state = self.shared.state.read();
        let active = state.active()?;

        let (offset, entry) = if let Some(offset) = active.offset_of(key) {
            (offset, active.read_entry(offset)?)
        } else if let Some(location) = state.index.get(key) {
            (location.offset, state.workers.read(location)?)
        } else {
            return Err(StoreError::KeyNotFound);
        };

        if entry.key != key {
            return Err(StoreError::CorruptRecord {
                offset,
                reason: format!("expected key {:?}, found {:?}", key, entry.key),
            });
        }

        Ok(entry.value)
    }

    /// Total on-disk size of every segment file
    pub fn size(&self) -> Result<u64> {
        let state = self.shared.state.read();
        let active = state.active()?;

        let mut total = active.segment().file_size()?;
        for segment in &state.passive {
            total += segment.file_size()?;
        }
        // Undeletable leftovers still occupy disk
        for segment in &state.stale {
            if let Ok(len) = segment.file_size() {
                total += len;
            }
        }
        Ok(total)
    }

    /// Merge all passive segments now, on the calling thread
    ///
    /// Unlike background merges, failures are returned to the caller.
    pub fn compact(&self) -> Result<MergeStats> {
        let mut state = self.shared.state.write();
        state.active()?;

        if state.passive.is_empty() {
            return Ok(MergeStats::default());
        }
        merge::merge_segments(&mut state, &self.shared.config)
    }

    /// Block until no background merge is queued or running
    pub fn wait_for_merges(&self) {
        self.shared.merges.wait_idle();
    }

    /// Close the database
    ///
    /// Waits for any pending merge, stops every read worker and syncs the
    /// active segment. Every later call, including a second `close`, fails
    /// with `Closed`.
    pub fn close(&self) -> Result<()> {
        // Take the executor out first: joining it while holding the mutex
        // would deadlock against a put waiting to schedule
        let executor = self.executor.lock().take();
        if let Some(mut executor) = executor {
            executor.stop();
        }

        let mut state = self.shared.state.write();
        let active = state.active.take().ok_or(StoreError::Closed)?;

        state.workers.shutdown_all();
        let (segment, _) = active.close()?;

        info!(
            dir = %state.dir.display(),
            active = %segment.id(),
            passive = state.passive.len(),
            "Database closed"
        );
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.shared.config.data_dir
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Passive plus active segments (0 once closed)
    pub fn segment_count(&self) -> usize {
        self.shared.state.read().segment_count()
    }

    /// Distinct keys stored
    pub fn key_count(&self) -> usize {
        self.shared.state.read().key_count()
    }

    pub fn stats(&self) -> Result<DbStats> {
        let state = self.shared.state.read();
        let active = state.active()?;

        Ok(DbStats {
            segment_count: state.segment_count(),
            passive_segments: state.passive.iter().map(|s| s.id()).collect(),
            active_segment: active.id(),
            active_size: active.size(),
            key_count: state.key_count(),
            worker_count: state.workers.len(),
        })
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Called with the exclusive lock held; never waits on the merge
    fn schedule_merge(&self) {
        match self.executor.lock().as_ref() {
            Some(executor) => {
                executor.schedule();
            }
            None => debug!("Merge executor stopped, skipping merge"),
        }
    }
}
