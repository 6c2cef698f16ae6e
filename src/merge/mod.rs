//! Merge (Compaction) Module
//!
//! Rewrites the passive segments into a single segment holding only live
//! records, then swaps it into the segment list.
//!
//! ## Liveness
//! A record at `(segment, offset)` is live when:
//! - the global index still names exactly `(segment, offset)` for its key, and
//! - the key is not shadowed by the active segment's local index
//!
//! The index always names the newest physical write, so this check alone
//! deduplicates repeated writes across any number of old segments.
//!
//! ## Crash Safety
//! The output is written to `merge-NNNNNN.tmp` and then renamed over the
//! newest merged segment, taking its id. At any crash point a restart sees
//! either the untouched old segments, or the merged segment followed only by
//! older leftovers whose records it already supersedes.

mod executor;

use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};

use tracing::{debug, warn};

use crate::config::Config;
use crate::db::DbState;
use crate::error::{Result, StoreError};
use crate::index::{GlobalIndex, RecordLocation};
use crate::segment::{ActiveSegment, Segment, SegmentId};
use crate::worker::ReadWorker;

pub(crate) use executor::{MergeExecutor, MergeTracker};

/// Outcome of one merge
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Number of passive segments rewritten
    pub segments_merged: usize,
    /// Records read from the old segments
    pub records_scanned: u64,
    /// Live records copied into the merged segment
    pub records_kept: u64,
    /// Combined size of the old segments
    pub bytes_before: u64,
    /// Size of the merged segment
    pub bytes_after: u64,
    /// Id of the merged segment, if a merge ran
    pub merged_segment: Option<SegmentId>,
}

/// Merge every passive segment into one (exclusive lock held by caller)
///
/// Steps:
/// 1. Copy live records into a temporary segment
/// 2. Sync it and start its read worker
/// 3. Rename it over the newest passive segment
/// 4. Retire old workers, delete the other old files
/// 5. Segment list becomes `[merged, active]`, index becomes the new one
///
/// Any failure before step 3 completes removes the temporary file and
/// leaves the state exactly as it was.
pub(crate) fn merge_segments(state: &mut DbState, config: &Config) -> Result<MergeStats> {
    let active = state.active()?;

    let old = state.passive.clone();
    let Some(newest) = old.last() else {
        return Ok(MergeStats::default());
    };
    let target = newest.id();
    let temp = Segment::temporary(&state.dir, target);

    // Steps 1-3: nothing is visible to readers until the rename succeeds
    let prepared = copy_live_records(&old, &temp, &state.index, active).and_then(|copied| {
        let worker = ReadWorker::spawn(&temp, config.worker_queue_depth)
            .map_err(|e| StoreError::Merge(format!("failed to start read worker: {}", e)))?;
        Ok((copied, worker))
    });

    let (stats, new_index, worker) = match prepared {
        Ok(((stats, new_index), worker)) => (stats, new_index, worker),
        Err(e) => {
            discard(&temp);
            return Err(e);
        }
    };

    let mut merged = temp.clone();
    if let Err(e) = merged.rename(target) {
        worker.shutdown();
        discard(&temp);
        return Err(StoreError::Merge(format!(
            "failed to promote merged segment: {}",
            e
        )));
    }

    // Step 4: committed on disk
    for segment in &old {
        state.workers.retire(segment.id());
    }
    state
        .stale
        .extend(old.into_iter().filter(|segment| segment.id() != target));
    state.purge_stale();

    // Step 5
    state.workers.attach(worker);
    state.passive = vec![merged];
    state.index = new_index;

    debug!(
        merged = %target,
        segments = stats.segments_merged,
        kept = stats.records_kept,
        scanned = stats.records_scanned,
        "Swapped in merged segment"
    );

    Ok(stats)
}

// =============================================================================
// Private Helpers
// =============================================================================

/// Step 1: write every live record of `old` into `output`
fn copy_live_records(
    old: &[Segment],
    output: &Segment,
    index: &GlobalIndex,
    active: &ActiveSegment,
) -> Result<(MergeStats, GlobalIndex)> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(output.path())
        .map_err(|e| StoreError::Merge(format!("failed to create merged segment: {}", e)))?;
    let mut writer = BufWriter::new(file);

    let mut stats = MergeStats {
        segments_merged: old.len(),
        merged_segment: Some(output.id()),
        ..MergeStats::default()
    };
    let mut new_index = GlobalIndex::new();

    for segment in old {
        stats.bytes_before += segment.file_size()?;

        for item in segment.scan()? {
            let (offset, entry) = item.map_err(|e| {
                StoreError::Merge(format!("failed to read segment {}: {}", segment.id(), e))
            })?;
            stats.records_scanned += 1;

            let location = RecordLocation::new(segment.id(), offset);
            if active.contains_key(&entry.key) || !index.points_at(&entry.key, location) {
                continue;
            }

            let data = entry.encode()?;
            writer.write_all(&data).map_err(write_failed)?;

            new_index.insert(entry.key, RecordLocation::new(output.id(), stats.bytes_after));
            stats.bytes_after += data.len() as u64;
            stats.records_kept += 1;
        }
    }

    let file = writer
        .into_inner()
        .map_err(|e| write_failed(e.into_error()))?;
    file.sync_all().map_err(write_failed)?;

    Ok((stats, new_index))
}

fn write_failed(e: io::Error) -> StoreError {
    StoreError::Merge(format!("failed to write merged segment: {}", e))
}

/// Remove a half-written merge output
fn discard(temp: &Segment) {
    if let Err(e) = temp.delete() {
        if !matches!(&e, StoreError::Io(err) if err.kind() == io::ErrorKind::NotFound) {
            warn!(
                path = %temp.path().display(),
                error = %e,
                "Failed to remove temporary merge output"
            );
        }
    }
}
