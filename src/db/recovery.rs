//! Startup Recovery
//!
//! Rebuilds the in-memory state by replaying every segment file.
//!
//! On startup:
//! 1. Create the data directory if needed
//! 2. Remove merge output left behind by an interrupted merge
//! 3. Replay segments oldest → newest into the global index
//! 4. Reactivate the newest segment (or create segment 0)
//! 5. Start a read worker for every passive segment

use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::index::{GlobalIndex, KeyIndex, RecordLocation};
use crate::segment::{Segment, SegmentId, MERGE_EXTENSION, MERGE_PREFIX};
use crate::worker::{ReadWorker, ReadWorkerPool};

use super::state::DbState;

/// Recover (or initialize) the state for `config.data_dir`
///
/// Fails with `CorruptSegment` if any segment ends in a partial or damaged
/// record; nothing is silently dropped.
pub(crate) fn recover(config: &Config) -> Result<DbState> {
    let dir = config.data_dir.as_path();

    fs::create_dir_all(dir)?;
    remove_stale_merge_files(dir)?;

    let ids = list_segment_ids(dir)?;

    let mut index = GlobalIndex::new();
    let mut passive = Vec::with_capacity(ids.len());

    let active = match ids.split_last() {
        Some((&newest, older)) => {
            for &id in older {
                let segment = Segment::new(dir, id);
                replay(&segment, |key, offset| {
                    index.insert(key, RecordLocation::new(id, offset));
                })?;
                passive.push(segment);
            }

            // The newest segment's keys live in its local index only
            let segment = Segment::new(dir, newest);
            let mut local = KeyIndex::new();
            let size = replay(&segment, |key, offset| {
                local.insert(key, offset);
            })?;

            segment.activate(size, local, config.sync_strategy)?
        }
        None => Segment::new(dir, SegmentId(0)).activate(0, KeyIndex::new(), config.sync_strategy)?,
    };

    let mut workers = ReadWorkerPool::new();
    for segment in &passive {
        workers.attach(ReadWorker::spawn(segment, config.worker_queue_depth)?);
    }

    info!(
        dir = %dir.display(),
        passive = passive.len(),
        active = %active.id(),
        active_size = active.size(),
        indexed_keys = index.len(),
        "Recovered segments"
    );

    let next_id = active.id().next();

    Ok(DbState {
        dir: dir.to_path_buf(),
        passive,
        active: Some(active),
        index,
        workers,
        next_id,
        stale: Vec::new(),
    })
}

// =============================================================================
// Private Helpers
// =============================================================================

/// Replay every record; returns the number of bytes replayed
fn replay(segment: &Segment, mut on_record: impl FnMut(String, u64)) -> Result<u64> {
    let mut scanner = segment.scan()?;

    for item in scanner.by_ref() {
        let (offset, entry) = item?;
        // Later records for the same key overwrite earlier ones
        on_record(entry.key, offset);
    }

    Ok(scanner.position())
}

/// Segment ids found in `dir`, oldest first
fn list_segment_ids(dir: &Path) -> Result<Vec<SegmentId>> {
    let mut ids = Vec::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if let Some(id) = Segment::parse_id(&path) {
            ids.push(id);
        }
    }

    ids.sort();
    Ok(ids)
}

/// An interrupted merge never replaced a live segment, so its output is
/// safe to discard
fn remove_stale_merge_files(dir: &Path) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();

        let is_merge_output = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with(MERGE_PREFIX))
            .unwrap_or(false)
            && path.extension().and_then(|ext| ext.to_str()) == Some(MERGE_EXTENSION);

        if is_merge_output && path.is_file() {
            warn!(path = %path.display(), "Removing output of an interrupted merge");
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}
