//! Segment Module
//!
//! One append-only log file per segment.
//!
//! ## Responsibilities
//! - Name and locate segment files inside the data directory
//! - Replay a segment front to back (recovery, merge)
//! - Promote a segment to the single active (appendable) segment
//! - Rename merge output into the canonical namespace
//!
//! ## Layout
//! ```text
//! {data_dir}/
//!   ├── segment-000004     passive (read through its worker)
//!   ├── segment-000007     passive
//!   ├── segment-000008     active  (append handle + local index)
//!   └── merge-000007.tmp   merge output, only while a merge runs
//! ```
//!
//! Ids grow monotonically, so sorting by id orders segments oldest first.

mod active;
mod scanner;

use std::fmt;
use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::codec::{Decoded, Entry};
use crate::config::SyncStrategy;
use crate::error::{Result, StoreError};
use crate::index::KeyIndex;

pub use active::ActiveSegment;
pub use scanner::SegmentScanner;

/// File name prefix shared by every segment
pub const SEGMENT_PREFIX: &str = "segment-";

/// File name prefix and extension of in-progress merge output
pub(crate) const MERGE_PREFIX: &str = "merge-";
pub(crate) const MERGE_EXTENSION: &str = "tmp";

/// Stable handle for a segment; higher ids are newer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentId(pub u64);

impl SegmentId {
    pub fn next(self) -> SegmentId {
        SegmentId(self.0 + 1)
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06}", self.0)
    }
}

/// A segment file on disk (passive unless wrapped in an [`ActiveSegment`])
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    id: SegmentId,
    path: PathBuf,
}

impl Segment {
    /// Segment `id` in the canonical namespace of `dir`
    pub fn new(dir: &Path, id: SegmentId) -> Self {
        Self {
            id,
            path: dir.join(Self::file_name(id)),
        }
    }

    /// Merge output destined to become segment `id`
    pub(crate) fn temporary(dir: &Path, id: SegmentId) -> Self {
        Self {
            id,
            path: dir.join(format!("{}{}.{}", MERGE_PREFIX, id, MERGE_EXTENSION)),
        }
    }

    pub fn id(&self) -> SegmentId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// "segment-000042" for id 42
    pub fn file_name(id: SegmentId) -> String {
        format!("{}{}", SEGMENT_PREFIX, id)
    }

    /// Parse a segment id from a file path
    /// "segment-000042" → Some(42)
    pub fn parse_id(path: &Path) -> Option<SegmentId> {
        let name = path.file_name()?.to_str()?;
        let digits = name.strip_prefix(SEGMENT_PREFIX)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok().map(SegmentId)
    }

    /// Current size of the file on disk
    pub fn file_size(&self) -> Result<u64> {
        Ok(fs::metadata(&self.path)?.len())
    }

    /// Sequentially replay every record from offset 0
    pub fn scan(&self) -> Result<SegmentScanner> {
        SegmentScanner::open(&self.path)
    }

    /// Open for append, making this the active segment
    ///
    /// `start_size` and `index` come from a replay for a recovered segment,
    /// or are 0 and empty for a brand-new one.
    pub fn activate(
        self,
        start_size: u64,
        index: KeyIndex,
        sync_strategy: SyncStrategy,
    ) -> Result<ActiveSegment> {
        ActiveSegment::open(self, start_size, index, sync_strategy)
    }

    /// Move the file to the canonical name for `id`
    ///
    /// Used only by the merge engine. Replaces any file already there.
    pub fn rename(&mut self, id: SegmentId) -> Result<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let new_path = dir.join(Self::file_name(id));

        fs::rename(&self.path, &new_path)?;

        self.path = new_path;
        self.id = id;
        Ok(())
    }

    /// Remove the file from disk
    pub fn delete(&self) -> Result<()> {
        fs::remove_file(&self.path)?;
        Ok(())
    }
}

/// Seek to `offset` and decode the record found there
pub(crate) fn read_entry_at<R: Read + Seek>(reader: &mut R, offset: u64) -> Result<Entry> {
    reader.seek(SeekFrom::Start(offset))?;

    match Entry::decode(reader, offset)? {
        Decoded::Record { entry, .. } => Ok(entry),
        Decoded::EndOfSegment => Err(StoreError::CorruptRecord {
            offset,
            reason: "offset is past the end of the segment".to_string(),
        }),
    }
}
