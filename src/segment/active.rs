//! Active Segment
//!
//! The single segment currently accepting appends.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::Path;

use parking_lot::Mutex;
use tracing::warn;

use crate::codec::Entry;
use crate::config::SyncStrategy;
use crate::error::Result;
use crate::index::KeyIndex;

use super::{read_entry_at, Segment, SegmentId};

/// Append handle plus local `key → offset` index for the newest segment
///
/// ## Concurrency:
/// - Appends need `&mut self` (the database's exclusive lock)
/// - Reads go through `reader`, a separate handle behind a Mutex, so they
///   only need `&self` (the database's shared lock)
pub struct ActiveSegment {
    segment: Segment,
    /// Append-only write handle
    writer: File,
    /// Read handle on the same file (seek position is shared state)
    reader: Mutex<BufReader<File>>,
    /// Keys written while this segment is active
    index: KeyIndex,
    /// Bytes in the file; also the offset of the next append
    size: u64,
    sync_strategy: SyncStrategy,
    /// Appends since the last fsync
    unsynced: usize,
    #[cfg(test)]
    fail_next_sync: bool,
}

impl ActiveSegment {
    pub(super) fn open(
        segment: Segment,
        start_size: u64,
        index: KeyIndex,
        sync_strategy: SyncStrategy,
    ) -> Result<Self> {
        let writer = OpenOptions::new()
            .create(true)
            .append(true)
            .open(segment.path())?;
        let reader = File::open(segment.path())?;

        Ok(Self {
            segment,
            writer,
            reader: Mutex::new(BufReader::new(reader)),
            index,
            size: start_size,
            sync_strategy,
            unsynced: 0,
            #[cfg(test)]
            fail_next_sync: false,
        })
    }

    /// Append raw record bytes; returns the offset they were written at
    ///
    /// A failed write or a failed sync is rolled back by truncating to the
    /// previous size, so an append that returns `Err` never leaves its
    /// record behind for recovery to replay.
    pub fn append(&mut self, data: &[u8]) -> Result<u64> {
        let offset = self.size;

        if let Err(e) = self.writer.write_all(data) {
            self.roll_back(offset);
            return Err(e.into());
        }

        self.size += data.len() as u64;
        self.unsynced += 1;

        let due = match self.sync_strategy {
            SyncStrategy::EveryWrite => true,
            SyncStrategy::EveryNEntries { count } => self.unsynced >= count,
        };
        if due {
            if let Err(e) = self.sync() {
                self.unsynced -= 1;
                self.roll_back(offset);
                return Err(e);
            }
        }

        Ok(offset)
    }

    /// Remember that `key` now lives at `offset` in this segment
    pub fn record_key(&mut self, key: String, offset: u64) {
        self.index.insert(key, offset);
    }

    /// Offset of the latest record for `key` in this segment, if any
    pub fn offset_of(&self, key: &str) -> Option<u64> {
        self.index.get(key).copied()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Read the record at `offset` straight from the live file
    pub fn read_entry(&self, offset: u64) -> Result<Entry> {
        let mut reader = self.reader.lock();
        read_entry_at(&mut *reader, offset)
    }

    /// Force buffered data to disk
    pub fn sync(&mut self) -> Result<()> {
        #[cfg(test)]
        if std::mem::take(&mut self.fail_next_sync) {
            return Err(std::io::Error::new(std::io::ErrorKind::Other, "sync failed").into());
        }

        self.writer.sync_data()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Sync and release the file handles; the segment becomes passive
    pub fn close(self) -> Result<(Segment, KeyIndex)> {
        self.writer.sync_all()?;
        Ok(self.into_parts())
    }

    /// Truncate back to `offset` after a failed append
    fn roll_back(&mut self, offset: u64) {
        if let Err(e) = self.writer.set_len(offset) {
            warn!(
                segment = %self.segment.id(),
                offset,
                error = %e,
                "Failed to roll back partial append"
            );
        }
        self.size = offset;
    }

    /// Drop the file handles without syncing (caller already synced)
    pub(crate) fn into_parts(self) -> (Segment, KeyIndex) {
        (self.segment, self.index)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn id(&self) -> SegmentId {
        self.segment.id()
    }

    pub fn path(&self) -> &Path {
        self.segment.path()
    }

    pub fn segment(&self) -> &Segment {
        &self.segment
    }

    pub fn index(&self) -> &KeyIndex {
        &self.index
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}
