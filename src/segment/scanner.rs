//! Segment Scanner
//!
//! Forward-only replay of every record in a segment file.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::codec::{Decoded, Entry};
use crate::error::{Result, StoreError};

/// Iterator over `(record offset, entry)` pairs in write order
///
/// Stops at the first clean end of file. A truncated or damaged record is
/// reported once as `CorruptSegment` and ends the iteration.
pub struct SegmentScanner {
    reader: BufReader<File>,
    path: PathBuf,
    /// Offset of the next record (bytes consumed so far)
    position: u64,
    done: bool,
}

impl SegmentScanner {
    pub(super) fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::new(file),
            path: path.to_path_buf(),
            position: 0,
            done: false,
        })
    }

    /// Bytes consumed so far; after a full scan this is the replayed size
    pub fn position(&self) -> u64 {
        self.position
    }
}

impl Iterator for SegmentScanner {
    type Item = Result<(u64, Entry)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match Entry::decode(&mut self.reader, self.position) {
            Ok(Decoded::Record { entry, len }) => {
                let offset = self.position;
                self.position += len;
                Some(Ok((offset, entry)))
            }
            Ok(Decoded::EndOfSegment) => {
                self.done = true;
                None
            }
            Err(StoreError::CorruptRecord { offset, reason }) => {
                self.done = true;
                Some(Err(StoreError::CorruptSegment {
                    path: self.path.clone(),
                    offset,
                    reason,
                }))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
