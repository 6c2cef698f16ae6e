//! Hash Index
//!
//! In-memory maps from keys to record locations.
//!
//! - [`KeyIndex`]: `key → offset`, local to the active segment
//! - [`GlobalIndex`]: `key → (segment id, offset)` across passive segments
//!
//! Locations name segments by [`SegmentId`], never by reference, so a merge
//! can retire ids without leaving anything dangling. A location is only
//! dereferenced after it has been looked up in the current index.

use std::collections::HashMap;

use crate::segment::SegmentId;

/// Local index of the active segment: key → record offset
pub type KeyIndex = HashMap<String, u64>;

/// Where the latest value for a key is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordLocation {
    pub segment: SegmentId,
    pub offset: u64,
}

impl RecordLocation {
    pub fn new(segment: SegmentId, offset: u64) -> Self {
        Self { segment, offset }
    }
}

/// Key → location for every key held by a passive segment
#[derive(Debug, Default, Clone)]
pub struct GlobalIndex {
    locations: HashMap<String, RecordLocation>,
}

impl GlobalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<RecordLocation> {
        self.locations.get(key).copied()
    }

    /// Point `key` at `location`, replacing any older location
    pub fn insert(&mut self, key: String, location: RecordLocation) {
        self.locations.insert(key, location);
    }

    /// Fold a sealed segment's local index in; its entries are newer than
    /// anything already present
    pub fn absorb(&mut self, segment: SegmentId, local: KeyIndex) {
        self.locations.extend(
            local
                .into_iter()
                .map(|(key, offset)| (key, RecordLocation::new(segment, offset))),
        );
    }

    /// True when the index still names exactly `location` for `key`
    pub fn points_at(&self, key: &str, location: RecordLocation) -> bool {
        self.locations.get(key) == Some(&location)
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.locations.keys().map(String::as_str)
    }
}
