//! Error types for SegStore
//!
//! Provides a unified error type for all operations.

use std::path::PathBuf;

use thiserror::Error;

use crate::segment::SegmentId;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for SegStore operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    #[error("Key not found")]
    KeyNotFound,

    /// A key or value is too long for the record's u32 length field
    #[error("Entry too large: {len} bytes exceeds the {max} byte limit")]
    EntryTooLarge { len: u64, max: u64 },

    // -------------------------------------------------------------------------
    // Corruption Errors
    // -------------------------------------------------------------------------
    /// A single record failed to decode (truncated, bad checksum, bad UTF-8)
    #[error("Corrupt record at offset {offset}: {reason}")]
    CorruptRecord { offset: u64, reason: String },

    /// A segment file could not be replayed
    #[error("Corrupt segment {}: offset {offset}: {reason}", .path.display())]
    CorruptSegment {
        path: PathBuf,
        offset: u64,
        reason: String,
    },

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    /// A read was routed to a segment with no live worker (bookkeeping bug)
    #[error("No read worker for segment {0}")]
    WorkerNotFound(SegmentId),

    #[error("Database is closed")]
    Closed,

    #[error("Merge failed: {0}")]
    Merge(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// True for either corruption variant
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            StoreError::CorruptRecord { .. } | StoreError::CorruptSegment { .. }
        )
    }
}
