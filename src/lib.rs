//! # SegStore
//!
//! An embedded key-value store built on an append-only segmented log:
//! - Hash index over record locations, one local index per active segment
//! - Segment rotation at a configurable size limit
//! - Crash recovery by replaying segments, failing loudly on torn records
//! - Background merging of closed segments (compaction)
//! - One serialized read worker per closed segment
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                            Db                               │
//! │            RwLock<segments, active, index, workers>         │
//! └───────┬──────────────────────┬───────────────────────┬──────┘
//!         │ put                  │ get                   │ threshold
//!         ▼                      ▼                       ▼
//!  ┌─────────────┐   ┌───────────────────────┐   ┌──────────────┐
//!  │   Active    │   │     Global Index      │   │    Merge     │
//!  │  Segment    │   │ key → (segment, off)  │   │   Executor   │
//!  │ (append +   │   └──────────┬────────────┘   │  (thread)    │
//!  │ local index)│              │                └──────┬───────┘
//!  └─────────────┘              ▼                       │ rewrites
//!                     ┌───────────────────┐             ▼
//!                     │   Read Workers    │◀──── passive segments
//!                     │ (one per segment) │
//!                     └───────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use segstore::Db;
//!
//! # fn main() -> segstore::Result<()> {
//! let db = Db::open_path("./data", 10 * 1024 * 1024)?;
//! db.put("k1", "v1")?;
//! assert_eq!(db.get("k1")?, "v1");
//! db.close()?;
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod codec;
pub mod index;
pub mod segment;
pub mod worker;
pub mod merge;
pub mod db;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{StoreError, Result};
pub use config::{Config, SyncStrategy};
pub use codec::Entry;
pub use db::{Db, DbStats};
pub use merge::MergeStats;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of SegStore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
