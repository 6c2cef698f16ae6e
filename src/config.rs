//! Configuration for SegStore
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{Result, StoreError};

/// Main configuration for a SegStore database
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory holding every segment file
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── segment-000000   (oldest)
    ///     ├── segment-000001
    ///     └── segment-00000N   (active)
    pub data_dir: PathBuf,

    /// Max size of a segment before rotation (in bytes)
    pub segment_size_limit: u64,

    /// Sync strategy: how often to fsync the active segment
    pub sync_strategy: SyncStrategy,

    // -------------------------------------------------------------------------
    // Compaction Configuration
    // -------------------------------------------------------------------------
    /// Total segment count (passive + active) that schedules a merge
    pub merge_threshold: usize,

    // -------------------------------------------------------------------------
    // Read Worker Configuration
    // -------------------------------------------------------------------------
    /// Bounded queue length of each read worker
    pub worker_queue_depth: usize,
}

/// Active segment sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync after every append (safest, slowest)
    EveryWrite,

    /// fsync after N unsynced appends (balanced durability/performance)
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./segstore_data"),
            segment_size_limit: 10 * 1024 * 1024, // 10 MB
            sync_strategy: SyncStrategy::EveryNEntries { count: 100 },
            merge_threshold: 3,
            worker_queue_depth: 64,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.segment_size_limit == 0 {
            return Err(StoreError::Config(
                "segment_size_limit must be greater than 0".to_string(),
            ));
        }
        if self.merge_threshold < 2 {
            return Err(StoreError::Config(format!(
                "merge_threshold must be at least 2, got {}",
                self.merge_threshold
            )));
        }
        if self.worker_queue_depth == 0 {
            return Err(StoreError::Config(
                "worker_queue_depth must be greater than 0".to_string(),
            ));
        }
        if let SyncStrategy::EveryNEntries { count: 0 } = self.sync_strategy {
            return Err(StoreError::Config(
                "EveryNEntries sync count must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the segment size limit (in bytes)
    pub fn segment_size_limit(mut self, size: u64) -> Self {
        self.config.segment_size_limit = size;
        self
    }

    /// Set the active segment sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the segment count that schedules a merge
    pub fn merge_threshold(mut self, count: usize) -> Self {
        self.config.merge_threshold = count;
        self
    }

    /// Set the queue depth of each read worker
    pub fn worker_queue_depth(mut self, depth: usize) -> Self {
        self.config.worker_queue_depth = depth;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
