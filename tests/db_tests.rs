//! Tests for Db
//!
//! These tests verify:
//! - Basic put/get operations and last-write-wins
//! - Segment rotation and size growth
//! - Persistence across close/reopen
//! - Lifecycle (operations after close fail fast)
//! - Concurrent access patterns

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use segstore::{Config, Db, StoreError, SyncStrategy};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

/// Large segments: everything stays in the active segment
fn setup_temp_db() -> (TempDir, Db) {
    let temp_dir = TempDir::new().unwrap();
    let db = Db::open(config_for(temp_dir.path(), 1024 * 1024, 3)).unwrap();
    (temp_dir, db)
}

/// Tiny segments with merging effectively disabled, so rotation is observable
fn setup_temp_db_without_merges(segment_size_limit: u64) -> (TempDir, Db) {
    let temp_dir = TempDir::new().unwrap();
    let db = Db::open(config_for(temp_dir.path(), segment_size_limit, 1000)).unwrap();
    (temp_dir, db)
}

fn config_for(dir: &Path, segment_size_limit: u64, merge_threshold: usize) -> Config {
    Config::builder()
        .data_dir(dir)
        .segment_size_limit(segment_size_limit)
        .merge_threshold(merge_threshold)
        .sync_strategy(SyncStrategy::EveryWrite) // Sync every write for test reliability
        .build()
}

fn segment_file_count(dir: &Path) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("segment-"))
        .count()
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_db_open_creates_directory_and_first_segment() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("mydb");

    let db = Db::open_path(&data_dir, 1024).unwrap();

    assert!(data_dir.exists());
    assert!(data_dir.join("segment-000000").exists());
    assert_eq!(db.segment_count(), 1);
    assert_eq!(db.data_dir(), data_dir.as_path());
}

#[test]
fn test_db_put_get() {
    let (_temp, db) = setup_temp_db();

    db.put("hello", "world").unwrap();

    assert_eq!(db.get("hello").unwrap(), "world");
}

#[test]
fn test_db_get_nonexistent_key() {
    let (_temp, db) = setup_temp_db();

    let result = db.get("nonexistent");

    assert!(matches!(result, Err(StoreError::KeyNotFound)));
}

#[test]
fn test_db_last_write_wins() {
    let (_temp, db) = setup_temp_db();

    db.put("k1", "v1").unwrap();
    db.put("k2", "v2").unwrap();
    db.put("k2", "v2.1").unwrap();

    assert_eq!(db.get("k1").unwrap(), "v1");
    assert_eq!(db.get("k2").unwrap(), "v2.1");
    assert_eq!(db.key_count(), 2);
}

#[test]
fn test_db_empty_value() {
    let (_temp, db) = setup_temp_db();

    db.put("empty", "").unwrap();

    assert_eq!(db.get("empty").unwrap(), "");
}

#[test]
fn test_db_put_then_get_each_pair() {
    let (_temp, db) = setup_temp_db();
    let pairs = [("k1", "v1"), ("k2", "v2"), ("k3", "v3"), ("k2", "v2.1")];

    for (key, value) in pairs {
        db.put(key, value).unwrap();
        assert_eq!(db.get(key).unwrap(), value);
    }
}

// =============================================================================
// Rotation Tests
// =============================================================================

#[test]
fn test_db_rotation_creates_segments() {
    let (temp, db) = setup_temp_db_without_merges(40);
    assert_eq!(segment_file_count(temp.path()), 1);

    // Each record is 12 + 4 + 6 = 22 bytes: one per segment at this limit
    for i in 0..5 {
        db.put(&format!("key{}", i), &format!("value{}", i)).unwrap();
    }

    assert_eq!(segment_file_count(temp.path()), 5);
    assert_eq!(db.segment_count(), 5);

    // Passive segments are served through their read workers
    for i in 0..5 {
        assert_eq!(db.get(&format!("key{}", i)).unwrap(), format!("value{}", i));
    }

    let stats = db.stats().unwrap();
    assert_eq!(stats.worker_count, 4);
    assert_eq!(stats.passive_segments.len(), 4);
}

#[test]
fn test_db_size_grows() {
    let (_temp, db) = setup_temp_db_without_merges(10);
    let pairs = [("k1", "v1"), ("k2", "v2"), ("k3", "v3"), ("k2", "v2.1")];

    for (key, value) in pairs {
        db.put(key, value).unwrap();
    }
    let size_before = db.size().unwrap();

    for (key, value) in pairs {
        db.put(key, value).unwrap();
    }
    let size_after = db.size().unwrap();

    assert!(
        size_after > size_before,
        "size did not grow: before {}, after {}",
        size_before,
        size_after
    );
}

#[test]
fn test_db_oversized_record_goes_into_empty_segment() {
    let (temp, db) = setup_temp_db_without_merges(16);
    let big = "x".repeat(100);

    db.put("big", &big).unwrap();
    db.put("big2", &big).unwrap();

    // The first record fits the empty segment; the second rotates once
    assert_eq!(segment_file_count(temp.path()), 2);
    assert_eq!(db.get("big").unwrap(), big);
    assert_eq!(db.get("big2").unwrap(), big);
}

#[test]
fn test_db_overwrite_across_segments() {
    let (_temp, db) = setup_temp_db_without_merges(30);

    db.put("key", "old").unwrap();
    db.put("other", "x").unwrap();
    db.put("key", "new").unwrap();

    assert!(db.segment_count() > 1);
    assert_eq!(db.get("key").unwrap(), "new");
}

#[test]
fn test_db_failed_rotation_leaves_state_unchanged() {
    // Each record is 14 bytes: every put after the first rotates
    let (temp, db) = setup_temp_db_without_merges(20);
    db.put("a", "1").unwrap();
    db.put("b", "2").unwrap();
    assert_eq!(db.segment_count(), 2);

    // Occupy the next segment's path so creating it fails
    let blocker = temp.path().join("segment-000002");
    fs::create_dir(&blocker).unwrap();

    let result = db.put("c", "3");

    assert!(matches!(result, Err(StoreError::Io(_))), "got {:?}", result);
    assert_eq!(db.segment_count(), 2);
    assert_eq!(db.get("a").unwrap(), "1");
    assert_eq!(db.get("b").unwrap(), "2");
    assert!(matches!(db.get("c"), Err(StoreError::KeyNotFound)));

    fs::remove_dir(&blocker).unwrap();
    db.put("c", "3").unwrap();

    assert_eq!(db.segment_count(), 3);
    assert_eq!(db.get("a").unwrap(), "1");
    assert_eq!(db.get("b").unwrap(), "2");
    assert_eq!(db.get("c").unwrap(), "3");
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_db_reopen_preserves_latest_values() {
    let temp = TempDir::new().unwrap();
    let pairs = [("k1", "v1"), ("k2", "v2"), ("k3", "v3"), ("k2", "v2.1")];

    {
        let db = Db::open(config_for(temp.path(), 10, 1000)).unwrap();
        for (key, value) in pairs {
            db.put(key, value).unwrap();
        }
        db.close().unwrap();
    }

    // Reopen with a different size limit
    let db = Db::open(config_for(temp.path(), 5, 1000)).unwrap();

    let expected: HashMap<&str, &str> = pairs.iter().copied().collect();
    for (key, value) in expected {
        assert_eq!(db.get(key).unwrap(), value, "wrong value for {}", key);
    }
}

#[test]
fn test_db_reopen_reactivates_newest_segment() {
    let temp = TempDir::new().unwrap();
    {
        let db = Db::open(config_for(temp.path(), 1024, 1000)).unwrap();
        db.put("a", "1").unwrap();
        db.close().unwrap();
    }

    let db = Db::open(config_for(temp.path(), 1024, 1000)).unwrap();
    db.put("b", "2").unwrap();

    assert_eq!(segment_file_count(temp.path()), 1);
    assert_eq!(db.get("a").unwrap(), "1");
    assert_eq!(db.get("b").unwrap(), "2");
}

#[test]
fn test_db_reopen_after_drop_without_close() {
    let temp = TempDir::new().unwrap();
    {
        let db = Db::open(config_for(temp.path(), 64, 1000)).unwrap();
        for i in 0..10 {
            db.put(&format!("key{}", i % 4), &format!("value{}", i)).unwrap();
        }
        // Dropped without close
    }

    let db = Db::open(config_for(temp.path(), 64, 1000)).unwrap();
    assert_eq!(db.get("key0").unwrap(), "value8");
    assert_eq!(db.get("key1").unwrap(), "value9");
    assert_eq!(db.get("key2").unwrap(), "value6");
    assert_eq!(db.get("key3").unwrap(), "value7");
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_db_operations_after_close_fail() {
    let (_temp, db) = setup_temp_db();
    db.put("k", "v").unwrap();

    db.close().unwrap();

    assert!(matches!(db.put("k", "v2"), Err(StoreError::Closed)));
    assert!(matches!(db.get("k"), Err(StoreError::Closed)));
    assert!(matches!(db.size(), Err(StoreError::Closed)));
    assert!(matches!(db.stats(), Err(StoreError::Closed)));
    assert!(matches!(db.compact(), Err(StoreError::Closed)));
    assert!(matches!(db.close(), Err(StoreError::Closed)));
    assert_eq!(db.segment_count(), 0);
}

#[test]
fn test_db_invalid_config() {
    let temp = TempDir::new().unwrap();

    let zero_limit = Config::builder()
        .data_dir(temp.path())
        .segment_size_limit(0)
        .build();
    assert!(matches!(Db::open(zero_limit), Err(StoreError::Config(_))));

    let low_threshold = Config::builder()
        .data_dir(temp.path())
        .merge_threshold(1)
        .build();
    assert!(matches!(Db::open(low_threshold), Err(StoreError::Config(_))));

    let no_queue = Config::builder()
        .data_dir(temp.path())
        .worker_queue_depth(0)
        .build();
    assert!(matches!(Db::open(no_queue), Err(StoreError::Config(_))));
}

#[test]
fn test_config_defaults() {
    let config = Config::default();

    assert_eq!(config.segment_size_limit, 10 * 1024 * 1024);
    assert_eq!(config.merge_threshold, 3);
    assert!(config.validate().is_ok());
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_db_concurrent_writers_and_readers() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp.path())
        .segment_size_limit(256)
        .sync_strategy(SyncStrategy::EveryNEntries { count: 10 })
        .build();
    let db = Arc::new(Db::open(config).unwrap());

    let writers: Vec<_> = (0..4)
        .map(|t| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                for i in 0..50 {
                    db.put(&format!("t{}-key{}", t, i % 10), &format!("t{}-value{}", t, i))
                        .unwrap();
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..4)
        .map(|t| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                for i in 0..50 {
                    match db.get(&format!("t{}-key{}", t, i % 10)) {
                        Ok(value) => assert!(value.starts_with(&format!("t{}-value", t))),
                        Err(StoreError::KeyNotFound) => {}
                        Err(e) => panic!("unexpected error: {}", e),
                    }
                }
            })
        })
        .collect();

    for handle in writers.into_iter().chain(readers) {
        handle.join().unwrap();
    }
    db.wait_for_merges();

    // Last write per key: i in 40..50 maps to keys 0..10
    for t in 0..4 {
        for k in 0..10 {
            assert_eq!(
                db.get(&format!("t{}-key{}", t, k)).unwrap(),
                format!("t{}-value{}", t, 40 + k)
            );
        }
    }
    assert_eq!(db.key_count(), 40);
}
