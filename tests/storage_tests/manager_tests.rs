//! Tests for StorageManager
//!
//! These tests verify:
//! - Opening/creating storage directories
//! - Writing batches and reading them back
//! - Deletions hiding older values
//! - Persistence (restart and rebuild the index)
//! - File rotation and snapshot boundaries
//! - Read-only handles scoped to a boundary

use std::collections::BTreeSet;
use std::path::Path;

use emberkv::checksum::entry_checksum;
use emberkv::config::Config;
use emberkv::entry::EntryHeader;
use emberkv::options::ReadOptions;
use emberkv::storage::{data_file_path, Record, StorageManager};
use emberkv::EmberError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn config_for(path: &Path) -> Config {
    Config::builder().data_dir(path).build()
}

fn open_manager(path: &Path) -> StorageManager {
    StorageManager::open(&config_for(path)).unwrap()
}

fn put(key: &[u8], value: &[u8]) -> Record {
    Record::Put {
        key: key.to_vec(),
        header: EntryHeader {
            logical_size: value.len() as u64,
            compressed_size: 0,
            checksum: entry_checksum(key, value),
            padding_size: 0,
        },
        data: value.to_vec(),
    }
}

fn delete(key: &[u8]) -> Record {
    Record::Delete { key: key.to_vec() }
}

fn read(manager: &StorageManager, key: &[u8]) -> Option<Vec<u8>> {
    manager
        .get(&ReadOptions::new().verify_checksums(true), key)
        .unwrap()
        .map(|v| v.to_vec())
}

// =============================================================================
// Open/Create Tests
// =============================================================================

#[test]
fn test_open_creates_directory() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("new_storage");

    assert!(!path.exists());

    let manager = open_manager(&path);

    assert!(path.is_dir());
    assert_eq!(manager.active_file_id(), 1);
    assert!(data_file_path(&path, 1).exists());
}

#[test]
fn test_open_empty_directory() {
    let temp = TempDir::new().unwrap();

    let manager = open_manager(temp.path());

    assert_eq!(manager.key_count(), 0);
    assert_eq!(manager.file_ids(), vec![1]);
    assert_eq!(manager.recovery_stats().files_scanned, 0);
}

// =============================================================================
// Write / Get Tests
// =============================================================================

#[test]
fn test_write_batch_then_get() {
    let temp = TempDir::new().unwrap();
    let manager = open_manager(temp.path());

    manager
        .write_batch(&[put(b"a", b"apple"), put(b"b", b"banana")])
        .unwrap();

    assert_eq!(read(&manager, b"a"), Some(b"apple".to_vec()));
    assert_eq!(read(&manager, b"b"), Some(b"banana".to_vec()));
    assert_eq!(read(&manager, b"c"), None);
    assert_eq!(manager.key_count(), 2);
}

#[test]
fn test_newer_write_overrides_older() {
    let temp = TempDir::new().unwrap();
    let manager = open_manager(temp.path());

    manager.write_batch(&[put(b"k", b"v1")]).unwrap();
    manager.write_batch(&[put(b"k", b"v2")]).unwrap();

    assert_eq!(read(&manager, b"k"), Some(b"v2".to_vec()));
}

#[test]
fn test_delete_hides_older_value() {
    let temp = TempDir::new().unwrap();
    let manager = open_manager(temp.path());

    manager.write_batch(&[put(b"k", b"v")]).unwrap();
    manager.write_batch(&[delete(b"k")]).unwrap();

    assert_eq!(read(&manager, b"k"), None);
    assert_eq!(manager.key_count(), 0);
}

#[test]
fn test_empty_batch_is_noop() {
    let temp = TempDir::new().unwrap();
    let manager = open_manager(temp.path());

    manager.write_batch(&[]).unwrap();

    assert_eq!(manager.file_ids(), vec![1]);
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_persistence_across_restart() {
    let temp = TempDir::new().unwrap();
    {
        let manager = open_manager(temp.path());
        manager
            .write_batch(&[put(b"a", b"1"), put(b"b", b"2"), delete(b"a")])
            .unwrap();
    }

    let manager = open_manager(temp.path());

    assert_eq!(read(&manager, b"a"), None);
    assert_eq!(read(&manager, b"b"), Some(b"2".to_vec()));
    assert_eq!(manager.recovery_stats().files_scanned, 1);
    assert_eq!(manager.recovery_stats().records_recovered, 3);
}

#[test]
fn test_restart_starts_new_active_file() {
    let temp = TempDir::new().unwrap();
    {
        let manager = open_manager(temp.path());
        manager.write_batch(&[put(b"a", b"1")]).unwrap();
    }

    let manager = open_manager(temp.path());

    assert_eq!(manager.active_file_id(), 2);
    assert_eq!(manager.file_ids(), vec![1, 2]);
}

#[test]
fn test_recovery_skips_torn_tail() {
    let temp = TempDir::new().unwrap();
    {
        let manager = open_manager(temp.path());
        manager.write_batch(&[put(b"a", b"kept")]).unwrap();
        manager.write_batch(&[put(b"b", b"lost in the crash")]).unwrap();
    }

    // Chop the last few bytes off, as if the process died mid-append
    let path = data_file_path(temp.path(), 1);
    let len = std::fs::metadata(&path).unwrap().len();
    let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(len - 4).unwrap();
    drop(file);

    let manager = open_manager(temp.path());

    assert_eq!(read(&manager, b"a"), Some(b"kept".to_vec()));
    assert_eq!(read(&manager, b"b"), None);
    assert_eq!(manager.recovery_stats().files_truncated, 1);
}

#[test]
fn test_ignores_unrelated_files() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("README"), b"not a data file").unwrap();

    let manager = open_manager(temp.path());

    assert_eq!(manager.file_ids(), vec![1]);
}

// =============================================================================
// Rotation and Snapshot Boundary Tests
// =============================================================================

#[test]
fn test_rotation_on_max_file_size() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp.path())
        .max_file_size(256)
        .build();
    let manager = StorageManager::open(&config).unwrap();

    for i in 0..20u8 {
        manager.write_batch(&[put(&[i], &[i; 64])]).unwrap();
    }

    assert!(manager.file_ids().len() > 1);
    for i in 0..20u8 {
        assert_eq!(read(&manager, &[i]), Some(vec![i; 64]));
    }
}

#[test]
fn test_flush_for_snapshot_seals_active_file() {
    let temp = TempDir::new().unwrap();
    let manager = open_manager(temp.path());
    manager.write_batch(&[put(b"a", b"1")]).unwrap();

    let boundary = manager.flush_current_file_for_snapshot().unwrap();

    assert_eq!(boundary, 1);
    assert_eq!(manager.active_file_id(), 2);
}

#[test]
fn test_flush_for_snapshot_with_empty_active_file() {
    let temp = TempDir::new().unwrap();
    let manager = open_manager(temp.path());
    manager.write_batch(&[put(b"a", b"1")]).unwrap();
    manager.flush_current_file_for_snapshot().unwrap();

    // Nothing written to file 2: it is not sealed, the boundary stays at 1
    let boundary = manager.flush_current_file_for_snapshot().unwrap();

    assert_eq!(boundary, 1);
    assert_eq!(manager.active_file_id(), 2);
}

#[test]
fn test_snapshot_registration_and_release() {
    let temp = TempDir::new().unwrap();
    let manager = open_manager(temp.path());

    let first = manager.new_snapshot_data().unwrap();
    let second = manager.new_snapshot_data().unwrap();

    assert_ne!(first.snapshot_id, second.snapshot_id);
    assert!(first.ignore_file_ids.is_empty());
    assert_eq!(manager.outstanding_snapshots(), 2);

    manager.release_snapshot(first.snapshot_id);
    manager.release_snapshot(first.snapshot_id);

    assert_eq!(manager.outstanding_snapshots(), 1);
}

#[test]
fn test_read_only_sees_only_files_up_to_boundary() {
    let temp = TempDir::new().unwrap();
    let manager = open_manager(temp.path());
    manager.write_batch(&[put(b"old", b"before")]).unwrap();
    let boundary = manager.flush_current_file_for_snapshot().unwrap();

    manager
        .write_batch(&[put(b"new", b"after"), put(b"old", b"overwritten")])
        .unwrap();
    let read_only = manager.open_read_only(&BTreeSet::new(), boundary).unwrap();

    let ro = ReadOptions::new();
    assert_eq!(read_only.file_ids(), &[1]);
    assert_eq!(read_only.keys().collect::<Vec<_>>(), vec![&b"old"[..]]);
    assert_eq!(&read_only.get(&ro, b"old").unwrap().unwrap()[..], b"before");
    assert!(read_only.get(&ro, b"new").unwrap().is_none());
    assert_eq!(read(&manager, b"old"), Some(b"overwritten".to_vec()));
}

#[test]
fn test_read_only_respects_ignore_set() {
    let temp = TempDir::new().unwrap();
    let manager = open_manager(temp.path());
    manager.write_batch(&[put(b"a", b"1")]).unwrap();
    manager.flush_current_file_for_snapshot().unwrap();
    manager.write_batch(&[put(b"b", b"2")]).unwrap();
    let boundary = manager.flush_current_file_for_snapshot().unwrap();

    let ignore: BTreeSet<u32> = [1].into_iter().collect();
    let read_only = manager.open_read_only(&ignore, boundary).unwrap();

    assert_eq!(read_only.file_ids(), &[2]);
    assert!(read_only.get(&ReadOptions::new(), b"a").unwrap().is_none());
    assert!(read_only.get(&ReadOptions::new(), b"b").unwrap().is_some());
}

#[test]
fn test_read_only_skips_file_with_torn_header() {
    let temp = TempDir::new().unwrap();
    {
        let manager = open_manager(temp.path());
        manager.write_batch(&[put(b"a", b"1")]).unwrap();
    }
    // A crash right after creating file 2, before its header was complete
    std::fs::write(data_file_path(temp.path(), 2), b"EM").unwrap();

    let manager = open_manager(temp.path());
    let boundary = manager.flush_current_file_for_snapshot().unwrap();
    let read_only = manager.open_read_only(&BTreeSet::new(), boundary).unwrap();

    assert_eq!(read_only.keys().collect::<Vec<_>>(), vec![&b"a"[..]]);
    assert_eq!(&read_only.get(&ReadOptions::new(), b"a").unwrap().unwrap()[..], b"1");
}

// =============================================================================
// Health Tests
// =============================================================================

#[test]
fn test_filesystem_status_healthy() {
    let temp = TempDir::new().unwrap();
    let manager = open_manager(temp.path());

    assert!(manager.filesystem_status().is_ok());
}

#[test]
fn test_filesystem_status_missing_directory() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("db");
    let manager = open_manager(&path);

    std::fs::remove_dir_all(&path).unwrap();

    let err = manager.filesystem_status().unwrap_err();
    assert!(matches!(err, EmberError::StorageUnhealthy(_)));
    assert!(err.is_io_error());
}
