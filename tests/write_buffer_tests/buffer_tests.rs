//! Tests for WriteBuffer
//!
//! These tests verify:
//! - Staged entries stay invisible until their last chunk
//! - Out-of-order chunks and aborted entries leave nothing behind
//! - Tombstones shadow storage
//! - Flush hands everything to storage

use std::sync::Arc;

use bytes::Bytes;
use emberkv::checksum::{entry_checksum, ChecksumSession};
use emberkv::config::Config;
use emberkv::options::{ReadOptions, WriteOptions};
use emberkv::storage::StorageManager;
use emberkv::write_buffer::{BufferLookup, ChunkRecord, WriteBuffer};
use emberkv::EmberError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup(size_limit: usize) -> (TempDir, Arc<StorageManager>, WriteBuffer) {
    let temp = TempDir::new().unwrap();
    let config = Config::builder().data_dir(temp.path()).build();
    let storage = Arc::new(StorageManager::open(&config).unwrap());
    let buffer = WriteBuffer::new(Arc::clone(&storage), size_limit);
    (temp, storage, buffer)
}

/// Raw (uncompressed) chunks of `value`, `chunk_size` bytes each
fn raw_chunks(buffer: &WriteBuffer, key: &[u8], value: &[u8], chunk_size: usize) -> Vec<ChunkRecord> {
    let entry_id = buffer.next_entry_id();
    let mut checksum = ChecksumSession::new(key);
    let pieces: Vec<&[u8]> = value.chunks(chunk_size).collect();
    let count = pieces.len();

    pieces
        .into_iter()
        .enumerate()
        .map(|(i, piece)| {
            checksum.stream(piece);
            ChunkRecord {
                entry_id,
                key: Bytes::copy_from_slice(key),
                data: Bytes::copy_from_slice(piece),
                storage_offset: (i * chunk_size) as u64,
                logical_size: value.len() as u64,
                compressed_size: 0,
                padding_size: 0,
                checksum: checksum.current(),
                is_last: i + 1 == count,
            }
        })
        .collect()
}

fn lookup(buffer: &WriteBuffer, key: &[u8]) -> BufferLookup {
    buffer
        .get(&ReadOptions::new().verify_checksums(true), key)
        .unwrap()
}

// =============================================================================
// Staging Tests
// =============================================================================

#[test]
fn test_single_chunk_entry_is_visible() {
    let (_temp, _storage, buffer) = setup(1024 * 1024);
    let wo = WriteOptions::new();

    for chunk in raw_chunks(&buffer, b"k", b"value", 16) {
        buffer.put_chunk(&wo, chunk).unwrap();
    }

    assert_eq!(lookup(&buffer, b"k"), BufferLookup::Found(Bytes::from_static(b"value")));
    assert_eq!(buffer.entry_count(), 1);
    assert_eq!(buffer.pending_count(), 0);
}

#[test]
fn test_entry_invisible_until_last_chunk() {
    let (_temp, _storage, buffer) = setup(1024 * 1024);
    let wo = WriteOptions::new();
    let value = b"0123456789abcdefghij";
    let mut chunks = raw_chunks(&buffer, b"k", value, 5);
    let last = chunks.pop().unwrap();

    for chunk in chunks {
        buffer.put_chunk(&wo, chunk).unwrap();
    }
    assert_eq!(lookup(&buffer, b"k"), BufferLookup::NotFound);
    assert_eq!(buffer.pending_count(), 1);

    buffer.put_chunk(&wo, last).unwrap();
    assert_eq!(
        lookup(&buffer, b"k"),
        BufferLookup::Found(Bytes::copy_from_slice(value))
    );
}

#[test]
fn test_out_of_order_chunk_discards_entry() {
    let (_temp, _storage, buffer) = setup(1024 * 1024);
    let wo = WriteOptions::new();
    let mut chunks = raw_chunks(&buffer, b"k", b"0123456789", 5);

    let result = buffer.put_chunk(&wo, chunks.remove(1));

    assert!(matches!(result, Err(EmberError::InvalidChunk(_))));
    assert_eq!(buffer.pending_count(), 0);
    assert_eq!(lookup(&buffer, b"k"), BufferLookup::NotFound);
}

#[test]
fn test_abort_entry_drops_staged_chunks() {
    let (_temp, _storage, buffer) = setup(1024 * 1024);
    let wo = WriteOptions::new();
    let chunks = raw_chunks(&buffer, b"k", b"0123456789", 5);
    let entry_id = chunks[0].entry_id;

    buffer.put_chunk(&wo, chunks[0].clone()).unwrap();
    buffer.abort_entry(entry_id);

    assert_eq!(buffer.pending_count(), 0);
    assert_eq!(lookup(&buffer, b"k"), BufferLookup::NotFound);
}

#[test]
fn test_size_mismatch_on_last_chunk() {
    let (_temp, _storage, buffer) = setup(1024 * 1024);
    let mut chunk = raw_chunks(&buffer, b"k", b"short", 16).remove(0);
    chunk.logical_size = 50;

    let result = buffer.put_chunk(&WriteOptions::new(), chunk);

    assert!(matches!(result, Err(EmberError::InvalidChunk(_))));
    assert_eq!(lookup(&buffer, b"k"), BufferLookup::NotFound);
}

#[test]
fn test_concurrent_entries_do_not_mix() {
    let (_temp, _storage, buffer) = setup(1024 * 1024);
    let wo = WriteOptions::new();
    let a = raw_chunks(&buffer, b"a", b"aaaaaaaaaa", 5);
    let b = raw_chunks(&buffer, b"b", b"bbbbbbbbbb", 5);

    // Interleave the two entries chunk by chunk
    for (ca, cb) in a.into_iter().zip(b) {
        buffer.put_chunk(&wo, ca).unwrap();
        buffer.put_chunk(&wo, cb).unwrap();
    }

    assert_eq!(lookup(&buffer, b"a"), BufferLookup::Found(Bytes::from_static(b"aaaaaaaaaa")));
    assert_eq!(lookup(&buffer, b"b"), BufferLookup::Found(Bytes::from_static(b"bbbbbbbbbb")));
}

// =============================================================================
// Tombstone Tests
// =============================================================================

#[test]
fn test_delete_records_tombstone() {
    let (_temp, _storage, buffer) = setup(1024 * 1024);
    let wo = WriteOptions::new();
    for chunk in raw_chunks(&buffer, b"k", b"v", 16) {
        buffer.put_chunk(&wo, chunk).unwrap();
    }

    buffer.delete(&wo, b"k").unwrap();

    assert_eq!(lookup(&buffer, b"k"), BufferLookup::Tombstone);
}

#[test]
fn test_tombstone_of_unknown_key() {
    let (_temp, _storage, buffer) = setup(1024 * 1024);

    buffer.delete(&WriteOptions::new(), b"ghost").unwrap();

    assert_eq!(lookup(&buffer, b"ghost"), BufferLookup::Tombstone);
}

// =============================================================================
// Flush Tests
// =============================================================================

#[test]
fn test_flush_moves_entries_to_storage() {
    let (_temp, storage, buffer) = setup(1024 * 1024);
    let wo = WriteOptions::new();
    for chunk in raw_chunks(&buffer, b"k", b"persisted", 4) {
        buffer.put_chunk(&wo, chunk).unwrap();
    }
    buffer.delete(&wo, b"gone").unwrap();

    buffer.flush().unwrap();

    assert!(buffer.is_empty());
    assert_eq!(buffer.size(), 0);
    assert_eq!(lookup(&buffer, b"k"), BufferLookup::NotFound);
    let stored = storage.get(&ReadOptions::new(), b"k").unwrap().unwrap();
    assert_eq!(&stored[..], b"persisted");
}

#[test]
fn test_overwrites_are_counted_once() {
    let (_temp, _storage, buffer) = setup(64 * 1024);
    let wo = WriteOptions::new();

    for _ in 0..60 {
        for chunk in raw_chunks(&buffer, b"hot", &[9u8; 1000], 1000) {
            buffer.put_chunk(&wo, chunk).unwrap();
        }
    }
    assert_eq!(buffer.size(), 3 + 1000);

    buffer.delete(&wo, b"hot").unwrap();
    assert_eq!(buffer.size(), 3);

    buffer.flush().unwrap();
    assert_eq!(buffer.size(), 0);
    assert_eq!(buffer.entry_count(), 0);
}

#[test]
fn test_size_limit_still_applies_after_overwrites() {
    let (_temp, _storage, buffer) = setup(64 * 1024);
    let wo = WriteOptions::new();
    for _ in 0..60 {
        for chunk in raw_chunks(&buffer, b"hot", &[9u8; 1000], 1000) {
            buffer.put_chunk(&wo, chunk).unwrap();
        }
    }
    buffer.flush().unwrap();

    for chunk in raw_chunks(&buffer, b"next", &[1u8; 7000], 7000) {
        buffer.put_chunk(&wo, chunk).unwrap();
    }

    // Well under the limit: stays buffered
    assert_eq!(buffer.entry_count(), 1);
    assert_eq!(buffer.size(), 4 + 7000);
}

#[test]
fn test_flush_preserves_checksum() {
    let (_temp, storage, buffer) = setup(1024 * 1024);
    for chunk in raw_chunks(&buffer, b"key", b"checked value", 3) {
        buffer.put_chunk(&WriteOptions::new(), chunk).unwrap();
    }
    buffer.flush().unwrap();

    // Verification on read recomputes CRC(key || persisted)
    let stored = storage
        .get(&ReadOptions::new().verify_checksums(true), b"key")
        .unwrap()
        .unwrap();

    assert_eq!(&stored[..], b"checked value");
    assert_eq!(
        entry_checksum(b"key", &stored),
        entry_checksum(b"key", b"checked value")
    );
}

#[test]
fn test_flush_empty_buffer_is_noop() {
    let (_temp, storage, buffer) = setup(1024 * 1024);

    buffer.flush().unwrap();

    assert_eq!(storage.key_count(), 0);
}

#[test]
fn test_size_limit_triggers_flush() {
    let (_temp, storage, buffer) = setup(64);
    let wo = WriteOptions::new();

    for chunk in raw_chunks(&buffer, b"big", &[7u8; 100], 100) {
        buffer.put_chunk(&wo, chunk).unwrap();
    }

    assert!(buffer.is_empty());
    assert_eq!(storage.key_count(), 1);
}

#[test]
fn test_sync_write_flushes() {
    let (_temp, storage, buffer) = setup(1024 * 1024);

    buffer.delete(&WriteOptions::new().sync(true), b"k").unwrap();

    assert!(buffer.is_empty());
    assert_eq!(storage.key_count(), 0);
}
