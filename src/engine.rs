//! Engine Module
//!
//! The public facade: routes reads through the write buffer and the
//! storage manager, and drives the per-chunk write path.
//!
//! ## Responsibilities
//! - Get / Put / PutChunk / Delete
//! - Split oversized values into chunks
//! - Run every chunk through compression, checksum and the space bound
//!   before it reaches the write buffer
//! - Build snapshots and iterators

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::bytespan::ByteSpan;
use crate::checksum::ChecksumSession;
use crate::chunking::split_windows;
use crate::compression::CompressionSession;
use crate::config::Config;
use crate::entry::{allocated_space, check_allocated_space};
use crate::error::{EmberError, Result};
use crate::options::{ReadOptions, WriteOptions};
use crate::snapshot::{DbIterator, Snapshot};
use crate::storage::StorageManager;
use crate::write_buffer::{BufferLookup, ChunkRecord, EntryId, WriteBuffer};

/// The main database handle
///
/// ## Concurrency Model
///
/// No lock guards get/put/delete at this level. Visibility is the business
/// of the write buffer and the storage manager, which synchronize
/// internally. The one rule imposed here: all chunks of an entry go
/// through the same [`EntrySession`], in order. `&mut EntrySession` makes
/// that a compile-time property.
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Recent writes (internal RwLock)
    write_buffer: Arc<WriteBuffer>,

    /// Persistent storage (internal locking)
    storage: Arc<StorageManager>,

    closed: AtomicBool,

    /// Held shared by writers, exclusively by `close`
    write_gate: RwLock<()>,
}

/// Where an entry session stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Open,
    Complete,
    Failed,
}

/// Write state for one entry, threaded through every chunk of it
///
/// Created by [`Engine::begin_entry`]. Dropping a session before its last
/// chunk discards whatever was staged for it.
pub struct EntrySession {
    entry_id: EntryId,
    key: Bytes,
    total_size: u64,
    /// Logical offset the next chunk must start at
    next_offset: u64,
    compression: CompressionSession,
    checksum: ChecksumSession,
    state: SessionState,
    write_buffer: Arc<WriteBuffer>,
}

impl EntrySession {
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Logical offset the next chunk must start at
    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    /// True once the last chunk has been handed to the write buffer
    pub fn is_complete(&self) -> bool {
        self.state == SessionState::Complete
    }

    pub fn is_failed(&self) -> bool {
        self.state == SessionState::Failed
    }

    fn fail(&mut self) {
        self.state = SessionState::Failed;
        self.write_buffer.abort_entry(self.entry_id);
    }
}

impl Drop for EntrySession {
    fn drop(&mut self) {
        if self.state != SessionState::Complete {
            self.write_buffer.abort_entry(self.entry_id);
        }
    }
}

impl Engine {
    /// Open or create an engine with the given config
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let storage = Arc::new(StorageManager::open(&config)?);
        let write_buffer = Arc::new(WriteBuffer::new(
            Arc::clone(&storage),
            config.write_buffer_size_limit,
        ));

        tracing::info!(
            data_dir = %config.data_dir.display(),
            keys = storage.key_count(),
            compression = ?config.compression,
            "engine opened"
        );

        Ok(Self {
            config,
            write_buffer,
            storage,
            closed: AtomicBool::new(false),
            write_gate: RwLock::new(()),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EmberError::DatabaseClosed);
        }
        Ok(())
    }

    /// Get a value by key
    ///
    /// Search order:
    /// 1. Write buffer (authoritative for every key it holds)
    /// 2. Storage manager
    pub fn get(&self, read_options: &ReadOptions, key: &[u8]) -> Result<Bytes> {
        self.ensure_open()?;

        match self.write_buffer.get(read_options, key)? {
            BufferLookup::Found(value) => {
                tracing::trace!(key = ?key, "found in buffer");
                Ok(value)
            }
            BufferLookup::Tombstone => Err(EmberError::KeyNotFound),
            BufferLookup::NotFound => {
                tracing::trace!(key = ?key, "not found in buffer");
                match self.storage.get(read_options, key)? {
                    Some(value) => {
                        tracing::trace!(key = ?key, "found in storage engine");
                        Ok(value)
                    }
                    None => {
                        tracing::trace!(key = ?key, "not found in storage engine");
                        Err(EmberError::KeyNotFound)
                    }
                }
            }
        }
    }

    /// Put a key-value pair
    pub fn put(
        &self,
        write_options: &WriteOptions,
        key: &[u8],
        value: impl Into<ByteSpan>,
    ) -> Result<()> {
        let value = ByteSpan::new(value.into().into_bytes());
        let mut session = self.begin_entry(key, value.len() as u64);
        self.put_chunk(write_options, &mut session, value)
    }

    /// Start writing an entry of `total_size` bytes chunk by chunk
    pub fn begin_entry(&self, key: &[u8], total_size: u64) -> EntrySession {
        EntrySession {
            entry_id: self.write_buffer.next_entry_id(),
            key: Bytes::copy_from_slice(key),
            total_size,
            next_offset: 0,
            compression: CompressionSession::new(self.config.compression, total_size),
            checksum: ChecksumSession::new(key),
            state: SessionState::Open,
            write_buffer: Arc::clone(&self.write_buffer),
        }
    }

    /// Write the next chunk of an entry
    ///
    /// `chunk.offset()` is its logical offset in the value; chunks must
    /// arrive in order with no gaps. A chunk larger than `max_chunk_size`
    /// is split. The first failing chunk fails the whole session: nothing
    /// of the entry becomes visible.
    pub fn put_chunk(
        &self,
        write_options: &WriteOptions,
        session: &mut EntrySession,
        chunk: ByteSpan,
    ) -> Result<()> {
        let _writer = self.write_gate.read();
        self.ensure_open()?;

        match session.state {
            SessionState::Open => {}
            SessionState::Complete => {
                return Err(EmberError::InvalidChunk(
                    "entry already received its last chunk".to_string(),
                ))
            }
            SessionState::Failed => {
                return Err(EmberError::InvalidChunk(
                    "entry failed on an earlier chunk".to_string(),
                ))
            }
        }

        let result = self.validate_chunk(session, &chunk).and_then(|()| {
            if chunk.len() as u64 <= self.config.max_chunk_size {
                return self.put_chunk_valid_size(write_options, session, chunk);
            }
            for window in split_windows(chunk, self.config.max_chunk_size) {
                self.put_chunk_valid_size(write_options, session, window)?;
            }
            Ok(())
        });

        if result.is_err() {
            session.fail();
        }
        result
    }

    fn validate_chunk(&self, session: &EntrySession, chunk: &ByteSpan) -> Result<()> {
        if allocated_space(session.total_size).is_none() {
            return Err(EmberError::InvalidChunk(format!(
                "value size {} leaves no room for its padding",
                session.total_size
            )));
        }
        if chunk.offset() != session.next_offset {
            return Err(EmberError::InvalidChunk(format!(
                "chunk at offset {}, expected {}",
                chunk.offset(),
                session.next_offset
            )));
        }
        if chunk.end() > session.total_size {
            return Err(EmberError::InvalidChunk(format!(
                "chunk ends at {}, past the value size {}",
                chunk.end(),
                session.total_size
            )));
        }
        if chunk.is_empty() && session.total_size > 0 {
            return Err(EmberError::InvalidChunk(
                "empty chunk in a non-empty value".to_string(),
            ));
        }
        Ok(())
    }

    /// Per-chunk write path: health check → compression → checksum →
    /// space bound → write buffer
    fn put_chunk_valid_size(
        &self,
        write_options: &WriteOptions,
        session: &mut EntrySession,
        chunk: ByteSpan,
    ) -> Result<()> {
        self.storage.filesystem_status()?;

        let logical_offset = chunk.offset();
        let logical_end = chunk.end();
        let is_last = logical_end == session.total_size;
        tracing::trace!(key = ?&session.key[..], logical_offset, "put chunk");

        let compressed = session.compression.step(chunk)?;
        let padding_size = session.compression.padding_size();
        check_allocated_space(
            compressed.storage_offset,
            compressed.data.len() as u64,
            session.total_size,
            padding_size,
        )?;

        session.checksum.stream(&compressed.data);
        let compressed_size = if is_last {
            session.compression.compressed_size()
        } else {
            0
        };

        let record = ChunkRecord {
            entry_id: session.entry_id,
            key: session.key.clone(),
            data: compressed.data,
            storage_offset: compressed.storage_offset,
            logical_size: session.total_size,
            compressed_size,
            padding_size,
            checksum: session.checksum.current(),
            is_last,
        };
        if is_last {
            tracing::trace!(
                key = ?&session.key[..],
                compressed_size,
                checksum = record.checksum,
                "last chunk"
            );
        }

        self.write_buffer.put_chunk(write_options, record)?;
        session.next_offset = logical_end;
        if is_last {
            session.state = SessionState::Complete;
        }
        Ok(())
    }

    /// Delete a key
    pub fn delete(&self, write_options: &WriteOptions, key: &[u8]) -> Result<()> {
        let _writer = self.write_gate.read();
        self.ensure_open()?;
        tracing::trace!(key = ?key, "delete");
        self.storage.filesystem_status()?;
        self.write_buffer.delete(write_options, key)
    }

    /// Flush the write buffer to storage
    pub fn flush(&self) -> Result<()> {
        self.ensure_open()?;
        self.write_buffer.flush()
    }

    /// Create a point-in-time, read-only view of the database
    ///
    /// 1. Flush the write buffer so everything written so far is in storage
    /// 2. Seal the active file; its id is the boundary
    /// 3. Register the snapshot and learn which files it must ignore
    /// 4. Open a read-only storage handle limited to that range
    pub fn new_snapshot(&self) -> Result<Snapshot> {
        self.ensure_open()?;
        tracing::debug!("new snapshot");

        self.write_buffer.flush()?;
        let boundary = self.storage.flush_current_file_for_snapshot()?;
        let data = self.storage.new_snapshot_data()?;

        if data.ignore_file_ids.contains(&boundary) {
            self.storage.release_snapshot(data.snapshot_id);
            return Err(EmberError::Snapshot(format!(
                "boundary file {} is not safe to read yet",
                boundary
            )));
        }

        let read_only = match self.storage.open_read_only(&data.ignore_file_ids, boundary) {
            Ok(read_only) => read_only,
            Err(e) => {
                self.storage.release_snapshot(data.snapshot_id);
                return Err(e);
            }
        };

        Ok(Snapshot::new(
            data.snapshot_id,
            boundary,
            data.ignore_file_ids,
            read_only,
            Arc::clone(&self.storage),
        ))
    }

    /// Iterate over a fresh snapshot; the iterator owns it
    pub fn new_iterator(&self, read_options: &ReadOptions) -> Result<DbIterator<'static>> {
        self.ensure_open()?;
        let snapshot = self.new_snapshot()?;
        Ok(DbIterator::owning(snapshot, *read_options))
    }

    /// Close the engine gracefully
    ///
    /// Flushes any pending data and syncs to disk. Every later call fails
    /// with [`EmberError::DatabaseClosed`].
    pub fn close(&self) -> Result<()> {
        // Writers that got past `ensure_open` finish before the final flush
        let _writers = self.write_gate.write();
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Err(e) = self.write_buffer.flush().and_then(|()| self.storage.sync()) {
            // Stay open so the caller (or drop) can try again
            self.closed.store(false, Ordering::SeqCst);
            return Err(e);
        }
        tracing::info!(data_dir = %self.config.data_dir.display(), "engine closed");
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn write_buffer(&self) -> &WriteBuffer {
        &self.write_buffer
    }

    pub fn storage(&self) -> &StorageManager {
        &self.storage
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "failed to close engine on drop");
        }
    }
}
