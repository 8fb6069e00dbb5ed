//! Write buffer implementation
//!
//! BTreeMap-based tables with RwLock for concurrency.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use parking_lot::{Mutex, RwLock};

use crate::entry::{read_value, EntryHeader};
use crate::error::{EmberError, Result};
use crate::options::{ReadOptions, WriteOptions};
use crate::storage::{Record, StorageManager};

use super::{BufferLookup, ChunkRecord, EntryId};

/// Entry stored in a buffer table
#[derive(Debug, Clone)]
enum BufferEntry {
    /// A complete value, in persisted form
    Value { header: EntryHeader, data: Bytes },

    /// A deleted key
    Tombstone,
}

impl BufferEntry {
    fn data_len(&self) -> usize {
        match self {
            BufferEntry::Value { data, .. } => data.len(),
            BufferEntry::Tombstone => 0,
        }
    }
}

type Table = BTreeMap<Vec<u8>, BufferEntry>;

/// Chunks received so far for an entry that is not complete yet
struct PendingEntry {
    key: Bytes,
    data: BytesMut,
}

/// In-memory tier for recent writes
///
/// ## Concurrency:
/// - `live` / `flushing`: RwLock; flushes and readers both take `flushing`
///   before `live` and hold both while they look
/// - `size`: only changed while `live` is write-locked
/// - `pending`: Mutex, keyed by entry so concurrent writers never share state
/// - `flush_lock`: serializes flushes
pub struct WriteBuffer {
    storage: Arc<StorageManager>,

    /// Flush once `size` reaches this many bytes
    size_limit: usize,

    /// Table receiving writes
    live: RwLock<Table>,

    /// Table being written to storage, if a flush is running
    flushing: RwLock<Option<Arc<Table>>>,

    /// Entries whose last chunk has not arrived
    pending: Mutex<HashMap<EntryId, PendingEntry>>,

    /// Bytes of keys and persisted data in `live`
    size: AtomicUsize,

    flush_lock: Mutex<()>,

    next_entry_id: AtomicU64,
}

impl WriteBuffer {
    pub fn new(storage: Arc<StorageManager>, size_limit: usize) -> Self {
        Self {
            storage,
            size_limit,
            live: RwLock::new(BTreeMap::new()),
            flushing: RwLock::new(None),
            pending: Mutex::new(HashMap::new()),
            size: AtomicUsize::new(0),
            flush_lock: Mutex::new(()),
            next_entry_id: AtomicU64::new(1),
        }
    }

    /// Allocate an id for a new entry
    pub fn next_entry_id(&self) -> EntryId {
        self.next_entry_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Look a key up in the buffer (live table first, then the one being flushed)
    pub fn get(&self, read_options: &ReadOptions, key: &[u8]) -> Result<BufferLookup> {
        let found = {
            let flushing = self.flushing.read();
            let live = self.live.read();
            live.get(key)
                .or_else(|| flushing.as_ref().and_then(|table| table.get(key)))
                .cloned()
        };

        match found {
            Some(BufferEntry::Value { header, data }) => Ok(BufferLookup::Found(read_value(
                key,
                &header,
                data,
                read_options.verify_checksums,
            )?)),
            Some(BufferEntry::Tombstone) => Ok(BufferLookup::Tombstone),
            None => Ok(BufferLookup::NotFound),
        }
    }

    /// Stage one chunk; the entry becomes visible with its last chunk
    pub fn put_chunk(&self, write_options: &WriteOptions, chunk: ChunkRecord) -> Result<()> {
        let completed = {
            let mut pending = self.pending.lock();
            let entry = pending.entry(chunk.entry_id).or_insert_with(|| PendingEntry {
                key: chunk.key.clone(),
                data: BytesMut::new(),
            });

            if entry.key != chunk.key {
                return Err(EmberError::InvalidChunk(format!(
                    "entry {} already belongs to another key",
                    chunk.entry_id
                )));
            }
            if chunk.storage_offset != entry.data.len() as u64 {
                let staged = entry.data.len();
                pending.remove(&chunk.entry_id);
                return Err(EmberError::InvalidChunk(format!(
                    "chunk at storage offset {} does not follow the {} bytes staged",
                    chunk.storage_offset, staged
                )));
            }
            entry.data.extend_from_slice(&chunk.data);

            if chunk.is_last {
                pending.remove(&chunk.entry_id)
            } else {
                None
            }
        };

        let Some(entry) = completed else {
            return Ok(());
        };

        let header = EntryHeader {
            logical_size: chunk.logical_size,
            compressed_size: chunk.compressed_size,
            checksum: chunk.checksum,
            padding_size: chunk.padding_size,
        };
        if entry.data.len() as u64 != header.persisted_size() {
            return Err(EmberError::InvalidChunk(format!(
                "entry persisted {} bytes, header expects {}",
                entry.data.len(),
                header.persisted_size()
            )));
        }

        self.insert(
            write_options,
            entry.key.to_vec(),
            BufferEntry::Value {
                header,
                data: entry.data.freeze(),
            },
        )
    }

    /// Discard the staged chunks of an entry that will never complete
    pub fn abort_entry(&self, entry_id: EntryId) {
        if self.pending.lock().remove(&entry_id).is_some() {
            tracing::debug!(entry_id, "discarded incomplete entry");
        }
    }

    /// Record a deletion
    pub fn delete(&self, write_options: &WriteOptions, key: &[u8]) -> Result<()> {
        self.insert(write_options, key.to_vec(), BufferEntry::Tombstone)
    }

    /// Put an entry in `live`, replacing any older one for the same key
    fn insert(&self, write_options: &WriteOptions, key: Vec<u8>, entry: BufferEntry) -> Result<()> {
        let new_size = {
            let mut live = self.live.write();
            let key_len = key.len();
            let added = key_len + entry.data_len();
            let removed = live.insert(key, entry).map_or(0, |old| key_len + old.data_len());
            let size = self.size.load(Ordering::SeqCst) + added - removed;
            self.size.store(size, Ordering::SeqCst);
            size
        };
        if write_options.sync || new_size >= self.size_limit {
            self.flush()?;
        }
        Ok(())
    }

    /// Write everything buffered to storage; blocks until it is durable
    pub fn flush(&self) -> Result<()> {
        let _flush_guard = self.flush_lock.lock();

        let table = {
            let mut flushing = self.flushing.write();
            let mut live = self.live.write();
            if live.is_empty() {
                return Ok(());
            }
            let table = Arc::new(std::mem::take(&mut *live));
            self.size.store(0, Ordering::SeqCst);
            *flushing = Some(Arc::clone(&table));
            table
        };

        let mut flushed_bytes = 0usize;
        let records: Vec<Record> = table
            .iter()
            .map(|(key, entry)| {
                flushed_bytes += key.len();
                match entry {
                    BufferEntry::Value { header, data } => {
                        flushed_bytes += data.len();
                        Record::Put {
                            key: key.clone(),
                            header: *header,
                            data: data.to_vec(),
                        }
                    }
                    BufferEntry::Tombstone => Record::Delete { key: key.clone() },
                }
            })
            .collect();

        let result = self.storage.write_batch(&records);

        let mut flushing = self.flushing.write();
        if result.is_err() {
            // Put the batch back under anything written since
            let mut live = self.live.write();
            let mut restored = 0usize;
            for (key, entry) in table.iter() {
                if let Entry::Vacant(slot) = live.entry(key.clone()) {
                    restored += key.len() + entry.data_len();
                    slot.insert(entry.clone());
                }
            }
            self.size.fetch_add(restored, Ordering::SeqCst);
        } else {
            tracing::debug!(entries = records.len(), bytes = flushed_bytes, "write buffer flushed");
        }
        *flushing = None;
        result
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Bytes of keys and persisted data in the live table
    pub fn size(&self) -> usize {
        self.size.load(Ordering::SeqCst)
    }

    /// Number of keys (values and tombstones) in the live table
    pub fn entry_count(&self) -> usize {
        self.live.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.read().is_empty()
    }

    /// Entries with staged chunks but no last chunk yet
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}
