//! Write Buffer Module
//!
//! In-memory tier holding recent writes until they are flushed to the
//! storage manager.
//!
//! ## Responsibilities
//! - Answer reads for keys it holds, including deletions (tombstones)
//! - Stage the chunks of an entry until its last chunk arrives
//! - Track size for flush triggers
//! - Flush everything it holds to storage as one batch
//!
//! ## Data Structure Choice
//! BTreeMap wrapped in RwLock, as two tables: the live one receiving
//! writes and the one currently being flushed. Reads consult both, so a
//! flush never opens a window where a key is in neither tier.

mod table;

use bytes::Bytes;

pub use table::WriteBuffer;

/// Identifies one entry being written, across all of its chunks
pub type EntryId = u64;

/// What the write buffer knows about a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferLookup {
    /// A live value
    Found(Bytes),

    /// The key was deleted; storage must not be consulted
    Tombstone,

    /// The buffer holds nothing for the key
    NotFound,
}

/// One chunk of an entry, in its persisted form
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub entry_id: EntryId,
    pub key: Bytes,
    /// Bytes exactly as they will be persisted
    pub data: Bytes,
    /// Where `data` goes in the entry's persisted region
    pub storage_offset: u64,
    pub logical_size: u64,
    /// Final persisted size, 0 when the entry is stored raw
    pub compressed_size: u64,
    pub padding_size: u64,
    /// Checksum streamed so far; final on the last chunk
    pub checksum: u32,
    pub is_last: bool,
}
