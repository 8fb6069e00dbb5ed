//! Snapshots and iterators
//!
//! A [`Snapshot`] is a read-only view of the database frozen at the moment
//! it was created. It reads only sealed data files up to its boundary, so
//! nothing written afterwards can show through.
//!
//! A [`DbIterator`] walks a snapshot in ascending key order. It either
//! borrows a snapshot the caller keeps ([`Snapshot::iter`]) or owns one
//! created for it ([`crate::Engine::new_iterator`]); an owned snapshot is
//! released when the iterator is dropped.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::{EmberError, Result};
use crate::options::ReadOptions;
use crate::storage::{FileId, ReadOnlyStorage, SnapshotId, StorageManager};

/// Point-in-time, read-only view of the database
///
/// Dropping the snapshot releases it with the storage manager.
pub struct Snapshot {
    snapshot_id: SnapshotId,
    /// Newest data file the snapshot may read
    boundary: FileId,
    /// Files that were being written when the snapshot was taken
    ignored: BTreeSet<FileId>,
    read_only: ReadOnlyStorage,
    storage: Arc<StorageManager>,
}

impl Snapshot {
    pub(crate) fn new(
        snapshot_id: SnapshotId,
        boundary: FileId,
        ignored: BTreeSet<FileId>,
        read_only: ReadOnlyStorage,
        storage: Arc<StorageManager>,
    ) -> Self {
        tracing::debug!(
            snapshot_id,
            boundary,
            files = read_only.file_ids().len(),
            "snapshot created"
        );
        Self {
            snapshot_id,
            boundary,
            ignored,
            read_only,
            storage,
        }
    }

    /// Get a value by key as of the snapshot
    pub fn get(&self, read_options: &ReadOptions, key: &[u8]) -> Result<Bytes> {
        self.read_only
            .get(read_options, key)?
            .ok_or(EmberError::KeyNotFound)
    }

    /// Iterate over the snapshot without giving it up
    pub fn iter(&self, read_options: &ReadOptions) -> DbIterator<'_> {
        DbIterator::new(SnapshotRef::Borrowed(self), *read_options)
    }

    pub fn id(&self) -> SnapshotId {
        self.snapshot_id
    }

    pub fn boundary_file_id(&self) -> FileId {
        self.boundary
    }

    pub fn ignored_file_ids(&self) -> &BTreeSet<FileId> {
        &self.ignored
    }

    /// Data files the snapshot reads, ascending
    pub fn file_ids(&self) -> &[FileId] {
        self.read_only.file_ids()
    }

    /// Number of live keys visible through the snapshot
    pub fn key_count(&self) -> usize {
        self.read_only.key_count()
    }
}

impl Drop for Snapshot {
    fn drop(&mut self) {
        self.storage.release_snapshot(self.snapshot_id);
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("id", &self.snapshot_id)
            .field("boundary", &self.boundary)
            .field("ignored", &self.ignored)
            .field("files", &self.read_only.file_ids())
            .finish()
    }
}

/// The snapshot an iterator reads from
enum SnapshotRef<'a> {
    Owned(Snapshot),
    Borrowed(&'a Snapshot),
}

impl SnapshotRef<'_> {
    fn get(&self) -> &Snapshot {
        match self {
            SnapshotRef::Owned(snapshot) => snapshot,
            SnapshotRef::Borrowed(snapshot) => snapshot,
        }
    }
}

/// Ascending key-order iterator over a snapshot
///
/// Yields `(key, value)` pairs. A read error is yielded once and ends the
/// iteration.
pub struct DbIterator<'a> {
    snapshot: SnapshotRef<'a>,
    read_options: ReadOptions,
    /// Last key yielded; the next one is strictly greater
    last_key: Option<Vec<u8>>,
    done: bool,
}

impl DbIterator<'static> {
    /// Iterator that owns its snapshot and releases it when dropped
    pub(crate) fn owning(snapshot: Snapshot, read_options: ReadOptions) -> Self {
        Self::new(SnapshotRef::Owned(snapshot), read_options)
    }
}

impl<'a> DbIterator<'a> {
    fn new(snapshot: SnapshotRef<'a>, read_options: ReadOptions) -> Self {
        Self {
            snapshot,
            read_options,
            last_key: None,
            done: false,
        }
    }

    /// The snapshot being iterated
    pub fn snapshot(&self) -> &Snapshot {
        self.snapshot.get()
    }

    /// True if dropping the iterator releases its snapshot
    pub fn owns_snapshot(&self) -> bool {
        matches!(self.snapshot, SnapshotRef::Owned(_))
    }
}

impl Iterator for DbIterator<'_> {
    type Item = Result<(Bytes, Bytes)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let read_only = &self.snapshot.get().read_only;
        let Some((key, location)) = read_only.next_after(self.last_key.as_deref()) else {
            self.done = true;
            return None;
        };

        match read_only.read(&self.read_options, &key, &location) {
            Ok(value) => {
                let item = (Bytes::copy_from_slice(&key), value);
                self.last_key = Some(key);
                Some(Ok(item))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
