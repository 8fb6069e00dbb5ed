//! Storage Manager
//!
//! The persistent tier: owns the data files, the active writer and the
//! key index, and hands out snapshot boundaries.
//!
//! ## Responsibilities
//! - Discover existing data files on startup and rebuild the index
//! - Append flushed write-buffer batches to the active file
//! - Seal the active file for snapshots and report the boundary
//! - Track outstanding snapshots and files that are not yet safe to read
//! - Build read-only handles scoped to a snapshot boundary

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};

use crate::config::Config;
use crate::entry::read_value;
use crate::error::{EmberError, Result};
use crate::options::ReadOptions;

use super::datafile::{
    encode_frame, parse_file_id, DataFileReader, DataFileWriter, FileId, Record, RecordLocation,
};
use super::index::{KeyIndex, RecoveryStats};
use super::readonly::ReadOnlyStorage;

/// Identifier handed out with every snapshot
pub type SnapshotId = u32;

/// What a new snapshot needs from the storage manager besides its boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotData {
    pub snapshot_id: SnapshotId,
    /// Files that must stay invisible to the snapshot
    pub ignore_file_ids: BTreeSet<FileId>,
}

/// Manages the storage layer
///
/// ## Concurrency:
/// - `active`: Mutex, held for the whole of an append batch or a seal, so
///   batches and seals are totally ordered
/// - `index` / `readers`: RwLock (many concurrent readers, exclusive writer)
/// - Snapshot ids: atomic counter (lock-free)
/// - All methods use `&self` (no exclusive access needed)
pub struct StorageManager {
    /// Directory where data files are stored
    data_dir: PathBuf,

    /// Rotation threshold for the active file
    max_file_size: u64,

    /// Writer for the file receiving appends
    active: Mutex<DataFileWriter>,

    /// Key → newest live record
    index: RwLock<KeyIndex>,

    /// Open read handles, one per data file
    readers: RwLock<BTreeMap<FileId, Arc<DataFileReader>>>,

    /// Files currently being appended to
    files_in_flight: Mutex<BTreeSet<FileId>>,

    /// Snapshots not yet released
    snapshots: Mutex<BTreeSet<SnapshotId>>,

    /// Next snapshot id (atomic, lock-free)
    next_snapshot_id: AtomicU32,

    /// Cleared for good after a failed write
    healthy: AtomicBool,

    /// What open() found on disk
    recovery: RecoveryStats,
}

impl StorageManager {
    /// Open or create storage in `config.data_dir`
    ///
    /// On startup:
    /// 1. Create directory if it doesn't exist
    /// 2. Discover existing data files
    /// 3. Replay them in id order to rebuild the index
    /// 4. Start a fresh active file after the newest one
    pub fn open(config: &Config) -> Result<Self> {
        let path = config.data_dir.as_path();
        fs::create_dir_all(path)?;

        let file_ids = Self::discover_file_ids(path)?;
        let (index, recovery) =
            KeyIndex::rebuild(path, &file_ids, config.verify_checksums_on_open)?;

        if recovery.files_scanned > 0 {
            tracing::info!(
                files = recovery.files_scanned,
                records = recovery.records_recovered,
                truncated = recovery.files_truncated,
                keys = index.len(),
                "storage recovery complete"
            );
        }

        let mut readers = BTreeMap::new();
        for &id in &file_ids {
            match DataFileReader::open(path, id) {
                Ok(reader) => {
                    readers.insert(id, Arc::new(reader));
                }
                // Files with a torn header hold no records; the index never points at them
                Err(e) => tracing::warn!(file_id = id, error = %e, "data file not readable"),
            }
        }

        // Never append to a recovered file: its tail may be torn
        let next_id = file_ids.last().map(|&id| id + 1).unwrap_or(1);
        let active = DataFileWriter::create(path, next_id)?;
        readers.insert(next_id, Arc::new(DataFileReader::open(path, next_id)?));

        Ok(Self {
            data_dir: path.to_path_buf(),
            max_file_size: config.max_file_size,
            active: Mutex::new(active),
            index: RwLock::new(index),
            readers: RwLock::new(readers),
            files_in_flight: Mutex::new(BTreeSet::new()),
            snapshots: Mutex::new(BTreeSet::new()),
            next_snapshot_id: AtomicU32::new(1),
            healthy: AtomicBool::new(true),
            recovery,
        })
    }

    /// Get a value by key
    ///
    /// Returns:
    /// - `Ok(Some(value))` — key found with value
    /// - `Ok(None)` — key not found, or deleted
    pub fn get(&self, read_options: &ReadOptions, key: &[u8]) -> Result<Option<Bytes>> {
        let Some(location) = self.index.read().get(key) else {
            return Ok(None);
        };

        let reader = self.readers.read().get(&location.file_id).cloned().ok_or_else(|| {
            EmberError::Storage(format!("no reader for data file {}", location.file_id))
        })?;

        match reader.read(&location)? {
            Record::Put { header, data, .. } => Ok(Some(read_value(
                key,
                &header,
                Bytes::from(data),
                read_options.verify_checksums,
            )?)),
            Record::Delete { .. } => Err(EmberError::Corruption(
                "index points at a delete record".to_string(),
            )),
        }
    }

    /// Append a batch of records to the active file and publish them
    ///
    /// Records land in order; the index is only updated once the batch
    /// is durable.
    pub fn write_batch(&self, records: &[Record]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut active = self.active.lock();
        self.files_in_flight.lock().insert(active.file_id());

        let result = self.append_all(&mut active, records);

        self.files_in_flight.lock().clear();
        let locations = result.inspect_err(|e| {
            tracing::error!(error = %e, "write to data file failed, storage marked unhealthy");
            self.healthy.store(false, Ordering::SeqCst);
        })?;

        let mut index = self.index.write();
        for (record, location) in records.iter().zip(locations) {
            index.apply(record, location);
        }
        Ok(())
    }

    fn append_all(
        &self,
        active: &mut DataFileWriter,
        records: &[Record],
    ) -> Result<Vec<RecordLocation>> {
        let mut locations = Vec::with_capacity(records.len());
        for record in records {
            let frame = encode_frame(record)?;
            if active.record_count() > 0 && active.size() + frame.len() as u64 > self.max_file_size {
                self.rotate(active)?;
                self.files_in_flight.lock().insert(active.file_id());
            }
            locations.push(active.append_frame(&frame)?);
        }
        active.sync()?;
        Ok(locations)
    }

    /// Seal the active file and start the next one
    fn rotate(&self, active: &mut DataFileWriter) -> Result<()> {
        active.sync()?;
        let next_id = active.file_id() + 1;
        let writer = DataFileWriter::create(&self.data_dir, next_id)?;
        let reader = DataFileReader::open(&self.data_dir, next_id)?;
        self.readers.write().insert(next_id, Arc::new(reader));

        tracing::debug!(sealed = active.file_id(), active = next_id, "rotated data file");
        *active = writer;
        Ok(())
    }

    /// Health probe run before every write
    pub fn filesystem_status(&self) -> Result<()> {
        if !self.healthy.load(Ordering::SeqCst) {
            return Err(EmberError::StorageUnhealthy(
                "a previous write to the data files failed".to_string(),
            ));
        }
        if !self.data_dir.is_dir() {
            return Err(EmberError::StorageUnhealthy(format!(
                "data directory {} is missing",
                self.data_dir.display()
            )));
        }
        Ok(())
    }

    /// Seal the active file so a snapshot can stop at it
    ///
    /// Returns the boundary: the newest file whose records the snapshot
    /// may see. An active file with no records is not sealed; the boundary
    /// is then the file before it.
    pub fn flush_current_file_for_snapshot(&self) -> Result<FileId> {
        let mut active = self.active.lock();
        if active.record_count() == 0 {
            return Ok(active.file_id() - 1);
        }

        let boundary = active.file_id();
        self.rotate(&mut active)?;
        Ok(boundary)
    }

    /// Register a new snapshot
    pub fn new_snapshot_data(&self) -> Result<SnapshotData> {
        let snapshot_id = self.next_snapshot_id.fetch_add(1, Ordering::SeqCst);
        let ignore_file_ids = self.files_in_flight.lock().clone();
        self.snapshots.lock().insert(snapshot_id);

        tracing::debug!(snapshot_id, ignored = ignore_file_ids.len(), "snapshot registered");
        Ok(SnapshotData {
            snapshot_id,
            ignore_file_ids,
        })
    }

    /// Forget a snapshot once its holder is done with it
    pub fn release_snapshot(&self, snapshot_id: SnapshotId) {
        if self.snapshots.lock().remove(&snapshot_id) {
            tracing::debug!(snapshot_id, "snapshot released");
        }
    }

    /// Build a secondary read-only handle over files `<= boundary`,
    /// minus `ignore`
    pub fn open_read_only(
        &self,
        ignore: &BTreeSet<FileId>,
        boundary: FileId,
    ) -> Result<ReadOnlyStorage> {
        let file_ids: Vec<FileId> = self
            .readers
            .read()
            .keys()
            .copied()
            .filter(|id| *id <= boundary && !ignore.contains(id))
            .collect();
        ReadOnlyStorage::open(&self.data_dir, file_ids)
    }

    /// fsync the active file
    pub fn sync(&self) -> Result<()> {
        self.active.lock().sync()
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Ids of every data file, ascending
    pub fn file_ids(&self) -> Vec<FileId> {
        self.readers.read().keys().copied().collect()
    }

    pub fn active_file_id(&self) -> FileId {
        self.active.lock().file_id()
    }

    /// Number of live keys
    pub fn key_count(&self) -> usize {
        self.index.read().len()
    }

    pub fn outstanding_snapshots(&self) -> usize {
        self.snapshots.lock().len()
    }

    pub fn recovery_stats(&self) -> RecoveryStats {
        self.recovery
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Ids of the data files in `dir`, ascending
    fn discover_file_ids(dir: &Path) -> Result<Vec<FileId>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(dir)? {
            let file_path = entry?.path();
            if file_path.is_file() {
                if let Some(id) = parse_file_id(&file_path) {
                    ids.push(id);
                }
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }
}
