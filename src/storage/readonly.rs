//! Read-only storage
//!
//! A secondary view over a fixed set of sealed data files. Built for a
//! snapshot: it sees exactly the files at or below the snapshot boundary,
//! minus the ones the snapshot must ignore, and nothing written later.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::entry::read_value;
use crate::error::{EmberError, Result};
use crate::options::ReadOptions;

use super::datafile::{DataFileReader, FileId, Record, RecordLocation};
use super::index::KeyIndex;

/// Read-only handle over a fixed set of data files
pub struct ReadOnlyStorage {
    data_dir: PathBuf,
    /// Visible files, ascending
    file_ids: Vec<FileId>,
    index: KeyIndex,
    readers: BTreeMap<FileId, DataFileReader>,
}

impl ReadOnlyStorage {
    /// Open the given files and index them
    pub fn open(dir: &Path, mut file_ids: Vec<FileId>) -> Result<Self> {
        file_ids.sort_unstable();
        file_ids.dedup();

        let (index, _) = KeyIndex::rebuild(dir, &file_ids, true)?;

        let mut readers = BTreeMap::new();
        for &id in &file_ids {
            match DataFileReader::open(dir, id) {
                Ok(reader) => {
                    readers.insert(id, reader);
                }
                // A torn header holds no indexed records
                Err(e) => tracing::warn!(file_id = id, error = %e, "data file not readable"),
            }
        }

        Ok(Self {
            data_dir: dir.to_path_buf(),
            file_ids,
            index,
            readers,
        })
    }

    /// Get a value by key, as of the files this handle covers
    pub fn get(&self, read_options: &ReadOptions, key: &[u8]) -> Result<Option<Bytes>> {
        match self.index.get(key) {
            Some(location) => self.read(read_options, key, &location).map(Some),
            None => Ok(None),
        }
    }

    /// Read the value stored at `location` for `key`
    pub fn read(
        &self,
        read_options: &ReadOptions,
        key: &[u8],
        location: &RecordLocation,
    ) -> Result<Bytes> {
        let reader = self.readers.get(&location.file_id).ok_or_else(|| {
            EmberError::Storage(format!("no reader for data file {}", location.file_id))
        })?;

        match reader.read(location)? {
            Record::Put { header, data, .. } => {
                read_value(key, &header, Bytes::from(data), read_options.verify_checksums)
            }
            Record::Delete { .. } => Err(EmberError::Corruption(
                "index points at a delete record".to_string(),
            )),
        }
    }

    /// First live entry strictly after `key` (or the first one)
    pub fn next_after(&self, key: Option<&[u8]>) -> Option<(Vec<u8>, RecordLocation)> {
        self.index
            .next_after(key)
            .map(|(k, location)| (k.to_vec(), location))
    }

    /// Live keys, ascending
    pub fn keys(&self) -> impl Iterator<Item = &[u8]> {
        self.index.keys()
    }

    /// Files visible through this handle, ascending
    pub fn file_ids(&self) -> &[FileId] {
        &self.file_ids
    }

    pub fn key_count(&self) -> usize {
        self.index.len()
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}
