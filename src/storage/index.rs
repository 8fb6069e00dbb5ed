//! Key Index
//!
//! In-memory map from key to the location of its newest live record.
//! Rebuilt by replaying data files in id order: later records win and
//! deletions drop the key.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::ops::Bound;
use std::path::Path;

use crate::error::{EmberError, Result};

use super::datafile::{DataFileScanner, FileId, Record, RecordLocation};

/// Outcome of replaying data files into an index
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryStats {
    /// Data files replayed
    pub files_scanned: u64,

    /// Records applied to the index
    pub records_recovered: u64,

    /// Files whose scan stopped at a torn or corrupt record
    pub files_truncated: u64,
}

/// Sorted key → location index
#[derive(Debug, Default, Clone)]
pub struct KeyIndex {
    entries: BTreeMap<Vec<u8>, RecordLocation>,
}

impl KeyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay the given files, in the given order
    pub fn rebuild(
        dir: &Path,
        file_ids: &[FileId],
        verify_checksums: bool,
    ) -> Result<(Self, RecoveryStats)> {
        let mut index = Self::new();
        let mut stats = RecoveryStats::default();

        for &file_id in file_ids {
            let scanner = match DataFileScanner::open(dir, file_id, verify_checksums) {
                Ok(scanner) => scanner,
                // Crashed before the header was complete: nothing to replay
                Err(EmberError::Io(e)) if e.kind() == ErrorKind::UnexpectedEof => {
                    tracing::warn!(file_id, "skipping data file with a truncated header");
                    stats.files_truncated += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            stats.files_scanned += 1;

            for item in scanner {
                match item {
                    Ok((location, record)) => {
                        index.apply(&record, location);
                        stats.records_recovered += 1;
                    }
                    Err(e) => {
                        tracing::warn!(file_id, error = %e, "stopping scan at corrupt record");
                        stats.files_truncated += 1;
                        break;
                    }
                }
            }
        }

        Ok((index, stats))
    }

    /// Apply one record written at `location`
    pub fn apply(&mut self, record: &Record, location: RecordLocation) {
        match record {
            Record::Put { key, .. } => {
                self.entries.insert(key.clone(), location);
            }
            Record::Delete { key } => {
                self.entries.remove(key.as_slice());
            }
        }
    }

    pub fn get(&self, key: &[u8]) -> Option<RecordLocation> {
        self.entries.get(key).copied()
    }

    /// First entry strictly after `key`, or the first entry when `key` is None
    pub fn next_after(&self, key: Option<&[u8]>) -> Option<(&[u8], RecordLocation)> {
        let lower = match key {
            Some(key) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };
        self.entries
            .range::<[u8], _>((lower, Bound::Unbounded))
            .next()
            .map(|(k, v)| (k.as_slice(), *v))
    }

    /// Live keys in ascending order
    pub fn keys(&self) -> impl Iterator<Item = &[u8]> {
        self.entries.keys().map(|k| k.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &RecordLocation)> {
        self.entries.iter().map(|(k, v)| (k.as_slice(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
