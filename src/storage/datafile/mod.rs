//! Data File Module
//!
//! Append-only log of records. The active file grows until it is sealed
//! (rotation or snapshot); sealed files are never modified again.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header (10 bytes)                                       │
//! │   Magic: "EMKV" (4) | Version: u16 (2) | FileId: u32 (4)│
//! ├─────────────────────────────────────────────────────────┤
//! │ Records (variable)                                      │
//! │   [Len: u32][CRC32: u32][bincode(Record)]               │
//! │   ... repeated until end of file ...                    │
//! └─────────────────────────────────────────────────────────┘
//! ```

mod reader;
mod scanner;
mod writer;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::entry::EntryHeader;
use crate::error::{EmberError, Result};

pub use reader::DataFileReader;
pub use scanner::DataFileScanner;
pub use writer::{encode_frame, DataFileWriter};

// =============================================================================
// Shared Constants (used by writer, reader, scanner)
// =============================================================================

/// Magic bytes identifying an EmberKV data file
pub(crate) const MAGIC: &[u8; 4] = b"EMKV";

/// Current data file format version
pub(crate) const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2) + FileId (4) = 10 bytes
pub(crate) const HEADER_SIZE: u64 = 10;

/// Record frame: Len (4) + CRC32 (4) = 8 bytes
pub(crate) const RECORD_HEADER_SIZE: u64 = 8;

/// Identifier of a data file; ids grow monotonically, starting at 1
pub type FileId = u32;

// =============================================================================
// Records
// =============================================================================

/// A single entry in a data file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Record {
    /// A complete value, persisted bytes as produced by the write path
    Put {
        key: Vec<u8>,
        header: EntryHeader,
        data: Vec<u8>,
    },

    /// A deletion
    Delete { key: Vec<u8> },
}

impl Record {
    pub fn key(&self) -> &[u8] {
        match self {
            Record::Put { key, .. } | Record::Delete { key } => key,
        }
    }
}

/// Where a record lives on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLocation {
    pub file_id: FileId,
    /// Offset of the record frame
    pub offset: u64,
    /// Length of the bincode payload
    pub len: u32,
}

// =============================================================================
// Path Helpers
// =============================================================================

/// "00000042.ekv"
pub fn data_file_path(dir: &Path, file_id: FileId) -> PathBuf {
    dir.join(format!("{:08}.ekv", file_id))
}

/// "00000042.ekv" → Some(42)
pub fn parse_file_id(path: &Path) -> Option<FileId> {
    if path.extension()? != "ekv" {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}

/// Validate a file header and return the file id it declares
pub(crate) fn parse_header(header: &[u8; HEADER_SIZE as usize]) -> Result<FileId> {
    if &header[0..4] != MAGIC {
        return Err(EmberError::Corruption(format!(
            "Invalid data file magic: expected EMKV, got {:?}",
            &header[0..4]
        )));
    }

    let version = u16::from_le_bytes([header[4], header[5]]);
    if version != VERSION {
        return Err(EmberError::Corruption(format!(
            "Unsupported data file version: {}",
            version
        )));
    }

    Ok(u32::from_le_bytes([header[6], header[7], header[8], header[9]]))
}

/// Decode a payload after checking it against its frame CRC
pub(crate) fn decode_record(payload: &[u8], expected_crc: u32) -> Result<Record> {
    let actual = crc32fast::hash(payload);
    if actual != expected_crc {
        return Err(EmberError::Corruption(format!(
            "record CRC mismatch: expected {:#010x}, got {:#010x}",
            expected_crc, actual
        )));
    }
    Ok(bincode::deserialize(payload)?)
}
