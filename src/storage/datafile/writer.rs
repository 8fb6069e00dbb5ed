//! Data File Writer
//!
//! Appends framed records to the active data file.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{EmberError, Result};

use super::{
    data_file_path, FileId, Record, RecordLocation, HEADER_SIZE, MAGIC, RECORD_HEADER_SIZE, VERSION,
};

/// Writer for the active data file
pub struct DataFileWriter {
    file_id: FileId,
    path: PathBuf,
    /// Unbuffered so readers see every appended record immediately
    file: File,
    /// Current end of file (next record offset)
    size: u64,
    record_count: u64,
}

impl DataFileWriter {
    /// Create a new data file and write its header
    pub fn create(dir: &Path, file_id: FileId) -> Result<Self> {
        let path = data_file_path(dir, file_id);
        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&path)?;

        let mut header = Vec::with_capacity(HEADER_SIZE as usize);
        header.extend_from_slice(MAGIC);
        header.extend_from_slice(&VERSION.to_le_bytes());
        header.extend_from_slice(&file_id.to_le_bytes());
        file.write_all(&header)?;

        Ok(Self {
            file_id,
            path,
            file,
            size: HEADER_SIZE,
            record_count: 0,
        })
    }

    /// Frame and append a record, returning where it landed
    pub fn append(&mut self, record: &Record) -> Result<RecordLocation> {
        let frame = encode_frame(record)?;
        self.append_frame(&frame)
    }

    /// Append a frame produced by [`encode_frame`]
    pub fn append_frame(&mut self, frame: &[u8]) -> Result<RecordLocation> {
        let payload_len = frame.len().saturating_sub(RECORD_HEADER_SIZE as usize);
        let len = u32::try_from(payload_len).map_err(|_| {
            EmberError::Storage(format!("record of {} bytes is too large", payload_len))
        })?;

        let offset = self.size;
        self.file.write_all(frame)?;
        self.size += frame.len() as u64;
        self.record_count += 1;

        Ok(RecordLocation {
            file_id: self.file_id,
            offset,
            len,
        })
    }

    /// fsync the file
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }

    pub fn file_id(&self) -> FileId {
        self.file_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn record_count(&self) -> u64 {
        self.record_count
    }
}

/// Serialize a record into `[len][crc][payload]`
pub fn encode_frame(record: &Record) -> Result<Vec<u8>> {
    let payload = bincode::serialize(record)?;
    let len = u32::try_from(payload.len()).map_err(|_| {
        EmberError::Storage(format!("record of {} bytes is too large", payload.len()))
    })?;

    let mut frame = Vec::with_capacity(RECORD_HEADER_SIZE as usize + payload.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}
