//! Data File Reader
//!
//! Random-access reads of single records, by location.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use parking_lot::Mutex;

use crate::error::{EmberError, Result};

use super::{data_file_path, decode_record, parse_header, FileId, Record, RecordLocation, HEADER_SIZE};

/// Read handle on one data file
pub struct DataFileReader {
    file_id: FileId,
    /// Seek + read needs exclusive access to the file position
    file: Mutex<File>,
}

impl DataFileReader {
    /// Open a data file and validate its header
    pub fn open(dir: &Path, file_id: FileId) -> Result<Self> {
        let mut file = File::open(data_file_path(dir, file_id))?;

        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;
        let declared = parse_header(&header)?;
        if declared != file_id {
            return Err(EmberError::Corruption(format!(
                "data file {} declares id {}",
                file_id, declared
            )));
        }

        Ok(Self {
            file_id,
            file: Mutex::new(file),
        })
    }

    /// Read and verify the record at `location`
    pub fn read(&self, location: &RecordLocation) -> Result<Record> {
        if location.file_id != self.file_id {
            return Err(EmberError::Storage(format!(
                "location in file {} read through file {}",
                location.file_id, self.file_id
            )));
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(location.offset))?;

        let mut frame_header = [0u8; 8];
        file.read_exact(&mut frame_header)?;
        let len = u32::from_le_bytes([
            frame_header[0],
            frame_header[1],
            frame_header[2],
            frame_header[3],
        ]);
        let crc = u32::from_le_bytes([
            frame_header[4],
            frame_header[5],
            frame_header[6],
            frame_header[7],
        ]);
        if len != location.len {
            return Err(EmberError::Corruption(format!(
                "record at {}:{} has length {}, index says {}",
                self.file_id, location.offset, len, location.len
            )));
        }

        let mut payload = vec![0u8; len as usize];
        file.read_exact(&mut payload)?;
        drop(file);

        decode_record(&payload, crc)
    }

    pub fn file_id(&self) -> FileId {
        self.file_id
    }
}
