//! Data File Scanner
//!
//! Sequential pass over every record of a data file, used to rebuild the
//! key index on open and when a read-only handle is constructed.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use crate::error::{EmberError, Result};

use super::{
    data_file_path, decode_record, parse_header, FileId, Record, RecordLocation, HEADER_SIZE,
    RECORD_HEADER_SIZE,
};

/// Iterator over the records of one data file, in write order
///
/// A clean end of file ends the iteration. A torn or corrupt record
/// yields one error and then ends it; nothing after a bad record is
/// trusted.
pub struct DataFileScanner {
    reader: BufReader<File>,
    file_id: FileId,
    /// File length when the scan started
    file_len: u64,
    /// Offset of the next record frame
    current_offset: u64,
    verify_checksums: bool,
    done: bool,
}

impl DataFileScanner {
    pub fn open(dir: &Path, file_id: FileId, verify_checksums: bool) -> Result<Self> {
        let file = File::open(data_file_path(dir, file_id))?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let mut header = [0u8; HEADER_SIZE as usize];
        reader.read_exact(&mut header)?;
        let declared = parse_header(&header)?;
        if declared != file_id {
            return Err(EmberError::Corruption(format!(
                "data file {} declares id {}",
                file_id, declared
            )));
        }

        Ok(Self {
            reader,
            file_id,
            file_len,
            current_offset: HEADER_SIZE,
            verify_checksums,
            done: false,
        })
    }

    /// Offset just past the last record read successfully
    pub fn valid_len(&self) -> u64 {
        self.current_offset
    }

    fn read_next(&mut self) -> Result<Option<(RecordLocation, Record)>> {
        let mut frame_header = [0u8; RECORD_HEADER_SIZE as usize];
        match read_full(&mut self.reader, &mut frame_header)? {
            0 => return Ok(None),
            n if n < frame_header.len() => {
                return Err(EmberError::Corruption(format!(
                    "torn record header at {}:{}",
                    self.file_id, self.current_offset
                )))
            }
            _ => {}
        }

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

        let end = self.current_offset + RECORD_HEADER_SIZE + u64::from(len);
        if end > self.file_len {
            return Err(EmberError::Corruption(format!(
                "record at {}:{} runs past the end of the file",
                self.file_id, self.current_offset
            )));
        }

        let mut payload = vec![0u8; len as usize];
        if read_full(&mut self.reader, &mut payload)? < payload.len() {
            return Err(EmberError::Corruption(format!(
                "torn record payload at {}:{}",
                self.file_id, self.current_offset
            )));
        }

        let record = if self.verify_checksums {
            decode_record(&payload, crc)?
        } else {
            bincode::deserialize(&payload)?
        };

        let location = RecordLocation {
            file_id: self.file_id,
            offset: self.current_offset,
            len,
        };
        self.current_offset += RECORD_HEADER_SIZE + u64::from(len);
        Ok(Some((location, record)))
    }
}

impl Iterator for DataFileScanner {
    type Item = Result<(RecordLocation, Record)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_next() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Fill `buf` as far as the file allows; returns the bytes read
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(EmberError::Io(e)),
        }
    }
    Ok(filled)
}
