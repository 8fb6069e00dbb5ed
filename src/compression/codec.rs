//! Frame codec
//!
//! LZ4 framing of single chunks and decoding of whole persisted entries.

use bytes::{BufMut, Bytes, BytesMut};

use crate::entry::EntryHeader;
use crate::error::{EmberError, Result};

/// Frame header: PayloadLen (4) + RawLen (4) = 8 bytes
pub const FRAME_HEADER_SIZE: u64 = 8;

/// Set on PayloadLen when the payload is stored uncompressed
const RAW_FRAME_FLAG: u32 = 0x8000_0000;

/// Largest payload a frame can describe
pub const MAX_FRAME_PAYLOAD: u64 = (RAW_FRAME_FLAG - 1) as u64;

/// Compress one chunk into an LZ4 frame
pub fn compress_frame(chunk: &[u8]) -> Result<Bytes> {
    let raw_len = frame_len(chunk.len())?;
    let payload = lz4_flex::block::compress(chunk);
    let payload_len = frame_len(payload.len())?;

    let mut frame = BytesMut::with_capacity(FRAME_HEADER_SIZE as usize + payload.len());
    frame.put_u32_le(payload_len);
    frame.put_u32_le(raw_len);
    frame.put_slice(&payload);
    Ok(frame.freeze())
}

/// Wrap one chunk, uncompressed, in a frame marked raw
pub fn raw_frame(chunk: &[u8]) -> Result<Bytes> {
    let len = frame_len(chunk.len())?;

    let mut frame = BytesMut::with_capacity(FRAME_HEADER_SIZE as usize + chunk.len());
    frame.put_u32_le(len | RAW_FRAME_FLAG);
    frame.put_u32_le(len);
    frame.put_slice(chunk);
    Ok(frame.freeze())
}

fn frame_len(len: usize) -> Result<u32> {
    u32::try_from(len)
        .ok()
        .filter(|&len| u64::from(len) <= MAX_FRAME_PAYLOAD)
        .ok_or_else(|| {
            EmberError::Compression(format!(
                "chunk of {} bytes exceeds the frame limit of {} bytes",
                len, MAX_FRAME_PAYLOAD
            ))
        })
}

/// Rebuild the logical value of an entry from its persisted bytes
pub fn decode_value(header: &EntryHeader, persisted: Bytes) -> Result<Bytes> {
    if !header.is_compressed() {
        if persisted.len() as u64 != header.logical_size {
            return Err(EmberError::Corruption(format!(
                "raw entry holds {} bytes, header says {}",
                persisted.len(),
                header.logical_size
            )));
        }
        return Ok(persisted);
    }

    let mut value = BytesMut::with_capacity(header.logical_size as usize);
    let mut pos = 0usize;
    let header_size = FRAME_HEADER_SIZE as usize;

    while pos < persisted.len() {
        if pos + header_size > persisted.len() {
            return Err(EmberError::Corruption(format!(
                "truncated frame header at offset {}",
                pos
            )));
        }
        let word = u32::from_le_bytes(persisted[pos..pos + 4].try_into().map_err(|_| {
            EmberError::Corruption("unreadable frame header".to_string())
        })?);
        let raw_len = u32::from_le_bytes(persisted[pos + 4..pos + 8].try_into().map_err(|_| {
            EmberError::Corruption("unreadable frame header".to_string())
        })?) as usize;
        pos += header_size;

        if word & RAW_FRAME_FLAG != 0 {
            // Compression was abandoned here; the rest of the entry is raw
            value.put_slice(&persisted[pos..]);
            break;
        }

        let payload_len = word as usize;
        if pos + payload_len > persisted.len() {
            return Err(EmberError::Corruption(format!(
                "frame at offset {} overruns the entry",
                pos - header_size
            )));
        }
        let chunk = lz4_flex::block::decompress(&persisted[pos..pos + payload_len], raw_len)
            .map_err(|e| EmberError::Compression(e.to_string()))?;
        if chunk.len() != raw_len {
            return Err(EmberError::Corruption(format!(
                "frame decoded to {} bytes, expected {}",
                chunk.len(),
                raw_len
            )));
        }
        value.put_slice(&chunk);
        pos += payload_len;
    }

    if value.len() as u64 != header.logical_size {
        return Err(EmberError::Corruption(format!(
            "entry decoded to {} bytes, header says {}",
            value.len(),
            header.logical_size
        )));
    }
    Ok(value.freeze())
}
