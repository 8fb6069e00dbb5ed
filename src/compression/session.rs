//! Compression session
//!
//! State machine driven once per chunk of a single entry:
//!
//! ```text
//!   Uninitialized ──first chunk──▶ Active ──does not fit──▶ Disabled
//!         │                          │                        │
//!         └──codec none / empty──▶ Off                        └─ raw until the end
//! ```
//!
//! While `Active`, each chunk is compressed and kept only if the rest of
//! the entry could still be written raw (behind one frame header) inside
//! `logical_size + padding_size`. Otherwise the chunk is re-emitted as a
//! raw frame and every later chunk of the entry is stored raw.

use bytes::Bytes;

use super::codec::{compress_frame, raw_frame, FRAME_HEADER_SIZE};
use super::CompressionType;
use crate::bytespan::ByteSpan;
use crate::entry::calculate_padding_size;
use crate::error::{EmberError, Result};

/// Where the session stands within its entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionState {
    /// No chunk seen yet
    Uninitialized,

    /// Compressing; `written` bytes of frames emitted so far
    Active { written: u64 },

    /// Compression abandoned; next raw chunk goes at `running_offset`
    Disabled { running_offset: u64 },

    /// Entry stored raw from the start (codec none or empty value)
    Off,
}

/// Chunk bytes as they will be persisted, and where
#[derive(Debug, Clone)]
pub struct CompressedChunk {
    pub data: Bytes,
    pub storage_offset: u64,
}

/// Compression state for one entry written by one writer
#[derive(Debug)]
pub struct CompressionSession {
    compression: CompressionType,
    logical_size: u64,
    padding_size: u64,
    state: CompressionState,
}

impl CompressionSession {
    pub fn new(compression: CompressionType, logical_size: u64) -> Self {
        Self {
            compression,
            logical_size,
            padding_size: calculate_padding_size(logical_size),
            state: CompressionState::Uninitialized,
        }
    }

    pub fn state(&self) -> CompressionState {
        self.state
    }

    /// True while chunks are still being compressed
    pub fn is_enabled(&self) -> bool {
        matches!(self.state, CompressionState::Active { .. })
    }

    /// Padding that bounds this entry's writes; zero for raw entries
    pub fn padding_size(&self) -> u64 {
        match self.state {
            CompressionState::Off => 0,
            _ => self.padding_size,
        }
    }

    /// Size of the persisted entry, 0 when it is stored raw from the start.
    /// Only final once the last chunk went through [`Self::step`].
    pub fn compressed_size(&self) -> u64 {
        match self.state {
            CompressionState::Active { written } => written,
            CompressionState::Disabled { running_offset } => running_offset,
            CompressionState::Uninitialized | CompressionState::Off => 0,
        }
    }

    /// Turn one chunk into its persisted form.
    ///
    /// Takes the chunk by value; the caller keeps no alias to it.
    pub fn step(&mut self, chunk: ByteSpan) -> Result<CompressedChunk> {
        if self.state == CompressionState::Uninitialized {
            if chunk.offset() != 0 {
                return Err(EmberError::InvalidChunk(format!(
                    "first chunk starts at offset {}, expected 0",
                    chunk.offset()
                )));
            }
            self.state = if self.compression == CompressionType::None || chunk.is_empty() {
                CompressionState::Off
            } else {
                CompressionState::Active { written: 0 }
            };
        }

        match self.state {
            CompressionState::Off => Ok(CompressedChunk {
                storage_offset: chunk.offset(),
                data: chunk.into_bytes(),
            }),
            CompressionState::Disabled { running_offset } => {
                self.state = CompressionState::Disabled {
                    running_offset: running_offset.saturating_add(chunk.len() as u64),
                };
                Ok(CompressedChunk {
                    storage_offset: running_offset,
                    data: chunk.into_bytes(),
                })
            }
            CompressionState::Active { written } => self.compress_chunk(chunk, written),
            CompressionState::Uninitialized => Err(EmberError::Compression(
                "compression session was not initialized".to_string(),
            )),
        }
    }

    fn compress_chunk(&mut self, chunk: ByteSpan, written: u64) -> Result<CompressedChunk> {
        if chunk.is_empty() {
            return Ok(CompressedChunk {
                data: Bytes::new(),
                storage_offset: written,
            });
        }

        let compressed = compress_frame(&chunk)?;
        let compressed_len = compressed.len() as u64;

        let space_left = self
            .logical_size
            .saturating_add(self.padding_size)
            .saturating_sub(written);
        let remaining = self.logical_size.saturating_sub(chunk.offset());
        let needed_if_disabled = remaining
            .saturating_sub(chunk.len() as u64)
            .saturating_add(FRAME_HEADER_SIZE);
        let fits = space_left
            .checked_sub(compressed_len)
            .is_some_and(|left| needed_if_disabled <= left);

        if fits {
            self.state = CompressionState::Active {
                written: written + compressed_len,
            };
            return Ok(CompressedChunk {
                data: compressed,
                storage_offset: written,
            });
        }

        let raw = raw_frame(&chunk)?;
        tracing::debug!(
            chunk_offset = chunk.offset(),
            compressed_len,
            space_left,
            "compression does not fit the reserved space, storing the rest of the entry raw"
        );
        self.state = CompressionState::Disabled {
            running_offset: written + raw.len() as u64,
        };
        Ok(CompressedChunk {
            data: raw,
            storage_offset: written,
        })
    }
}
