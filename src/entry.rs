//! Entry metadata
//!
//! Every stored value carries an [`EntryHeader`]. The persisted bytes of an
//! entry live in a region of `logical_size + padding_size` bytes; no chunk
//! may ever be written past the end of that region.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::checksum::entry_checksum;
use crate::compression::decode_value;
use crate::error::{EmberError, Result};

/// Smallest padding reserved for any entry.
/// Must stay at least [`crate::compression::FRAME_HEADER_SIZE`] so a value
/// can always fall back to one raw frame.
pub const MIN_PADDING_SIZE: u64 = 32;

/// Per-value metadata stored next to the persisted bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryHeader {
    /// Size of the value as the caller wrote it
    pub logical_size: u64,
    /// Size of the persisted representation, 0 when stored uncompressed
    pub compressed_size: u64,
    /// CRC32 over the key followed by the persisted bytes
    pub checksum: u32,
    /// Extra space reserved past `logical_size`
    pub padding_size: u64,
}

impl EntryHeader {
    pub fn is_compressed(&self) -> bool {
        self.compressed_size != 0
    }

    /// Number of bytes actually persisted for this entry
    pub fn persisted_size(&self) -> u64 {
        if self.is_compressed() {
            self.compressed_size
        } else {
            self.logical_size
        }
    }

    /// Total space reserved for the entry
    pub fn allocated_size(&self) -> u64 {
        self.logical_size.saturating_add(self.padding_size)
    }
}

/// Padding reserved for a value of `logical_size` bytes: 1% of the value,
/// never less than [`MIN_PADDING_SIZE`].
pub fn calculate_padding_size(logical_size: u64) -> u64 {
    (logical_size / 100).max(MIN_PADDING_SIZE)
}

/// Space reserved for a value of `logical_size` bytes, `None` when it
/// does not fit in a `u64`.
pub fn allocated_space(logical_size: u64) -> Option<u64> {
    logical_size.checked_add(calculate_padding_size(logical_size))
}

/// Refuse any write that would land outside `[0, logical_size + padding_size)`.
pub fn check_allocated_space(
    storage_offset: u64,
    persisted_size: u64,
    logical_size: u64,
    padding_size: u64,
) -> Result<()> {
    let allocated = logical_size.checked_add(padding_size);
    let end = storage_offset.checked_add(persisted_size);
    let inside = matches!((end, allocated), (Some(end), Some(allocated)) if end <= allocated);
    if !inside {
        let allocated = allocated.unwrap_or(u64::MAX);
        tracing::error!(
            storage_offset,
            persisted_size,
            allocated,
            "write was attempted outside of the allocated space"
        );
        return Err(EmberError::OutOfAllocatedSpace {
            offset: storage_offset,
            size: persisted_size,
            allocated,
        });
    }
    Ok(())
}

/// Turn a persisted entry back into the value the caller wrote,
/// optionally checking its checksum first.
pub fn read_value(
    key: &[u8],
    header: &EntryHeader,
    persisted: Bytes,
    verify_checksum: bool,
) -> Result<Bytes> {
    if verify_checksum {
        let actual = entry_checksum(key, &persisted);
        if actual != header.checksum {
            return Err(EmberError::Corruption(format!(
                "checksum mismatch: stored {:#010x}, computed {:#010x}",
                header.checksum, actual
            )));
        }
    }
    decode_value(header, persisted)
}
