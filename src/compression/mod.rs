//! Compression Module
//!
//! Adaptive per-entry compression of value chunks.
//!
//! ## Responsibilities
//! - Frame each chunk so a reader can tell compressed from raw bytes
//! - Decide chunk by chunk whether compression still fits the entry's
//!   reserved space, and give up for the rest of the entry when it does not
//! - Decode a persisted entry back into its logical value
//!
//! ## Frame Format
//! ```text
//! ┌───────────────────────────┬──────────────────────┬──────────────┐
//! │ PayloadLen: u32 (4)       │ RawLen: u32 (4)      │   Payload    │
//! │ bit 31 set = raw frame    │ uncompressed length  │              │
//! └───────────────────────────┴──────────────────────┴──────────────┘
//! ```
//!
//! A raw frame is only ever emitted when compression is abandoned for an
//! entry, and every chunk after it is persisted without a frame. A decoder
//! that meets a raw frame therefore copies everything that follows it.

mod codec;
mod session;

pub use codec::{compress_frame, decode_value, raw_frame, FRAME_HEADER_SIZE, MAX_FRAME_PAYLOAD};
pub use session::{CompressedChunk, CompressionSession, CompressionState};

/// Codec applied to value chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionType {
    /// Store every chunk raw
    None,

    /// LZ4 block compression
    #[default]
    Lz4,
}
