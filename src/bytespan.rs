//! ByteSpan
//!
//! An owned byte region tagged with its logical offset inside a larger
//! value. Backed by [`Bytes`], so a window over a span shares the parent
//! allocation instead of copying it.

use std::fmt;
use std::ops::Deref;

use bytes::Bytes;

/// A byte region plus the offset it occupies in its logical value
#[derive(Clone, PartialEq, Eq)]
pub struct ByteSpan {
    data: Bytes,
    /// Position of `data[0]` inside the logical value
    offset: u64,
}

impl ByteSpan {
    /// Wrap bytes that start at logical offset 0
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            offset: 0,
        }
    }

    /// Wrap bytes that start at the given logical offset
    pub fn with_offset(data: impl Into<Bytes>, offset: u64) -> Self {
        Self {
            data: data.into(),
            offset,
        }
    }

    /// Copy a borrowed slice into a new span
    pub fn copy_from_slice(data: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(data))
    }

    /// Window view of `len` bytes starting `start` bytes into this span.
    ///
    /// Shares storage with `self`. The window's logical offset is
    /// `self.offset() + start`.
    ///
    /// # Panics
    /// Panics if `start + len` is beyond the end of the span.
    pub fn window(&self, start: usize, len: usize) -> ByteSpan {
        ByteSpan {
            data: self.data.slice(start..start + len),
            offset: self.offset + start as u64,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Logical offset of the first byte
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Logical offset one past the last byte
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.data.len() as u64)
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

impl Deref for ByteSpan {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl AsRef<[u8]> for ByteSpan {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl From<Vec<u8>> for ByteSpan {
    fn from(v: Vec<u8>) -> Self {
        Self::new(v)
    }
}

impl From<Bytes> for ByteSpan {
    fn from(b: Bytes) -> Self {
        Self::new(b)
    }
}

impl From<&'static [u8]> for ByteSpan {
    fn from(s: &'static [u8]) -> Self {
        Self::new(Bytes::from_static(s))
    }
}

impl From<&'static str> for ByteSpan {
    fn from(s: &'static str) -> Self {
        Self::new(Bytes::from_static(s.as_bytes()))
    }
}

impl fmt::Debug for ByteSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteSpan")
            .field("offset", &self.offset)
            .field("len", &self.data.len())
            .finish()
    }
}
