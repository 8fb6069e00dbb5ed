//! Chunk splitting
//!
//! Breaks an oversized value into consecutive windows of at most
//! `max_chunk_size` bytes. Windows share the source allocation; the
//! iterator owns the source, so no window can outlive it.

use crate::bytespan::ByteSpan;

/// Split `value` into windows of `max_chunk_size` bytes.
///
/// The last window holds the remainder (or a full window when the size
/// divides evenly). A value that already fits yields itself unchanged,
/// including the empty value, which yields one empty window.
pub fn split_windows(value: ByteSpan, max_chunk_size: u64) -> ChunkWindows {
    let max_chunk_size = usize::try_from(max_chunk_size.max(1)).unwrap_or(usize::MAX);
    ChunkWindows {
        source: Some(value),
        max_chunk_size,
        position: 0,
    }
}

/// Iterator over the windows of one value, in increasing offset order
pub struct ChunkWindows {
    source: Option<ByteSpan>,
    max_chunk_size: usize,
    /// Bytes of `source` already handed out
    position: usize,
}

impl Iterator for ChunkWindows {
    type Item = ByteSpan;

    fn next(&mut self) -> Option<ByteSpan> {
        let source = self.source.as_ref()?;
        let remaining = source.len() - self.position;

        if remaining <= self.max_chunk_size {
            // Final window: hand over the source itself when nothing was split off
            let source = self.source.take()?;
            if self.position == 0 {
                return Some(source);
            }
            return Some(source.window(self.position, remaining));
        }

        let window = source.window(self.position, self.max_chunk_size);
        self.position += self.max_chunk_size;
        Some(window)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = match &self.source {
            None => 0,
            Some(source) => {
                let remaining = source.len() - self.position;
                remaining.div_ceil(self.max_chunk_size).max(1)
            }
        };
        (n, Some(n))
    }
}

impl ExactSizeIterator for ChunkWindows {}
