//! Per-call options
//!
//! Immutable bags handed to every read or write. The facade only passes
//! them through to the write buffer and the storage manager.

/// Options for read operations
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOptions {
    /// Recompute the entry checksum on every read and fail on mismatch
    pub verify_checksums: bool,
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }
}

/// Options for write operations
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// Flush the write buffer and fsync once the write lands
    pub sync: bool,
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }
}
