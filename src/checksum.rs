//! Checksum streaming
//!
//! CRC32 over the key followed by every persisted chunk of an entry, in
//! chunk order. The bytes folded in are the ones actually written, so a
//! compressed entry is checksummed over its frames, not its plaintext.

use crc32fast::Hasher;

/// Running checksum for one entry
#[derive(Debug, Clone)]
pub struct ChecksumSession {
    hasher: Hasher,
}

impl ChecksumSession {
    /// Start a session; the key is folded in once, here.
    pub fn new(key: &[u8]) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(key);
        Self { hasher }
    }

    /// Fold in the persisted bytes of the next chunk
    pub fn stream(&mut self, persisted: &[u8]) {
        self.hasher.update(persisted);
    }

    /// Checksum of everything streamed so far
    pub fn current(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    pub fn finalize(self) -> u32 {
        self.hasher.finalize()
    }
}

/// One-shot checksum of a whole persisted entry
pub fn entry_checksum(key: &[u8], persisted: &[u8]) -> u32 {
    let mut session = ChecksumSession::new(key);
    session.stream(persisted);
    session.finalize()
}
