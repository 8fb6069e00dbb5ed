//! Error types for EmberKV
//!
//! Provides a unified error type for all operations.
//!
//! Callers only ever observe two kinds of failure: "not found"
//! ([`EmberError::KeyNotFound`]) and "I/O error" (everything else).
//! [`EmberError::is_not_found`] and [`EmberError::is_io_error`] classify
//! any variant into one of the two.

use thiserror::Error;

/// Result type alias using EmberError
pub type Result<T> = std::result::Result<T, EmberError>;

/// Unified error type for EmberKV operations
#[derive(Debug, Error)]
pub enum EmberError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("The database is not open")]
    DatabaseClosed,

    #[error("Storage unhealthy: {0}")]
    StorageUnhealthy(String),

    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    #[error("Key not found")]
    KeyNotFound,

    // -------------------------------------------------------------------------
    // Write Path Errors
    // -------------------------------------------------------------------------
    #[error("Compression error: {0}")]
    Compression(String),

    #[error(
        "Prevented write outside of the allocated space: offset {offset} + size {size} > allocated {allocated}"
    )]
    OutOfAllocatedSpace {
        offset: u64,
        size: u64,
        allocated: u64,
    },

    #[error("Invalid chunk: {0}")]
    InvalidChunk(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl EmberError {
    /// True when the error means "the key has no live value"
    pub fn is_not_found(&self) -> bool {
        matches!(self, EmberError::KeyNotFound)
    }

    /// True for every error of the I/O class (anything but not-found)
    pub fn is_io_error(&self) -> bool {
        !self.is_not_found()
    }
}

impl From<bincode::Error> for EmberError {
    fn from(e: bincode::Error) -> Self {
        EmberError::Serialization(e.to_string())
    }
}
