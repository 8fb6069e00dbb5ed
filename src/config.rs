//! Configuration for EmberKV
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::compression::{CompressionType, MAX_FRAME_PAYLOAD};
use crate::error::{EmberError, Result};

/// Main configuration for an EmberKV instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── 00000001.ekv
    ///     ├── 00000002.ekv
    ///     └── ...
    pub data_dir: PathBuf,

    /// Size at which the active data file is sealed and a new one opened
    pub max_file_size: u64,

    /// Validate record CRCs while rebuilding the index on open
    pub verify_checksums_on_open: bool,

    // -------------------------------------------------------------------------
    // Write Path Configuration
    // -------------------------------------------------------------------------
    /// Largest chunk handed to the per-chunk write path; bigger values are split
    pub max_chunk_size: u64,

    /// Codec applied to value chunks
    pub compression: CompressionType,

    // -------------------------------------------------------------------------
    // Write Buffer Configuration
    // -------------------------------------------------------------------------
    /// Max size of the write buffer before it is flushed (in bytes)
    pub write_buffer_size_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./emberkv_data"),
            max_file_size: 32 * 1024 * 1024, // 32 MB
            verify_checksums_on_open: true,
            max_chunk_size: 1024 * 1024, // 1 MB
            compression: CompressionType::Lz4,
            write_buffer_size_limit: 64 * 1024 * 1024, // 64 MB
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings the engine cannot operate with
    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_size == 0 {
            return Err(EmberError::Config(
                "max_chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.max_chunk_size > MAX_FRAME_PAYLOAD {
            return Err(EmberError::Config(format!(
                "max_chunk_size must not exceed {} bytes",
                MAX_FRAME_PAYLOAD
            )));
        }
        if self.max_file_size == 0 {
            return Err(EmberError::Config(
                "max_file_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the data file rotation size (in bytes)
    pub fn max_file_size(mut self, size: u64) -> Self {
        self.config.max_file_size = size;
        self
    }

    /// Enable or disable CRC validation during recovery
    pub fn verify_checksums_on_open(mut self, verify: bool) -> Self {
        self.config.verify_checksums_on_open = verify;
        self
    }

    /// Set the maximum chunk size (in bytes)
    pub fn max_chunk_size(mut self, size: u64) -> Self {
        self.config.max_chunk_size = size;
        self
    }

    /// Set the compression codec
    pub fn compression(mut self, compression: CompressionType) -> Self {
        self.config.compression = compression;
        self
    }

    /// Set the write buffer size limit (in bytes)
    pub fn write_buffer_size_limit(mut self, size: usize) -> Self {
        self.config.write_buffer_size_limit = size;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
