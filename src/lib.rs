//! # EmberKV
//!
//! An embeddable key-value store facade with:
//! - Chunked writes for values of any size
//! - Adaptive per-entry LZ4 compression within a fixed space budget
//! - Streaming CRC-32 checksums over key and persisted bytes
//! - Point-in-time snapshots and ordered iteration
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Engine                               │
//! │          get / put / put_chunk / delete / snapshot           │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │  per chunk: split → compress → checksum
//!                       │             → space bound
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │ WriteBuffer │ ──flush▶ │   Storage   │
//!   │  (RwLock)   │          │ (data files)│
//!   └─────────────┘          └──────┬──────┘
//!                                   │ seal
//!                                   ▼
//!                           ┌─────────────┐
//!                           │  Snapshot   │
//!                           │ (read-only) │
//!                           └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use emberkv::{Config, Engine, ReadOptions, WriteOptions};
//!
//! # fn main() -> emberkv::Result<()> {
//! let engine = Engine::open(Config::builder().data_dir("/tmp/emberkv").build())?;
//! engine.put(&WriteOptions::new(), b"greeting", b"hello".as_slice())?;
//! assert_eq!(&engine.get(&ReadOptions::new(), b"greeting")?[..], b"hello");
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod options;

pub mod bytespan;
pub mod chunking;
pub mod checksum;
pub mod compression;
pub mod entry;

pub mod write_buffer;
pub mod storage;
pub mod snapshot;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use bytespan::ByteSpan;
pub use compression::CompressionType;
pub use config::Config;
pub use engine::{Engine, EntrySession};
pub use error::{EmberError, Result};
pub use options::{ReadOptions, WriteOptions};
pub use snapshot::{DbIterator, Snapshot};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of EmberKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
