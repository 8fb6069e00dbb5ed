//! Storage Module
//!
//! Persistent storage layer: append-only data files plus an in-memory
//! key index.
//!
//! ## Responsibilities
//! - Persist batches flushed from the write buffer
//! - Point lookups through the key index
//! - Rebuild the index from data files on startup
//! - Seal files and report boundaries for snapshots
//! - Read-only secondary handles scoped to a boundary
//!
//! Compaction and file deletion are not performed; a sealed file stays
//! readable for as long as any snapshot might reference it.
//!
//! ## Layout
//! ```text
//! {data_dir}/
//!   ├── 00000001.ekv   sealed
//!   ├── 00000002.ekv   sealed   ◀── snapshot boundary
//!   └── 00000003.ekv   active
//! ```

mod datafile;
mod index;
mod manager;
mod readonly;

pub use datafile::{
    data_file_path, parse_file_id, DataFileReader, DataFileScanner, DataFileWriter, FileId,
    Record, RecordLocation,
};
pub use index::{KeyIndex, RecoveryStats};
pub use manager::{SnapshotData, SnapshotId, StorageManager};
pub use readonly::ReadOnlyStorage;
