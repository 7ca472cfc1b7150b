//! vstor: a staged, in-memory overlay over the filesystem.
//!
//! Callers read, write, append, copy, move and remove files through a
//! [`VStor`]. Every change is staged in memory; the real filesystem only
//! changes when [`VStor::save`] runs the flush pipeline.
//!
//! # Architecture
//!
//! - **resolve**: raw paths to absolute keys, common-root computation
//! - **store**: the record map, keyed by absolute path
//! - **expand**: glob patterns against disk and the store (`vstor-glob`)
//! - **ops**: staged mutations and reads
//! - **flush**: collect, filter and persist staged records
//! - **disk**: the `DiskIo` capability, with local and in-memory backends

pub mod config;
pub mod content;
pub mod disk;
pub mod error;
pub mod events;
pub mod expand;
pub mod flush;
pub mod memory;
pub mod ops;
pub mod pending;
pub mod record;
pub mod resolve;
pub mod store;
mod vstor;

pub use config::{ExitPolicy, JsonSpacer, StoreConfig};
pub use content::{Content, LINE_SEPARATOR, Reader};
pub use disk::{DiskEntry, DiskIo, EntryKind, FileStat, LocalDisk};
pub use error::{StoreError, StoreResult};
pub use events::{EventKind, StoreEvent};
pub use expand::{GlobOptions, Globbed, Sources};
pub use flush::{FlushAction, FlushEntry, FlushFilter, FlushHandle, FlushReport, SaveOptions};
pub use memory::MemoryDisk;
pub use ops::{CopyOptions, CopyTransform};
pub use pending::PendingOps;
pub use record::{DiskFile, FileRecord, FileState, RecordHandle, StagingMeta};
pub use resolve::{PathResolver, common_root};
pub use vstor::VStor;
