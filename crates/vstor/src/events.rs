//! Change notifications.

use std::path::PathBuf;

use crate::record::RecordHandle;

/// Broadcast buffer. Slow subscribers see `RecvError::Lagged`.
pub(crate) const EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A record was staged through `write`.
    Changed,
    /// A file was copied; the record is the destination.
    Copied,
    /// A move finished; the record is the destination.
    Moved,
    /// Content was appended.
    Appended,
    /// A record was staged for deletion.
    Removed,
}

#[derive(Debug, Clone)]
pub struct StoreEvent {
    pub kind: EventKind,
    pub path: PathBuf,
    pub record: RecordHandle,
}

impl StoreEvent {
    pub(crate) fn new(kind: EventKind, record: &RecordHandle) -> Self {
        Self {
            kind,
            path: record.path().to_path_buf(),
            record: record.clone(),
        }
    }
}
