//! File records and their staging state.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::disk::FileStat;

/// Staging state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileState {
    /// Matches what was last loaded or flushed.
    #[default]
    Unmodified,
    /// Has staged contents awaiting flush.
    Modified,
    /// Staged for deletion.
    Deleted,
}

/// A file as the store sees it: absolute path, the roots it was resolved
/// against, and its current contents.
#[derive(Debug, Clone)]
pub struct DiskFile {
    pub path: PathBuf,
    pub base: PathBuf,
    pub cwd: PathBuf,
    /// `None` means empty: not on disk, unreadable, a directory, or deleted.
    pub contents: Option<Vec<u8>>,
    pub stat: Option<FileStat>,
    /// Contents were loaded from, or last flushed to, disk.
    pub persisted: bool,
}

impl DiskFile {
    /// An empty file at `path`.
    pub fn empty(path: impl Into<PathBuf>, base: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            base: base.into(),
            cwd: cwd.into(),
            contents: None,
            stat: None,
            persisted: false,
        }
    }

    /// Path relative to the base, or the absolute path when outside it.
    pub fn relative(&self) -> PathBuf {
        self.path
            .strip_prefix(&self.base)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| self.path.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_none()
    }
}

/// Staging metadata attached to a record.
#[derive(Debug, Clone, Default)]
pub struct StagingMeta {
    pub state: FileState,
    /// The record had no disk-backed content when it was last staged for
    /// write. Deleting such a record never touches disk.
    pub is_new: bool,
    revision: u64,
    in_flight: Option<u64>,
}

impl StagingMeta {
    /// Bumped on every staged change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Revision currently claimed by a running flush.
    pub fn in_flight(&self) -> Option<u64> {
        self.in_flight
    }

    /// Whether a flush should pick this record up.
    pub fn needs_flush(&self) -> bool {
        match self.state {
            FileState::Modified => true,
            FileState::Deleted => !self.is_new,
            FileState::Unmodified => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileRecord {
    pub file: DiskFile,
    pub staging: StagingMeta,
}

impl FileRecord {
    pub fn new(file: DiskFile) -> Self {
        Self {
            file,
            staging: StagingMeta::default(),
        }
    }

    /// Live records are visible to reads, `exists` and expansion.
    pub fn is_live(&self) -> bool {
        self.staging.state != FileState::Deleted && self.file.contents.is_some()
    }

    pub fn is_deleted(&self) -> bool {
        self.staging.state == FileState::Deleted
    }

    /// Stage new contents.
    pub fn stage_write(&mut self, contents: Vec<u8>, stat: Option<FileStat>) {
        self.staging.is_new = !self.file.persisted;
        self.staging.state = FileState::Modified;
        self.staging.revision += 1;
        self.file.contents = Some(contents);
        if stat.is_some() {
            self.file.stat = stat;
        }
    }

    /// Stage a deletion. `is_new` is kept so unflushed files vanish without
    /// a disk delete.
    pub fn stage_delete(&mut self) {
        self.staging.state = FileState::Deleted;
        self.staging.revision += 1;
        self.file.contents = None;
    }

    /// Claim the current revision for a flush. Returns it, or `None` when
    /// there is nothing to flush or the revision is already claimed.
    pub(crate) fn claim(&mut self) -> Option<u64> {
        if !self.staging.needs_flush() || self.staging.in_flight == Some(self.staging.revision) {
            return None;
        }
        self.staging.in_flight = Some(self.staging.revision);
        Some(self.staging.revision)
    }

    /// Drop a claim if it is still the active one.
    pub(crate) fn release(&mut self, revision: u64) {
        if self.staging.in_flight == Some(revision) {
            self.staging.in_flight = None;
        }
    }

    /// Record a successful write of `revision`. Newer staged changes stay
    /// pending.
    pub(crate) fn settle_written(&mut self, revision: u64, written: Vec<u8>) {
        if self.staging.revision == revision {
            self.staging.state = FileState::Unmodified;
            self.staging.is_new = false;
            self.file.contents = Some(written);
            self.file.persisted = true;
        }
        self.release(revision);
    }

    /// Record a successful delete of `revision`.
    pub(crate) fn settle_removed(&mut self, revision: u64) {
        if self.staging.revision == revision {
            self.staging.state = FileState::Unmodified;
            self.staging.is_new = false;
            self.file.persisted = false;
            self.file.stat = None;
        }
        self.release(revision);
    }
}

/// Shared handle to a record. Clones refer to the same record.
#[derive(Clone)]
pub struct RecordHandle {
    path: PathBuf,
    inner: Arc<RwLock<FileRecord>>,
}

impl RecordHandle {
    pub fn new(record: FileRecord) -> Self {
        Self {
            path: record.file.path.clone(),
            inner: Arc::new(RwLock::new(record)),
        }
    }

    /// The record's absolute key. Never changes.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> RwLockReadGuard<'_, FileRecord> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, FileRecord> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// A detached copy of the record's current state.
    pub fn snapshot(&self) -> FileRecord {
        self.read().clone()
    }

    pub fn contents(&self) -> Option<Vec<u8>> {
        self.read().file.contents.clone()
    }

    pub fn state(&self) -> FileState {
        self.read().staging.state
    }

    /// Whether both handles refer to the same record.
    pub fn same_record(&self, other: &RecordHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for RecordHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let record = self.read();
        f.debug_struct("RecordHandle")
            .field("path", &self.path)
            .field("state", &record.staging.state)
            .field("len", &record.file.contents.as_ref().map(Vec::len))
            .finish()
    }
}
