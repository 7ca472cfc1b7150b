//! In-memory record store, keyed by absolute path.
//!
//! Iteration follows insertion order. Loading from disk lives on `VStor`
//! so that no lock is held across I/O.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::record::RecordHandle;

#[derive(Debug, Default)]
pub struct RecordStore {
    order: Vec<PathBuf>,
    records: HashMap<PathBuf, RecordHandle>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &Path) -> Option<RecordHandle> {
        self.records.get(path).cloned()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.records.contains_key(path)
    }

    /// Insert a record unless one is already stored under its path.
    /// Returns the stored record, which keeps the first instance.
    pub fn insert(&mut self, handle: RecordHandle) -> RecordHandle {
        if let Some(existing) = self.records.get(handle.path()) {
            return existing.clone();
        }
        self.order.push(handle.path().to_path_buf());
        self.records.insert(handle.path().to_path_buf(), handle.clone());
        handle
    }

    /// Store a record, replacing any other instance under its path. A
    /// replaced record keeps its position in iteration order.
    pub fn put(&mut self, handle: RecordHandle) {
        let path = handle.path().to_path_buf();
        if self.records.insert(path.clone(), handle).is_none() {
            self.order.push(path);
        }
    }

    /// Visit every record in insertion order.
    pub fn each(&self, mut visit: impl FnMut(&RecordHandle)) {
        for path in &self.order {
            if let Some(handle) = self.records.get(path) {
                visit(handle);
            }
        }
    }

    /// All records, in insertion order.
    pub fn handles(&self) -> Vec<RecordHandle> {
        let mut handles = Vec::with_capacity(self.records.len());
        self.each(|h| handles.push(h.clone()));
        handles
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
