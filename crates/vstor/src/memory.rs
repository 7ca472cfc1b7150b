//! In-memory disk.
//!
//! Used for testing and dry runs. Counts physical writes and removals so
//! callers can assert what a flush actually touched.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::disk::{DiskEntry, DiskIo, EntryKind, FileStat};

#[derive(Debug, Clone)]
enum Entry {
    File { data: Vec<u8>, mode: Option<u32> },
    Directory,
}

/// Thread-safe in-memory `DiskIo`. Paths must be absolute.
#[derive(Debug)]
pub struct MemoryDisk {
    entries: RwLock<BTreeMap<PathBuf, Entry>>,
    writes: AtomicUsize,
    removes: AtomicUsize,
}

impl Default for MemoryDisk {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDisk {
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(PathBuf::from("/"), Entry::Directory);
        Self {
            entries: RwLock::new(entries),
            writes: AtomicUsize::new(0),
            removes: AtomicUsize::new(0),
        }
    }

    /// Seed a file, creating its parents. Not counted as a write.
    pub fn with_file(self, path: impl AsRef<Path>, data: impl Into<Vec<u8>>) -> Self {
        let path = path.as_ref();
        {
            let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
            for dir in path.ancestors().skip(1) {
                entries.entry(dir.to_path_buf()).or_insert(Entry::Directory);
            }
            entries.insert(
                path.to_path_buf(),
                Entry::File {
                    data: data.into(),
                    mode: None,
                },
            );
        }
        self
    }

    /// Contents of a file, if it exists.
    pub fn file(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        match entries.get(path.as_ref()) {
            Some(Entry::File { data, .. }) => Some(data.clone()),
            _ => None,
        }
    }

    /// Every file path, sorted.
    pub fn files(&self) -> Vec<PathBuf> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .iter()
            .filter(|(_, e)| matches!(e, Entry::File { .. }))
            .map(|(p, _)| p.clone())
            .collect()
    }

    /// Number of `write_file` calls that succeeded.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of `remove_all` calls that removed something.
    pub fn removes(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }

    fn not_found(path: &Path) -> io::Error {
        io::Error::new(io::ErrorKind::NotFound, format!("{}: not found", path.display()))
    }

    fn not_a_directory(path: &Path) -> io::Error {
        io::Error::new(
            io::ErrorKind::NotADirectory,
            format!("{}: not a directory", path.display()),
        )
    }
}

#[async_trait]
impl DiskIo for MemoryDisk {
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| io::Error::other("lock poisoned"))?;
        match entries.get(path) {
            Some(Entry::File { data, .. }) => Ok(data.clone()),
            Some(Entry::Directory) => Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("{}: is a directory", path.display()),
            )),
            None => Err(Self::not_found(path)),
        }
    }

    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        let entries = self
            .entries
            .read()
            .map_err(|_| io::Error::other("lock poisoned"))?;
        match entries.get(path) {
            Some(Entry::File { data, mode }) => Ok(FileStat {
                kind: EntryKind::File,
                mode: *mode,
                size: data.len() as u64,
            }),
            Some(Entry::Directory) => Ok(FileStat {
                kind: EntryKind::Directory,
                mode: None,
                size: 0,
            }),
            None => Err(Self::not_found(path)),
        }
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<DiskEntry>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| io::Error::other("lock poisoned"))?;
        match entries.get(path) {
            Some(Entry::Directory) => {}
            Some(Entry::File { .. }) => return Err(Self::not_a_directory(path)),
            None => return Err(Self::not_found(path)),
        }
        Ok(entries
            .iter()
            .filter(|(p, _)| p.parent() == Some(path))
            .filter_map(|(p, e)| {
                let name = p.file_name()?.to_string_lossy().into_owned();
                let kind = match e {
                    Entry::File { .. } => EntryKind::File,
                    Entry::Directory => EntryKind::Directory,
                };
                Some(DiskEntry {
                    name,
                    kind,
                    is_symlink: false,
                })
            })
            .collect())
    }

    async fn write_file(&self, path: &Path, data: &[u8], mode: Option<u32>) -> io::Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| io::Error::other("lock poisoned"))?;
        let parent = path.parent().ok_or_else(|| Self::not_found(path))?;
        match entries.get(parent) {
            Some(Entry::Directory) => {}
            Some(Entry::File { .. }) => return Err(Self::not_a_directory(parent)),
            None => return Err(Self::not_found(parent)),
        }
        if let Some(Entry::Directory) = entries.get(path) {
            return Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("{}: is a directory", path.display()),
            ));
        }
        entries.insert(
            path.to_path_buf(),
            Entry::File {
                data: data.to_vec(),
                mode,
            },
        );
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| io::Error::other("lock poisoned"))?;
        let mut missing = Vec::new();
        for dir in path.ancestors() {
            match entries.get(dir) {
                Some(Entry::Directory) => break,
                Some(Entry::File { .. }) => return Err(Self::not_a_directory(dir)),
                None => missing.push(dir.to_path_buf()),
            }
        }
        for dir in missing {
            entries.insert(dir, Entry::Directory);
        }
        Ok(())
    }

    async fn remove_all(&self, path: &Path) -> io::Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| io::Error::other("lock poisoned"))?;
        let before = entries.len();
        entries.retain(|p, _| !p.starts_with(path));
        if entries.len() != before {
            self.removes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
