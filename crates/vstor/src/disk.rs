//! Disk capability.
//!
//! Record loads, stats and directory listings are synchronous so that
//! mutation operations stay synchronous. Writes and deletes happen only in
//! the flush pipeline and are async.

use async_trait::async_trait;
use std::fmt;
use std::io;
use std::path::Path;

use vstor_glob::{WalkerDirEntry, WalkerError, WalkerFs};

/// Kind of a filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    /// Sockets, devices, fifos.
    Other,
}

/// Metadata captured for a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub kind: EntryKind,
    /// Unix permission bits, when the platform has them.
    pub mode: Option<u32>,
    /// Size in bytes (0 for directories).
    pub size: u64,
}

impl FileStat {
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// A directory entry returned by `list_dir`.
#[derive(Debug, Clone)]
pub struct DiskEntry {
    /// Name of the entry (not full path).
    pub name: String,
    pub kind: EntryKind,
    pub is_symlink: bool,
}

/// Access to the real filesystem.
///
/// All paths are absolute keys produced by the store's resolver.
#[async_trait]
pub trait DiskIo: Send + Sync + fmt::Debug {
    /// Read the entire contents of a file.
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Metadata for a file or directory, following symlinks.
    fn stat(&self, path: &Path) -> io::Result<FileStat>;

    /// List entries in a directory.
    fn list_dir(&self, path: &Path) -> io::Result<Vec<DiskEntry>>;

    /// Write data to a file, creating or truncating it. `mode` sets the
    /// permission bits where supported.
    async fn write_file(&self, path: &Path, data: &[u8], mode: Option<u32>) -> io::Result<()>;

    /// Create a directory and any missing parents.
    async fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Remove a file or a whole directory tree. A missing path is not an
    /// error.
    async fn remove_all(&self, path: &Path) -> io::Result<()>;
}

/// The real local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalDisk;

fn entry_kind(file_type: std::fs::FileType) -> EntryKind {
    if file_type.is_dir() {
        EntryKind::Directory
    } else if file_type.is_file() {
        EntryKind::File
    } else {
        EntryKind::Other
    }
}

#[cfg(unix)]
fn permission_bits(meta: &std::fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(meta.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn permission_bits(_meta: &std::fs::Metadata) -> Option<u32> {
    None
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

#[async_trait]
impl DiskIo for LocalDisk {
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        let meta = std::fs::metadata(path)?;
        Ok(FileStat {
            kind: entry_kind(meta.file_type()),
            mode: permission_bits(&meta),
            size: if meta.is_dir() { 0 } else { meta.len() },
        })
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<DiskEntry>> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let is_symlink = file_type.is_symlink();
            // Report what the link points at; the walker won't descend it
            let kind = if is_symlink {
                std::fs::metadata(entry.path())
                    .map(|m| entry_kind(m.file_type()))
                    .unwrap_or(EntryKind::Other)
            } else {
                entry_kind(file_type)
            };
            entries.push(DiskEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
                is_symlink,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn write_file(&self, path: &Path, data: &[u8], mode: Option<u32>) -> io::Result<()> {
        tokio::fs::write(path, data).await?;
        if let Some(mode) = mode {
            set_mode(path, mode).await?;
        }
        Ok(())
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }

    async fn remove_all(&self, path: &Path) -> io::Result<()> {
        let meta = match tokio::fs::symlink_metadata(path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        let result = if meta.is_dir() {
            tokio::fs::remove_dir_all(path).await
        } else {
            tokio::fs::remove_file(path).await
        };
        match result {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

/// Adapts a `DiskIo` to the glob walker's `WalkerFs` trait.
pub(crate) struct DiskWalker<'a>(pub &'a dyn DiskIo);

impl WalkerDirEntry for DiskEntry {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    fn is_symlink(&self) -> bool {
        self.is_symlink
    }
}

fn walker_error(path: &Path, err: io::Error) -> WalkerError {
    let msg = format!("{}: {}", path.display(), err);
    match err.kind() {
        io::ErrorKind::NotFound => WalkerError::NotFound(msg),
        io::ErrorKind::PermissionDenied => WalkerError::PermissionDenied(msg),
        _ => WalkerError::Io(msg),
    }
}

impl WalkerFs for DiskWalker<'_> {
    type DirEntry = DiskEntry;

    fn list_dir(&self, path: &Path) -> Result<Vec<DiskEntry>, WalkerError> {
        self.0.list_dir(path).map_err(|e| walker_error(path, e))
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.0.stat(path).is_ok_and(|s| s.is_dir())
    }

    fn is_file(&self, path: &Path) -> bool {
        self.0.stat(path).is_ok_and(|s| s.is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_dir() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        env::temp_dir().join(format!("vstor-disk-{}-{}", std::process::id(), id))
    }

    async fn setup() -> PathBuf {
        let dir = temp_dir();
        let _ = tokio::fs::remove_dir_all(&dir).await;
        tokio::fs::create_dir_all(&dir).await.unwrap();
        dir
    }

    async fn cleanup(dir: &Path) {
        let _ = tokio::fs::remove_dir_all(dir).await;
    }

    #[tokio::test]
    async fn write_then_read_and_stat() {
        let dir = setup().await;
        let disk = LocalDisk;
        let file = dir.join("a.txt");

        disk.write_file(&file, b"hello", None).await.unwrap();
        assert_eq!(disk.read_file(&file).unwrap(), b"hello");

        let stat = disk.stat(&file).unwrap();
        assert!(stat.is_file());
        assert_eq!(stat.size, 5);
        assert!(disk.stat(&dir).unwrap().is_dir());

        cleanup(&dir).await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn write_applies_mode() {
        let dir = setup().await;
        let disk = LocalDisk;
        let file = dir.join("run.sh");

        disk.write_file(&file, b"#!/bin/sh\n", Some(0o755)).await.unwrap();
        assert_eq!(disk.stat(&file).unwrap().mode, Some(0o755));

        cleanup(&dir).await;
    }

    #[tokio::test]
    async fn list_dir_is_sorted() {
        let dir = setup().await;
        let disk = LocalDisk;
        disk.write_file(&dir.join("b.txt"), b"", None).await.unwrap();
        disk.write_file(&dir.join("a.txt"), b"", None).await.unwrap();
        disk.create_dir_all(&dir.join("sub")).await.unwrap();

        let entries = disk.list_dir(&dir).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "sub"]);
        assert_eq!(entries[2].kind, EntryKind::Directory);

        cleanup(&dir).await;
    }

    #[tokio::test]
    async fn remove_all_handles_trees_and_missing_paths() {
        let dir = setup().await;
        let disk = LocalDisk;
        let nested = dir.join("tree/deep");
        disk.create_dir_all(&nested).await.unwrap();
        disk.write_file(&nested.join("f.txt"), b"x", None).await.unwrap();

        disk.remove_all(&dir.join("tree")).await.unwrap();
        assert!(disk.stat(&dir.join("tree")).is_err());

        disk.remove_all(&dir.join("never-existed")).await.unwrap();

        cleanup(&dir).await;
    }

    #[tokio::test]
    async fn walker_adapter_reports_kinds() {
        let dir = setup().await;
        let disk = LocalDisk;
        disk.write_file(&dir.join("f.txt"), b"x", None).await.unwrap();

        let walker = DiskWalker(&disk);
        assert!(walker.is_dir(&dir));
        assert!(walker.is_file(&dir.join("f.txt")));
        assert!(!walker.exists(&dir.join("nope")));
        assert!(matches!(
            walker.list_dir(&dir.join("nope")),
            Err(WalkerError::NotFound(_))
        ));

        cleanup(&dir).await;
    }
}
