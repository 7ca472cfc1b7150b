//! vstor-glob: glob matching and directory walking.
//!
//! Provides:
//! - **glob_match**: shell-style component matching with brace expansion
//! - **GlobPath**: path-aware matching with `**` (globstar) support
//! - **PatternSet**: ordered pattern lists with `!` negation
//! - **FileWalker** / **expand**: synchronous walking generic over `WalkerFs`
//!
//! The walker is generic over `WalkerFs`, a minimal read-only filesystem
//! trait. Consumers implement it to adapt their own disk layer.

mod glob_path;
pub mod pattern;
mod set;
mod walker;

pub use glob_path::{GlobPath, PathSegment, PatternError};
pub use pattern::{ComponentPattern, contains_glob, expand_braces, glob_match};
pub use set::PatternSet;
pub use walker::{EntryTypes, ErrorCallback, FileWalker, WalkOptions, expand};

use std::path::Path;
use thiserror::Error;

/// Errors from filesystem operations within the walker.
#[derive(Debug, Error)]
pub enum WalkerError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("io error: {0}")]
    Io(String),
}

/// Minimal read-only filesystem abstraction for the walker.
pub trait WalkerFs {
    /// The directory entry type returned by `list_dir`.
    type DirEntry: WalkerDirEntry;

    /// List the entries in a directory.
    fn list_dir(&self, path: &Path) -> Result<Vec<Self::DirEntry>, WalkerError>;

    /// Check if a path is a directory.
    fn is_dir(&self, path: &Path) -> bool;

    /// Check if a path is a regular file.
    fn is_file(&self, path: &Path) -> bool;

    /// Check if a path exists.
    fn exists(&self, path: &Path) -> bool {
        self.is_file(path) || self.is_dir(path)
    }
}

/// A single entry returned by `WalkerFs::list_dir`.
pub trait WalkerDirEntry {
    /// The entry name (not the full path).
    fn name(&self) -> &str;

    fn is_dir(&self) -> bool;

    fn is_file(&self) -> bool;

    fn is_symlink(&self) -> bool;
}
