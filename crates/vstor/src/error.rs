//! Store error taxonomy.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use vstor_glob::PatternError;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the store.
///
/// Record-level errors (`InvalidContentType`, `TypeMismatch`, `NotFound`)
/// carry the path relative to the store base, the way it reads in a
/// message. Everything else carries the absolute key.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot write {}: expected bytes, text or a document but got {actual}", path.display())]
    InvalidContentType { path: PathBuf, actual: &'static str },

    #[error("cannot append {appended} to {existing} in {}", path.display())]
    TypeMismatch {
        path: PathBuf,
        existing: &'static str,
        appended: &'static str,
    },

    #[error("cannot copy from {}: source does not exist", path.display())]
    SourceNotFound { path: PathBuf },

    #[error("cannot find a common root for {path}: {reason}")]
    AmbiguousRoot { path: String, reason: &'static str },

    #[error("destination {} must be a directory when copying multiple files", path.display())]
    DestinationNotDirectory { path: PathBuf },

    #[error("{} could not be found", path.display())]
    NotFound { path: PathBuf },

    #[error("{} is neither a file or directory", path.display())]
    InvalidPathKind { path: PathBuf },

    #[error("failed to flush {}: {source}", path.display())]
    Flush {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("flush filter failed on {}: {message}", path.display())]
    Filter { path: PathBuf, message: String },

    #[error("flush did not complete: {0}")]
    FlushAborted(String),

    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] PatternError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl StoreError {
    /// The path the error is about, if it has one.
    pub fn path(&self) -> Option<PathBuf> {
        match self {
            StoreError::InvalidContentType { path, .. }
            | StoreError::TypeMismatch { path, .. }
            | StoreError::SourceNotFound { path }
            | StoreError::DestinationNotDirectory { path }
            | StoreError::NotFound { path }
            | StoreError::InvalidPathKind { path }
            | StoreError::Flush { path, .. }
            | StoreError::Filter { path, .. } => Some(path.clone()),
            StoreError::AmbiguousRoot { path, .. } => Some(PathBuf::from(path)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_path() {
        let err = StoreError::InvalidContentType {
            path: PathBuf::from("data/out.json"),
            actual: "number",
        };
        assert_eq!(
            err.to_string(),
            "cannot write data/out.json: expected bytes, text or a document but got number"
        );

        let err = StoreError::NotFound {
            path: PathBuf::from("missing.txt"),
        };
        assert_eq!(err.to_string(), "missing.txt could not be found");
        assert_eq!(err.path(), Some(PathBuf::from("missing.txt")));
    }

    #[test]
    fn flush_error_keeps_source() {
        use std::error::Error as _;

        let err = StoreError::Flush {
            path: PathBuf::from("/tmp/x"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.source().is_some());
        assert!(err.to_string().contains("/tmp/x"));
    }
}
