//! Staged mutations and reads.
//!
//! Every operation here changes records in memory only. Directory
//! destinations of tree copies are virtual until flush creates them.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;

use crate::content::{Content, LINE_SEPARATOR, Reader, decode, json_kind};
use crate::disk::FileStat;
use crate::error::{StoreError, StoreResult};
use crate::events::EventKind;
use crate::expand::{GlobOptions, Sources};
use crate::record::RecordHandle;
use crate::resolve::key_string;
use crate::vstor::VStor;

/// Rewrites copied bytes. Receives the contents and the source path.
pub type CopyTransform = Arc<dyn Fn(Vec<u8>, &Path) -> Vec<u8> + Send + Sync>;

#[derive(Clone, Default)]
pub struct CopyOptions {
    pub glob: GlobOptions,
    pub transform: Option<CopyTransform>,
}

impl CopyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_glob(mut self, glob: GlobOptions) -> Self {
        self.glob = glob;
        self
    }

    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(Vec<u8>, &Path) -> Vec<u8> + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }
}

impl fmt::Debug for CopyOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CopyOptions")
            .field("glob", &self.glob)
            .field("transform", &self.transform.as_ref().map(|_| "..."))
            .finish()
    }
}

fn describe(sources: &Sources) -> PathBuf {
    PathBuf::from(sources.iter().collect::<Vec<_>>().join(", "))
}

impl VStor {
    /// Stage contents for `path`. Emits `Changed`.
    pub fn write(&self, path: impl AsRef<Path>, content: impl Into<Content>) -> StoreResult<RecordHandle> {
        self.write_with_stat(path, content, None)
    }

    /// Stage contents along with metadata to apply at flush, such as a
    /// source file's permission bits.
    pub fn write_with_stat(
        &self,
        path: impl AsRef<Path>,
        content: impl Into<Content>,
        stat: Option<FileStat>,
    ) -> StoreResult<RecordHandle> {
        let handle = self.get(path);
        let relative = handle.read().file.relative();
        let bytes = content
            .into()
            .into_bytes(&relative, &self.inner.config.json_spacer)?;

        tracing::debug!(path = %handle.path().display(), len = bytes.len(), "staged write");
        handle.write().stage_write(bytes, stat);
        self.put(&handle);
        Ok(handle)
    }

    /// Append to an existing file, trimming its trailing whitespace first.
    ///
    /// Two documents are shallow-merged, new keys winning. Two texts are
    /// joined with the platform line separator. Mixing a document with
    /// text is a `TypeMismatch`. Emits `Changed` then `Appended`.
    pub fn append(&self, path: impl AsRef<Path>, content: impl Into<Content>) -> StoreResult<RecordHandle> {
        self.append_with(path, content, true)
    }

    pub fn append_with(
        &self,
        path: impl AsRef<Path>,
        content: impl Into<Content>,
        trim: bool,
    ) -> StoreResult<RecordHandle> {
        let key = self.resolve_key(path);
        let reader = self.read(&key)?;
        let relative = reader.to_record().read().file.relative();
        let existing = reader.to_text()?;
        let content = content.into();

        let existing_doc = match decode(existing.as_bytes()) {
            Value::Object(map) => Some(map),
            _ => None,
        };
        let appended_doc = match &content {
            Content::Json(Value::Object(map)) => Some(map.clone()),
            _ => None,
        };

        let merged = match (existing_doc, appended_doc) {
            (Some(mut doc), Some(extra)) => {
                for (k, v) in extra {
                    doc.insert(k, v);
                }
                Content::Json(Value::Object(doc))
            }
            (Some(_), None) => {
                return Err(StoreError::TypeMismatch {
                    path: relative,
                    existing: "document",
                    appended: "text",
                });
            }
            (None, Some(_)) => {
                return Err(StoreError::TypeMismatch {
                    path: relative,
                    existing: "text",
                    appended: "document",
                });
            }
            (None, None) => {
                let addition = match content {
                    Content::Bytes(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                    Content::Text(text) | Content::Json(Value::String(text)) => text,
                    Content::Json(other) => {
                        return Err(StoreError::InvalidContentType {
                            path: relative,
                            actual: json_kind(&other),
                        });
                    }
                };
                let mut text = existing;
                if trim {
                    text.truncate(text.trim_end().len());
                }
                text.push_str(LINE_SEPARATOR);
                text.push_str(&addition);
                Content::Text(text)
            }
        };

        let handle = self.write(&key, merged)?;
        self.emit(EventKind::Appended, &handle);
        Ok(handle)
    }

    /// Read a file. Fails with `NotFound` when it is empty or staged for
    /// deletion.
    pub fn read(&self, path: impl AsRef<Path>) -> StoreResult<Reader> {
        let handle = self.get(path);
        {
            let record = handle.read();
            if record.is_deleted() || record.file.is_empty() {
                return Err(StoreError::NotFound {
                    path: record.file.relative(),
                });
            }
        }
        Ok(Reader::new(handle, None, self.inner.config.json_spacer.clone()))
    }

    /// Read a file, falling back to `default` when it is empty or deleted.
    pub fn read_or(&self, path: impl AsRef<Path>, default: impl Into<Content>) -> Reader {
        Reader::new(
            self.get(path),
            Some(default.into()),
            self.inner.config.json_spacer.clone(),
        )
    }

    /// Whether `path` exists: false once staged for deletion, true with
    /// staged contents, otherwise whatever disk says.
    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        let handle = self.get(path);
        self.record_exists(&handle)
    }

    pub fn is_empty(&self, path: impl AsRef<Path>) -> bool {
        self.get(path).read().file.is_empty()
    }

    pub(crate) fn record_exists(&self, handle: &RecordHandle) -> bool {
        let record = handle.read();
        if record.is_deleted() {
            return false;
        }
        record.file.contents.is_some() || self.disk().stat(handle.path()).is_ok()
    }

    /// Copy files, staging each destination. Emits `Copied` per file.
    ///
    /// A single existing file copies straight to `to`. Anything else (a
    /// directory, a glob, a list, a path that does not exist as a file)
    /// copies every matched file into `to`, keeping paths relative to the
    /// inputs' common root.
    pub fn copy(&self, from: impl Into<Sources>, to: impl AsRef<Path>) -> StoreResult<()> {
        self.copy_with(from, to, &CopyOptions::default())
    }

    pub fn copy_with(
        &self,
        from: impl Into<Sources>,
        to: impl AsRef<Path>,
        options: &CopyOptions,
    ) -> StoreResult<()> {
        self.copy_sources(from.into(), &self.resolve_key(to), options)?;
        Ok(())
    }

    /// Copy and return the last record written.
    fn copy_sources(
        &self,
        sources: Sources,
        to_key: &Path,
        options: &CopyOptions,
    ) -> StoreResult<RecordHandle> {
        let globbed = self.globify(sources.clone())?;
        let transform = options.transform.as_ref();

        if let Some(literal) = globbed.literal() {
            let from_key = PathBuf::from(literal);
            if self.exists(&from_key) {
                return self.copy_file(&from_key, to_key, transform);
            }
        }

        // Directories are never copied as files
        let glob = GlobOptions {
            nodir: true,
            ..options.glob
        };
        let files = self.expand(&globbed, glob)?;
        if files.is_empty() {
            return Err(StoreError::SourceNotFound {
                path: describe(&sources),
            });
        }

        let root = PathBuf::from(self.source_root(&sources)?);
        self.ensure_directory_target(to_key)?;
        tracing::debug!(
            root = %root.display(),
            to = %to_key.display(),
            files = files.len(),
            "copying tree"
        );

        let mut last = None;
        for file in files {
            let relative = file.strip_prefix(&root).map_err(|_| StoreError::AmbiguousRoot {
                path: key_string(&file),
                reason: "outside the common root",
            })?;
            last = Some(self.copy_file(&file, &to_key.join(relative), transform)?);
        }
        last.ok_or_else(|| StoreError::SourceNotFound {
            path: describe(&sources),
        })
    }

    /// Move files: copy, then remove the sources. Directories matched by
    /// the sources are removed along with their files. Emits `Moved` once.
    pub fn move_to(&self, from: impl Into<Sources>, to: impl AsRef<Path>) -> StoreResult<()> {
        self.move_with(from, to, GlobOptions::with_dirs())
    }

    pub fn move_with(
        &self,
        from: impl Into<Sources>,
        to: impl AsRef<Path>,
        options: GlobOptions,
    ) -> StoreResult<()> {
        let sources = from.into();
        let to_key = self.resolve_key(to);

        let copied = self.copy_sources(
            sources.clone(),
            &to_key,
            &CopyOptions::new().with_glob(options),
        )?;
        self.remove_with(sources, options)?;

        // A tree destination has no record of its own
        let moved = self.store_read().get(&to_key).unwrap_or(copied);
        self.emit(EventKind::Moved, &moved);
        Ok(())
    }

    /// Same as [`VStor::move_to`].
    pub fn rename(&self, from: impl Into<Sources>, to: impl AsRef<Path>) -> StoreResult<()> {
        self.move_to(from, to)
    }

    /// Stage every match for deletion, directories included. Emits
    /// `Removed` per path.
    pub fn remove(&self, paths: impl Into<Sources>) -> StoreResult<()> {
        self.remove_with(paths, GlobOptions::with_dirs())
    }

    pub fn remove_with(&self, paths: impl Into<Sources>, options: GlobOptions) -> StoreResult<()> {
        let globbed = self.globify(paths)?;
        let matches = self.expand(&globbed, options)?;
        tracing::debug!(patterns = ?globbed.patterns(), matches = matches.len(), "staging removal");

        for path in matches {
            let handle = self.get(&path);
            handle.write().stage_delete();
            self.emit(EventKind::Removed, &handle);
        }
        Ok(())
    }

    fn copy_file(
        &self,
        from: &Path,
        to: &Path,
        transform: Option<&CopyTransform>,
    ) -> StoreResult<RecordHandle> {
        let source = self.get(from);
        let (contents, stat) = {
            let record = source.read();
            match (&record.file.contents, record.is_deleted()) {
                (Some(contents), false) => (contents.clone(), record.file.stat.clone()),
                _ => {
                    return Err(StoreError::SourceNotFound {
                        path: from.to_path_buf(),
                    });
                }
            }
        };
        let contents = match transform {
            Some(transform) => transform(contents, from),
            None => contents,
        };

        tracing::trace!(from = %from.display(), to = %to.display(), "copy");
        let copied = self.write_with_stat(to, Content::Bytes(contents), stat)?;
        self.emit(EventKind::Copied, &copied);
        Ok(copied)
    }

    /// Tree copies need a directory destination. One that does not exist
    /// yet stays virtual, unless its name looks like a file.
    fn ensure_directory_target(&self, to: &Path) -> StoreResult<()> {
        let not_dir = || StoreError::DestinationNotDirectory {
            path: to.to_path_buf(),
        };
        if self.get_live(to) {
            return Err(not_dir());
        }
        match self.disk().stat(to) {
            Ok(stat) if stat.is_dir() => Ok(()),
            Ok(_) => Err(not_dir()),
            Err(_) => {
                let looks_like_file = to
                    .file_name()
                    .is_some_and(|name| name.to_string_lossy().contains('.'));
                if looks_like_file { Err(not_dir()) } else { Ok(()) }
            }
        }
    }
}
