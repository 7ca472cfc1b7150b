//! The store handle.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::broadcast;

use crate::config::{ExitPolicy, StoreConfig};
use crate::content::Content;
use crate::disk::{DiskIo, LocalDisk};
use crate::error::StoreResult;
use crate::events::{EVENT_CAPACITY, EventKind, StoreEvent};
use crate::pending::PendingOps;
use crate::record::{DiskFile, FileRecord, RecordHandle};
use crate::resolve::PathResolver;
use crate::store::RecordStore;

pub(crate) struct Inner {
    pub(crate) config: StoreConfig,
    pub(crate) resolver: PathResolver,
    pub(crate) records: RwLock<RecordStore>,
    pub(crate) disk: Arc<dyn DiskIo>,
    pub(crate) events: broadcast::Sender<StoreEvent>,
    pub(crate) pending: Arc<PendingOps>,
}

/// A staged, in-memory overlay over the filesystem.
///
/// Writes, copies, moves and removals change records in memory only.
/// Nothing touches disk until [`VStor::save`] runs the flush pipeline.
/// Clones share the same records.
///
/// ```no_run
/// # async fn demo() -> vstor::StoreResult<()> {
/// use vstor::{StoreConfig, VStor};
///
/// let store = VStor::new(StoreConfig::new().with_base_path("site"))?;
/// store.write("index.html", "<h1>hi</h1>")?;
/// store.copy("templates/**", "out")?;
/// store.save().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct VStor {
    pub(crate) inner: Arc<Inner>,
}

impl std::fmt::Debug for VStor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VStor")
            .field("base", &self.inner.resolver.base())
            .field("records", &self.store_read().len())
            .field("pending", &self.inner.pending.len())
            .finish()
    }
}

impl VStor {
    /// Create a store over the local filesystem.
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        Self::with_disk(config, Arc::new(LocalDisk))
    }

    /// Create a store over a custom disk implementation.
    pub fn with_disk(config: StoreConfig, disk: Arc<dyn DiskIo>) -> StoreResult<Self> {
        let config = config.validated()?;
        let cwd = std::env::current_dir()?;
        let resolver = PathResolver::new(cwd, config.base_path.as_deref());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        tracing::debug!(base = %resolver.base().display(), "store created");

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                resolver,
                records: RwLock::new(RecordStore::new()),
                disk,
                events,
                pending: PendingOps::new(),
            }),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub fn base(&self) -> &Path {
        self.inner.resolver.base()
    }

    pub fn cwd(&self) -> &Path {
        self.inner.resolver.cwd()
    }

    /// Receive events for every staged change.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    /// Absolute key for a raw path, resolved against the base.
    pub fn resolve_key(&self, raw: impl AsRef<Path>) -> PathBuf {
        self.inner.resolver.resolve_key(raw)
    }

    /// Whether the store holds a record for `raw`, staged or loaded.
    pub fn has_key(&self, raw: impl AsRef<Path>) -> bool {
        let key = self.resolve_key(raw);
        self.store_read().contains(&key)
    }

    /// The record for `raw`, loading it from disk on first access.
    ///
    /// A path that is missing or unreadable yields an empty record, so
    /// this never fails. The same record is returned on every call.
    pub fn get(&self, raw: impl AsRef<Path>) -> RecordHandle {
        let key = self.resolve_key(raw);
        if let Some(handle) = self.store_read().get(&key) {
            return handle;
        }
        let loaded = self.load(&key);
        self.store_write().insert(loaded)
    }

    /// Store a record under its path and announce the change.
    pub fn put(&self, handle: &RecordHandle) {
        self.store_write().put(handle.clone());
        self.emit(EventKind::Changed, handle);
    }

    /// Build a detached record rooted at this store. It is not staged
    /// until passed to [`VStor::put`].
    pub fn create(
        &self,
        raw: impl AsRef<Path>,
        contents: Option<Content>,
    ) -> StoreResult<RecordHandle> {
        let key = self.resolve_key(raw);
        let mut file = DiskFile::empty(&key, self.base(), self.cwd());
        if let Some(contents) = contents {
            let relative = file.relative();
            file.contents = Some(contents.into_bytes(&relative, &self.inner.config.json_spacer)?);
        }
        Ok(RecordHandle::new(FileRecord::new(file)))
    }

    /// Snapshot of every record, in insertion order.
    pub fn records(&self) -> Vec<RecordHandle> {
        self.store_read().handles()
    }

    /// Ids of flushes still running.
    pub fn pending(&self) -> Vec<u64> {
        self.inner.pending.ids()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Resolve once no flush is running.
    pub async fn drained(&self) {
        self.inner.pending.drained().await
    }

    /// Apply the configured exit policy.
    pub async fn shutdown(&self) -> StoreResult<()> {
        match self.inner.config.exit_policy() {
            ExitPolicy::None => Ok(()),
            ExitPolicy::Wait => {
                tracing::debug!(pending = self.pending_count(), "waiting for flushes");
                self.drained().await;
                Ok(())
            }
            ExitPolicy::SaveAndWait => {
                let flush = self.save();
                self.drained().await;
                flush.await.map(|_| ())
            }
        }
    }

    /// Apply the exit policy, then hand back `outcome`. A fatal error
    /// surfaces only after pending flushes have drained.
    pub async fn shutdown_after<T, E>(&self, outcome: Result<T, E>) -> Result<T, E>
    where
        E: std::fmt::Display,
    {
        if let Err(err) = &outcome {
            tracing::debug!(error = %err, "shutting down after failure");
        }
        if let Err(err) = self.shutdown().await {
            tracing::warn!("final flush failed: {}", err);
        }
        outcome
    }

    pub(crate) fn emit(&self, kind: EventKind, record: &RecordHandle) {
        // No subscribers is fine
        let _ = self.inner.events.send(StoreEvent::new(kind, record));
    }

    pub(crate) fn store_read(&self) -> RwLockReadGuard<'_, RecordStore> {
        self.inner.records.read().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn store_write(&self) -> RwLockWriteGuard<'_, RecordStore> {
        self.inner.records.write().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn disk(&self) -> &dyn DiskIo {
        self.inner.disk.as_ref()
    }

    fn load(&self, key: &Path) -> RecordHandle {
        let mut file = DiskFile::empty(key, self.base(), self.cwd());
        match self.disk().stat(key) {
            Ok(stat) => {
                if stat.is_file() {
                    match self.disk().read_file(key) {
                        Ok(bytes) => {
                            file.contents = Some(bytes);
                            file.persisted = true;
                        }
                        Err(e) => tracing::debug!(path = %key.display(), "unreadable file: {}", e),
                    }
                }
                file.stat = Some(stat);
            }
            Err(e) => tracing::trace!(path = %key.display(), "not on disk: {}", e),
        }
        tracing::trace!(path = %key.display(), loaded = file.persisted, "record loaded");
        RecordHandle::new(FileRecord::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FileState;

    fn store() -> VStor {
        VStor::new(StoreConfig::new().with_base_path("/nonexistent-vstor-base")).unwrap()
    }

    #[test]
    fn get_returns_same_record() {
        let store = store();
        let a = store.get("a.txt");
        let b = store.get("./a.txt");
        assert!(a.same_record(&b));
        assert!(a.read().file.is_empty());
        assert_eq!(a.state(), FileState::Unmodified);
        assert!(store.has_key("a.txt"));
    }

    #[test]
    fn create_is_detached() {
        let store = store();
        let rec = store.create("new.txt", Some("hi".into())).unwrap();
        assert_eq!(rec.contents(), Some(b"hi".to_vec()));
        assert_eq!(rec.path(), Path::new("/nonexistent-vstor-base/new.txt"));
        assert!(!store.has_key("new.txt"));

        store.put(&rec);
        assert!(store.get("new.txt").same_record(&rec));
    }

    #[tokio::test]
    async fn put_emits_changed() {
        let store = store();
        let mut events = store.subscribe();
        let rec = store.create("e.txt", None).unwrap();
        store.put(&rec);

        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::Changed);
        assert_eq!(event.path, rec.path());
    }

    #[tokio::test]
    async fn shutdown_after_returns_outcome() {
        let store = VStor::new(
            StoreConfig::new()
                .with_base_path("/nonexistent-vstor-base")
                .with_wait_on_exit(true),
        )
        .unwrap();
        let outcome: Result<(), String> = Err("boom".into());
        assert_eq!(store.shutdown_after(outcome).await, Err("boom".to_string()));
        assert_eq!(store.shutdown_after(Ok::<_, String>(7)).await, Ok(7));
    }
}
