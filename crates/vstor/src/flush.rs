//! The flush pipeline: persist staged records to disk.
//!
//! `save` claims every record with pending changes at call time, then a
//! spawned task runs each claimed entry through the filters and writes or
//! deletes it. Records staged after the call are left for the next save.
//!
//! Claims are per revision. A second save started while the first is
//! still running skips records whose current revision is already being
//! written, and picks up records changed since. If two saves write
//! different revisions of the same file, the later write to finish wins
//! on disk.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::disk::DiskIo;
use crate::error::{StoreError, StoreResult};
use crate::record::{FileRecord, FileState, RecordHandle};
use crate::vstor::VStor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushAction {
    Write,
    Delete,
}

/// One file on its way to disk, as seen by filters.
#[derive(Debug, Clone)]
pub struct FlushEntry {
    path: PathBuf,
    action: FlushAction,
    /// Bytes to write. Empty for deletes.
    pub contents: Vec<u8>,
    /// Permission bits to apply.
    pub mode: Option<u32>,
}

impl FlushEntry {
    fn from_record(record: &FileRecord) -> Self {
        let action = if record.staging.state == FileState::Deleted {
            FlushAction::Delete
        } else {
            FlushAction::Write
        };
        Self {
            path: record.file.path.clone(),
            action,
            contents: record.file.contents.clone().unwrap_or_default(),
            mode: record.file.stat.as_ref().and_then(|s| s.mode),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn action(&self) -> FlushAction {
        self.action
    }
}

/// A stage between collection and the disk. Return `Ok(None)` to skip
/// the entry; it stays pending for the next save.
pub trait FlushFilter: Send + Sync {
    fn apply(&self, entry: FlushEntry) -> StoreResult<Option<FlushEntry>>;
}

impl<F> FlushFilter for F
where
    F: Fn(FlushEntry) -> StoreResult<Option<FlushEntry>> + Send + Sync,
{
    fn apply(&self, entry: FlushEntry) -> StoreResult<Option<FlushEntry>> {
        self(entry)
    }
}

/// What a flush did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub written: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
    /// Entries a filter dropped.
    pub skipped: Vec<PathBuf>,
}

impl FlushReport {
    pub fn is_empty(&self) -> bool {
        self.written.is_empty() && self.removed.is_empty() && self.skipped.is_empty()
    }
}

pub type CompletionCallback = Box<dyn FnOnce(&StoreResult<FlushReport>) + Send>;

#[derive(Default)]
pub struct SaveOptions {
    filters: Vec<Arc<dyn FlushFilter>>,
    on_complete: Option<CompletionCallback>,
}

impl SaveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a filter. Filters run in the order added.
    pub fn filter(mut self, filter: impl FlushFilter + 'static) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    /// Called with the outcome before the flush leaves the pending set.
    pub fn on_complete(
        mut self,
        callback: impl FnOnce(&StoreResult<FlushReport>) + Send + 'static,
    ) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }
}

impl std::fmt::Debug for SaveOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaveOptions")
            .field("filters", &self.filters.len())
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}

/// Completion of a flush. Await it for the report, or drop it to let the
/// flush finish in the background.
#[derive(Debug)]
pub struct FlushHandle {
    id: Option<u64>,
    rx: oneshot::Receiver<StoreResult<FlushReport>>,
}

impl FlushHandle {
    /// The pending-set id, or `None` if the flush never started.
    pub fn id(&self) -> Option<u64> {
        self.id
    }
}

impl Future for FlushHandle {
    type Output = StoreResult<FlushReport>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(StoreError::FlushAborted(
                "flush task ended without reporting".to_string(),
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// A record claimed for one flush. Dropping it releases the claim.
struct Claim {
    handle: RecordHandle,
    revision: u64,
    entry: FlushEntry,
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.handle.write().release(self.revision);
    }
}

impl VStor {
    /// Flush every staged change to disk. Must be called within a Tokio
    /// runtime; the flush runs as a spawned task.
    pub fn save(&self) -> FlushHandle {
        self.save_with(SaveOptions::default())
    }

    pub fn save_with(&self, options: SaveOptions) -> FlushHandle {
        let SaveOptions {
            filters,
            on_complete,
        } = options;
        let (tx, rx) = oneshot::channel();

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                let result = Err(StoreError::FlushAborted(
                    "save requires a Tokio runtime".to_string(),
                ));
                if let Some(callback) = on_complete {
                    callback(&result);
                }
                let _ = tx.send(result);
                return FlushHandle { id: None, rx };
            }
        };

        let claims = self.collect_claims();
        let guard = self.inner.pending.begin();
        let id = guard.id();
        let disk = Arc::clone(&self.inner.disk);

        runtime.spawn(async move {
            let result = run_pipeline(id, disk.as_ref(), claims, &filters).await;
            if let Err(err) = &result {
                tracing::warn!(flush_id = id, "flush failed: {}", err);
            }
            if let Some(callback) = on_complete {
                callback(&result);
            }
            drop(guard);
            // The caller may have dropped the handle
            let _ = tx.send(result);
        });

        FlushHandle { id: Some(id), rx }
    }

    fn collect_claims(&self) -> Vec<Claim> {
        self.records()
            .into_iter()
            .filter_map(|handle| {
                let (revision, entry) = {
                    let mut record = handle.write();
                    let revision = record.claim()?;
                    (revision, FlushEntry::from_record(&record))
                };
                Some(Claim {
                    handle,
                    revision,
                    entry,
                })
            })
            .collect()
    }
}

fn apply_filters(
    filters: &[Arc<dyn FlushFilter>],
    mut entry: FlushEntry,
) -> StoreResult<Option<FlushEntry>> {
    for filter in filters {
        match filter.apply(entry)? {
            Some(next) => entry = next,
            None => return Ok(None),
        }
    }
    Ok(Some(entry))
}

fn flush_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Flush {
        path: path.to_path_buf(),
        source,
    }
}

async fn write_entry(disk: &dyn DiskIo, entry: &FlushEntry) -> StoreResult<()> {
    if let Some(parent) = entry.path.parent()
        && !parent.as_os_str().is_empty()
    {
        disk.create_dir_all(parent)
            .await
            .map_err(flush_error(&entry.path))?;
    }
    disk.write_file(&entry.path, &entry.contents, entry.mode)
        .await
        .map_err(flush_error(&entry.path))?;
    tracing::debug!(path = %entry.path.display(), len = entry.contents.len(), "wrote file");
    Ok(())
}

async fn remove_entry(disk: &dyn DiskIo, entry: &FlushEntry) -> StoreResult<()> {
    match disk.remove_all(&entry.path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(flush_error(&entry.path)(e)),
    }
    tracing::debug!(path = %entry.path.display(), "removed");
    Ok(())
}

/// Runs claimed entries, deletes before writes, each group in store
/// order. A directory delete is recursive, so running it after a write
/// beneath it would erase that write. The first failure aborts the rest;
/// their claims are released and their staged state is kept.
#[tracing::instrument(level = "debug", skip(disk, claims, filters), fields(entries = claims.len()))]
async fn run_pipeline(
    flush_id: u64,
    disk: &dyn DiskIo,
    claims: Vec<Claim>,
    filters: &[Arc<dyn FlushFilter>],
) -> StoreResult<FlushReport> {
    let mut report = FlushReport::default();
    let (deletes, writes): (Vec<Claim>, Vec<Claim>) = claims
        .into_iter()
        .partition(|claim| claim.entry.action == FlushAction::Delete);

    for claim in deletes.into_iter().chain(writes) {
        let path = claim.handle.path().to_path_buf();
        let Some(entry) = apply_filters(filters, claim.entry.clone())? else {
            tracing::trace!(path = %path.display(), "filtered out");
            report.skipped.push(path);
            continue;
        };

        match entry.action {
            FlushAction::Write => {
                write_entry(disk, &entry).await?;
                claim
                    .handle
                    .write()
                    .settle_written(claim.revision, entry.contents);
                report.written.push(path);
            }
            FlushAction::Delete => {
                remove_entry(disk, &entry).await?;
                claim.handle.write().settle_removed(claim.revision);
                report.removed.push(path);
            }
        }
    }

    tracing::debug!(
        written = report.written.len(),
        removed = report.removed.len(),
        skipped = report.skipped.len(),
        "flush complete"
    );
    Ok(report)
}
