//! Integration tests for the flush pipeline on the local filesystem.
//!
//! Tests verify:
//! - flushing twice writes nothing the second time
//! - files staged and removed before a flush never reach disk
//! - write failures abort the flush and keep records pending
//! - overlapping saves write each revision once
//! - shutdown drains pending flushes

use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use vstor::{
    DiskEntry, DiskIo, FileState, FileStat, FlushEntry, LocalDisk, SaveOptions, StoreConfig,
    StoreError, StoreResult, VStor,
};

// ============================================================================
// Test Helpers
// ============================================================================

static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

fn temp_dir() -> PathBuf {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    env::temp_dir().join(format!("vstor-flush-{}-{}", std::process::id(), id))
}

/// Local disk that counts physical writes and removals, optionally
/// delaying each write.
#[derive(Debug, Default)]
struct CountingDisk {
    inner: LocalDisk,
    writes: AtomicUsize,
    removes: AtomicUsize,
    delay: Option<Duration>,
}

impl CountingDisk {
    fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn removes(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DiskIo for CountingDisk {
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.inner.read_file(path)
    }

    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        self.inner.stat(path)
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<DiskEntry>> {
        self.inner.list_dir(path)
    }

    async fn write_file(&self, path: &Path, data: &[u8], mode: Option<u32>) -> io::Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write_file(path, data, mode).await
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        self.inner.create_dir_all(path).await
    }

    async fn remove_all(&self, path: &Path) -> io::Result<()> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        self.inner.remove_all(path).await
    }
}

fn setup_with(disk: CountingDisk, config: StoreConfig) -> (VStor, Arc<CountingDisk>, PathBuf) {
    let dir = temp_dir();
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();

    let disk = Arc::new(disk);
    let store = VStor::with_disk(config.with_base_path(dir.clone()), disk.clone()).unwrap();
    (store, disk, dir)
}

fn setup() -> (VStor, Arc<CountingDisk>, PathBuf) {
    setup_with(CountingDisk::default(), StoreConfig::new())
}

fn cleanup(dir: &Path) {
    let _ = std::fs::remove_dir_all(dir);
}

// ============================================================================
// Idempotence
// ============================================================================

#[tokio::test]
async fn test_second_flush_writes_nothing() {
    let (store, disk, dir) = setup();
    store.write("a.txt", "a").unwrap();
    store.write("nested/b.txt", "b").unwrap();

    let report = store.save().await.unwrap();
    assert_eq!(report.written.len(), 2);
    assert_eq!(disk.writes(), 2);

    let report = store.save().await.unwrap();
    assert!(report.is_empty());
    assert_eq!(disk.writes(), 2);
    assert_eq!(disk.removes(), 0);

    cleanup(&dir);
}

#[tokio::test]
async fn test_staged_then_removed_never_reaches_disk() {
    let (store, disk, dir) = setup();
    store.write("temp.txt", "scratch").unwrap();
    store.remove("temp.txt").unwrap();

    let report = store.save().await.unwrap();
    assert!(report.is_empty());
    assert_eq!(disk.writes(), 0);
    assert_eq!(disk.removes(), 0);
    assert!(!dir.join("temp.txt").exists());

    cleanup(&dir);
}

#[tokio::test]
async fn test_flushed_then_removed_is_deleted() {
    let (store, disk, dir) = setup();
    store.write("keep.txt", "k").unwrap();
    store.save().await.unwrap();

    store.remove("keep.txt").unwrap();
    let report = store.save().await.unwrap();
    assert_eq!(report.removed, vec![dir.join("keep.txt")]);
    assert_eq!(disk.removes(), 1);
    assert!(!dir.join("keep.txt").exists());

    cleanup(&dir);
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_flush_error_when_parent_is_file() {
    let (store, _disk, dir) = setup();
    std::fs::write(dir.join("blocker"), "i am a file").unwrap();

    let record = store.write("blocker/child.txt", "x").unwrap();
    let err = store.save().await.unwrap_err();
    match err {
        StoreError::Flush { path, .. } => assert_eq!(path, dir.join("blocker/child.txt")),
        other => panic!("expected Flush error, got {other}"),
    }

    assert_eq!(record.state(), FileState::Modified);
    assert_eq!(store.pending_count(), 0);

    cleanup(&dir);
}

#[tokio::test]
async fn test_filter_error_aborts_flush() {
    let (store, disk, dir) = setup();
    store.write("a.txt", "a").unwrap();

    let options =
        SaveOptions::new().filter(|entry: FlushEntry| -> StoreResult<Option<FlushEntry>> {
            Err(StoreError::Filter {
                path: entry.path().to_path_buf(),
                message: "rejected".to_string(),
            })
        });
    let err = store.save_with(options).await.unwrap_err();
    assert!(matches!(err, StoreError::Filter { .. }));
    assert_eq!(disk.writes(), 0);

    // The record is still pending and flushes normally afterwards
    let report = store.save().await.unwrap();
    assert_eq!(report.written, vec![dir.join("a.txt")]);

    cleanup(&dir);
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test]
async fn test_overlapping_saves_write_each_revision_once() {
    let (store, disk, dir) =
        setup_with(CountingDisk::slow(Duration::from_millis(20)), StoreConfig::new());

    let record = store.write("a.txt", "v1").unwrap();
    let first = store.save();
    let idle = store.save();
    store.write("a.txt", "v2").unwrap();
    let second = store.save();
    assert!(store.pending_count() >= 1);

    let first = first.await.unwrap();
    let idle = idle.await.unwrap();
    let second = second.await.unwrap();

    assert_eq!(first.written, vec![dir.join("a.txt")]);
    assert!(idle.is_empty());
    assert_eq!(second.written, vec![dir.join("a.txt")]);
    assert_eq!(disk.writes(), 2);
    assert_eq!(record.state(), FileState::Unmodified);
    assert_eq!(store.pending(), Vec::<u64>::new());

    let on_disk = std::fs::read_to_string(dir.join("a.txt")).unwrap();
    assert!(on_disk == "v1" || on_disk == "v2");

    cleanup(&dir);
}

#[tokio::test]
async fn test_changes_during_flush_stay_pending() {
    let (store, disk, dir) =
        setup_with(CountingDisk::slow(Duration::from_millis(20)), StoreConfig::new());

    let record = store.write("a.txt", "v1").unwrap();
    let flush = store.save();
    store.write("a.txt", "v2").unwrap();
    flush.await.unwrap();

    // The flush wrote v1, so the newer revision is still staged
    assert_eq!(record.state(), FileState::Modified);
    assert_eq!(std::fs::read_to_string(dir.join("a.txt")).unwrap(), "v1");

    store.save().await.unwrap();
    assert_eq!(record.state(), FileState::Unmodified);
    assert_eq!(std::fs::read_to_string(dir.join("a.txt")).unwrap(), "v2");
    assert_eq!(disk.writes(), 2);

    cleanup(&dir);
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test]
async fn test_shutdown_waits_for_running_flush() {
    let (store, _disk, dir) = setup_with(
        CountingDisk::slow(Duration::from_millis(30)),
        StoreConfig::new().with_wait_on_exit(true),
    );
    store.write("a.txt", "a").unwrap();
    let _detached = store.save();

    store.shutdown().await.unwrap();
    assert_eq!(store.pending_count(), 0);
    assert!(dir.join("a.txt").exists());

    cleanup(&dir);
}

#[tokio::test]
async fn test_shutdown_saves_when_configured() {
    let (store, _disk, dir) = setup_with(
        CountingDisk::default(),
        StoreConfig::new().with_save_on_exit(true),
    );
    store.write("final.txt", "bye").unwrap();

    let outcome: Result<(), String> = Err("fatal".to_string());
    let outcome = store.shutdown_after(outcome).await;

    assert_eq!(outcome, Err("fatal".to_string()));
    assert_eq!(std::fs::read_to_string(dir.join("final.txt")).unwrap(), "bye");

    cleanup(&dir);
}

#[tokio::test]
async fn test_shutdown_without_policy_returns_immediately() {
    let (store, disk, dir) = setup();
    store.write("a.txt", "a").unwrap();

    store.shutdown().await.unwrap();
    assert_eq!(disk.writes(), 0);
    assert!(!dir.join("a.txt").exists());

    cleanup(&dir);
}
