//! Tracks flushes that have started but not completed.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

#[derive(Debug)]
pub struct PendingOps {
    next_id: AtomicU64,
    active: Mutex<BTreeSet<u64>>,
    count: watch::Sender<usize>,
}

impl Default for PendingOps {
    fn default() -> Self {
        let (count, _) = watch::channel(0);
        Self {
            next_id: AtomicU64::new(1),
            active: Mutex::new(BTreeSet::new()),
            count,
        }
    }
}

impl PendingOps {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register an operation. It stays pending until the guard drops.
    pub fn begin(self: &Arc<Self>) -> PendingGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let len = {
            let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
            active.insert(id);
            active.len()
        };
        self.count.send_replace(len);
        PendingGuard {
            ops: Arc::clone(self),
            id,
        }
    }

    /// Ids of the operations still running.
    pub fn ids(&self) -> Vec<u64> {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .copied()
            .collect()
    }

    pub fn len(&self) -> usize {
        *self.count.borrow()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve once nothing is pending.
    pub async fn drained(&self) {
        let mut rx = self.count.subscribe();
        // The sender lives in `self`, so the channel cannot close here
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    fn finish(&self, id: u64) {
        let len = {
            let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
            active.remove(&id);
            active.len()
        };
        self.count.send_replace(len);
    }
}

/// Removes its operation from the pending set on drop.
#[derive(Debug)]
pub struct PendingGuard {
    ops: Arc<PendingOps>,
    id: u64,
}

impl PendingGuard {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.ops.finish(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn guards_track_membership() {
        let ops = PendingOps::new();
        let a = ops.begin();
        let b = ops.begin();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops.ids(), vec![a.id(), b.id()]);

        drop(a);
        assert_eq!(ops.ids(), vec![b.id()]);
        drop(b);
        assert!(ops.is_empty());
    }

    #[tokio::test]
    async fn drained_resolves_immediately_when_idle() {
        let ops = PendingOps::new();
        tokio::time::timeout(Duration::from_secs(1), ops.drained())
            .await
            .expect("idle set should drain at once");
    }

    #[tokio::test]
    async fn drained_waits_for_guards() {
        let ops = PendingOps::new();
        let guard = ops.begin();

        let waiter = {
            let ops = ops.clone();
            tokio::spawn(async move { ops.drained().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("drain after guard drop")
            .unwrap();
    }
}
