//! Draining the pending-operation queue.
//!
//! A pass snapshots the persisted queue and delivers it oldest first. Each
//! entry is independent: a success removes it, a failure (or a delivery that
//! outlives the timeout) bumps its retry count and leaves it for the next
//! pass. At most one pass runs at a time; asking for another while one is
//! running does nothing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{Connectivity, DeliveryError, RemoteEndpoint, SyncEvents};
use crate::events::{Message, Subscription};
use crate::models::{OperationKind, PendingOperation};
use crate::store::{LocalStore, StoreError};

/// Upper bound on a single delivery before it counts as failed.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The queue snapshot was fully processed
    Completed,
    /// Another pass was already running
    AlreadySyncing,
    /// Nothing attempted while offline
    Offline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub outcome: SyncOutcome,
    pub delivered: usize,
    pub failed: usize,
    /// Persisted queue depth after the pass
    pub remaining: usize,
}

impl SyncReport {
    fn skipped(outcome: SyncOutcome, remaining: usize) -> Self {
        Self {
            outcome,
            delivered: 0,
            failed: 0,
            remaining,
        }
    }
}

/// Snapshot for "working offline" indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub online: bool,
    pub syncing: bool,
    pub pending: usize,
}

/// Clears the syncing flag when a pass ends, however it ends.
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct Inner {
    store: Arc<LocalStore>,
    remote: Arc<dyn RemoteEndpoint>,
    connectivity: Connectivity,
    events: SyncEvents,
    syncing: AtomicBool,
    delivery_timeout: Duration,
}

/// Cheap to clone; clones share the same queue, flag and listeners.
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<Inner>,
}

impl SyncCoordinator {
    pub fn new(
        store: Arc<LocalStore>,
        remote: Arc<dyn RemoteEndpoint>,
        connectivity: Connectivity,
        delivery_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                remote,
                connectivity,
                events: SyncEvents::new(),
                syncing: AtomicBool::new(false),
                delivery_timeout,
            }),
        }
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.inner.store
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.inner.connectivity
    }

    pub fn events(&self) -> &SyncEvents {
        &self.inner.events
    }

    pub fn is_syncing(&self) -> bool {
        self.inner.syncing.load(Ordering::Acquire)
    }

    /// Durably queue an operation. When online, a pass is started in the
    /// background; the caller does not wait for it.
    pub async fn enqueue(
        &self,
        kind: OperationKind,
        payload: Value,
    ) -> Result<PendingOperation, StoreError> {
        let op = self.inner.store.add_pending(kind, payload).await?;
        debug!(op = %op.id, kind = %op.kind, "Queued operation");

        if self.inner.connectivity.is_online() {
            let this = self.clone();
            tokio::spawn(async move {
                if let Err(e) = this.sync_pending().await {
                    warn!(error = %e, "Background sync failed");
                }
            });
        }
        Ok(op)
    }

    pub async fn pending_count(&self) -> Result<usize, StoreError> {
        self.inner.store.pending_count().await
    }

    pub async fn status(&self) -> Result<SyncStatus, StoreError> {
        Ok(SyncStatus {
            online: self.inner.connectivity.is_online(),
            syncing: self.is_syncing(),
            pending: self.pending_count().await?,
        })
    }

    /// Run one pass over the queue.
    ///
    /// Returns without doing anything when offline or when a pass is
    /// already running. Only a failure to read the queue is an error;
    /// delivery failures are counted in the report.
    pub async fn sync_pending(&self) -> Result<SyncReport, StoreError> {
        if !self.inner.connectivity.is_online() {
            debug!("Offline, skipping sync");
            let remaining = self.pending_count().await?;
            return Ok(SyncReport::skipped(SyncOutcome::Offline, remaining));
        }
        if self
            .inner
            .syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Sync already in progress");
            let remaining = self.pending_count().await?;
            return Ok(SyncReport::skipped(SyncOutcome::AlreadySyncing, remaining));
        }
        let _guard = PassGuard(&self.inner.syncing);

        let queue = self.inner.store.list_pending().await?;
        info!(count = queue.len(), "Syncing pending operations");

        let mut delivered = 0;
        let mut failed = 0;
        for op in &queue {
            match self.deliver(op).await {
                Ok(()) => match self.inner.store.remove_pending(&op.id).await {
                    Ok(_) => delivered += 1,
                    Err(e) => {
                        // Stays queued; the idempotency key makes redelivery safe
                        warn!(op = %op.id, error = %e, "Failed to remove delivered operation");
                        failed += 1;
                    }
                },
                Err(e) => {
                    warn!(op = %op.id, kind = %op.kind, retry = op.retry_count, error = %e, "Failed to sync operation");
                    failed += 1;
                    if let Err(e) = self.inner.store.mark_pending_failed(&op.id).await {
                        warn!(op = %op.id, error = %e, "Failed to record retry");
                    }
                }
            }
        }

        let remaining = match self.inner.store.pending_count().await {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "Failed to read queue depth");
                queue.len().saturating_sub(delivered)
            }
        };
        info!(delivered, failed, remaining, "Sync pass complete");
        self.inner
            .events
            .publish(Message::QuizSyncComplete { remaining });

        Ok(SyncReport {
            outcome: SyncOutcome::Completed,
            delivered,
            failed,
            remaining,
        })
    }

    async fn deliver(&self, op: &PendingOperation) -> Result<(), DeliveryError> {
        let timeout = self.inner.delivery_timeout;
        match tokio::time::timeout(timeout, self.inner.remote.deliver(op)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::TimedOut(timeout)),
        }
    }

    /// Start a pass every time connectivity goes from offline to online.
    /// The listener stops when the returned subscription is dropped.
    pub fn watch_connectivity(&self) -> Subscription {
        let mut rx = self.inner.connectivity.subscribe();
        let mut was_online = *rx.borrow_and_update();
        let this = self.clone();
        Subscription::new(tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let online = *rx.borrow_and_update();
                if online && !was_online {
                    info!("Connection restored");
                    if let Err(e) = this.sync_pending().await {
                        warn!(error = %e, "Sync after reconnect failed");
                    }
                }
                was_online = online;
            }
        }))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::TempDir;
    use tokio::sync::{broadcast, Notify};

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    /// Remote stub: records deliveries, fails chosen kinds, can hang or block.
    #[derive(Default)]
    struct StubRemote {
        delivered: Mutex<Vec<String>>,
        failing: Mutex<HashSet<OperationKind>>,
        hang: AtomicBool,
        gate: Option<(Notify, Notify)>,
        calls: AtomicUsize,
    }

    impl StubRemote {
        /// Each delivery signals `entered` and then waits for `release`.
        fn gated() -> Self {
            Self {
                gate: Some((Notify::new(), Notify::new())),
                ..Default::default()
            }
        }

        fn fail(&self, kind: OperationKind) {
            self.failing.lock().unwrap().insert(kind);
        }

        fn recover(&self) {
            self.failing.lock().unwrap().clear();
        }

        fn delivered(&self) -> Vec<String> {
            self.delivered.lock().unwrap().clone()
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RemoteEndpoint for StubRemote {
        async fn deliver(&self, op: &PendingOperation) -> Result<(), DeliveryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some((entered, release)) = &self.gate {
                entered.notify_one();
                release.notified().await;
            }
            if self.hang.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if self.failing.lock().unwrap().contains(&op.kind) {
                return Err(DeliveryError::Failed("remote unavailable".to_string()));
            }
            self.delivered.lock().unwrap().push(op.id.clone());
            Ok(())
        }
    }

    fn coordinator(
        dir: &TempDir,
        remote: Arc<StubRemote>,
        online: bool,
        delivery_timeout: Duration,
    ) -> SyncCoordinator {
        let store = Arc::new(LocalStore::new(dir.path()));
        SyncCoordinator::new(store, remote, Connectivity::new(online), delivery_timeout)
    }

    async fn queue_ops(sync: &SyncCoordinator, kinds: &[OperationKind]) -> Vec<String> {
        let mut ids = Vec::new();
        for (n, kind) in kinds.iter().enumerate() {
            let op = sync
                .store()
                .add_pending(*kind, json!({ "n": n }))
                .await
                .unwrap();
            ids.push(op.id);
        }
        ids
    }

    async fn next_remaining(rx: &mut broadcast::Receiver<Message>) -> usize {
        match tokio::time::timeout(TIMEOUT, rx.recv()).await.unwrap().unwrap() {
            Message::QuizSyncComplete { remaining } => remaining,
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_drains_queue_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(StubRemote::default());
        let sync = coordinator(&dir, remote.clone(), true, DEFAULT_DELIVERY_TIMEOUT);
        let ids = queue_ops(
            &sync,
            &[
                OperationKind::ProfileUpdate,
                OperationKind::AttemptSubmission,
                OperationKind::AttemptSubmission,
            ],
        )
        .await;
        let mut rx = sync.events().subscribe();

        let report = sync.sync_pending().await.unwrap();
        assert_eq!(report.outcome, SyncOutcome::Completed);
        assert_eq!((report.delivered, report.failed, report.remaining), (3, 0, 0));
        assert_eq!(remote.delivered(), ids);
        assert_eq!(sync.pending_count().await.unwrap(), 0);
        assert_eq!(next_remaining(&mut rx).await, 0);
    }

    #[tokio::test]
    async fn test_failure_keeps_entry_and_counts_retry() {
        let dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(StubRemote::default());
        remote.fail(OperationKind::ProgressUpdate);
        let sync = coordinator(&dir, remote.clone(), true, DEFAULT_DELIVERY_TIMEOUT);
        let ids = queue_ops(
            &sync,
            &[
                OperationKind::AttemptSubmission,
                OperationKind::ProgressUpdate,
                OperationKind::AttemptSubmission,
            ],
        )
        .await;

        let report = sync.sync_pending().await.unwrap();
        assert_eq!((report.delivered, report.failed, report.remaining), (2, 1, 1));
        assert_eq!(remote.delivered(), vec![ids[0].clone(), ids[2].clone()]);

        let left = sync.store().list_pending().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, ids[1]);
        assert_eq!(left[0].retry_count, 1);

        sync.sync_pending().await.unwrap();
        assert_eq!(sync.store().list_pending().await.unwrap()[0].retry_count, 2);

        remote.recover();
        let report = sync.sync_pending().await.unwrap();
        assert_eq!((report.delivered, report.remaining), (1, 0));
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(StubRemote::default());
        remote.hang.store(true, Ordering::SeqCst);
        let sync = coordinator(&dir, remote.clone(), true, Duration::from_millis(50));
        queue_ops(&sync, &[OperationKind::AttemptSubmission]).await;

        let report = sync.sync_pending().await.unwrap();
        assert_eq!((report.delivered, report.failed, report.remaining), (0, 1, 1));
        assert_eq!(sync.store().list_pending().await.unwrap()[0].retry_count, 1);
        assert!(!sync.is_syncing());
    }

    #[tokio::test]
    async fn test_offline_pass_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(StubRemote::default());
        let sync = coordinator(&dir, remote.clone(), false, DEFAULT_DELIVERY_TIMEOUT);
        queue_ops(&sync, &[OperationKind::AttemptSubmission]).await;

        let report = sync.sync_pending().await.unwrap();
        assert_eq!(report.outcome, SyncOutcome::Offline);
        assert_eq!(report.remaining, 1);
        assert_eq!(remote.calls(), 0);
        assert_eq!(sync.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_request_while_syncing_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(StubRemote::gated());
        let sync = coordinator(&dir, remote.clone(), true, DEFAULT_DELIVERY_TIMEOUT);
        queue_ops(&sync, &[OperationKind::AttemptSubmission]).await;

        let first = tokio::spawn({
            let sync = sync.clone();
            async move { sync.sync_pending().await }
        });
        let (entered, release) = remote.gate.as_ref().unwrap();
        tokio::time::timeout(TIMEOUT, entered.notified()).await.unwrap();

        assert!(sync.status().await.unwrap().syncing);
        let second = sync.sync_pending().await.unwrap();
        assert_eq!(second.outcome, SyncOutcome::AlreadySyncing);
        assert_eq!(second.remaining, 1);

        release.notify_one();
        let first = first.await.unwrap().unwrap();
        assert_eq!(first.delivered, 1);
        assert_eq!(remote.calls(), 1);
        assert!(!sync.is_syncing());
    }

    #[tokio::test]
    async fn test_reconnect_triggers_exactly_one_pass() {
        let dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(StubRemote::default());
        let sync = coordinator(&dir, remote.clone(), false, DEFAULT_DELIVERY_TIMEOUT);
        // Offline enqueues only persist
        sync.enqueue(OperationKind::AttemptSubmission, json!({ "n": 1 }))
            .await
            .unwrap();
        sync.enqueue(OperationKind::ProgressUpdate, json!({ "n": 2 }))
            .await
            .unwrap();
        assert_eq!(remote.calls(), 0);

        let mut rx = sync.events().subscribe();
        let _watch = sync.watch_connectivity();
        sync.connectivity().set_online(true);

        assert_eq!(next_remaining(&mut rx).await, 0);
        assert_eq!(remote.calls(), 2);

        // No change, no pass
        sync.connectivity().set_online(true);
        let extra = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(extra.is_err());
    }

    #[tokio::test]
    async fn test_going_offline_does_not_interrupt_pass() {
        let dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(StubRemote::gated());
        let sync = coordinator(&dir, remote.clone(), true, DEFAULT_DELIVERY_TIMEOUT);
        queue_ops(&sync, &[OperationKind::AttemptSubmission]).await;

        let pass = tokio::spawn({
            let sync = sync.clone();
            async move { sync.sync_pending().await }
        });
        let (entered, release) = remote.gate.as_ref().unwrap();
        tokio::time::timeout(TIMEOUT, entered.notified()).await.unwrap();
        sync.connectivity().set_online(false);
        release.notify_one();

        let report = pass.await.unwrap().unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(sync.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_online_enqueue_syncs_in_background() {
        let dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(StubRemote::default());
        let sync = coordinator(&dir, remote.clone(), true, DEFAULT_DELIVERY_TIMEOUT);
        let mut rx = sync.events().subscribe();

        let op = sync
            .enqueue(OperationKind::ProfileUpdate, json!({ "name": "Asha" }))
            .await
            .unwrap();
        assert_eq!(next_remaining(&mut rx).await, 0);
        assert_eq!(remote.delivered(), vec![op.id]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_enqueue_and_passes_deliver_each_once() {
        let dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(StubRemote::default());
        let sync = coordinator(&dir, remote.clone(), false, DEFAULT_DELIVERY_TIMEOUT);

        let mut tasks = Vec::new();
        for n in 0..16 {
            let sync = sync.clone();
            tasks.push(tokio::spawn(async move {
                for i in 0..3 {
                    sync.enqueue(OperationKind::AttemptSubmission, json!({ "n": n, "i": i }))
                        .await
                        .unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(sync.pending_count().await.unwrap(), 48);
        assert_eq!(LocalStore::new(dir.path()).pending_count().await.unwrap(), 48);

        sync.connectivity().set_online(true);
        let passes: Vec<_> = (0..4)
            .map(|_| {
                let sync = sync.clone();
                tokio::spawn(async move { sync.sync_pending().await })
            })
            .collect();
        for pass in passes {
            pass.await.unwrap().unwrap();
        }
        sync.sync_pending().await.unwrap();

        let delivered = remote.delivered();
        let unique: HashSet<&String> = delivered.iter().collect();
        assert_eq!(delivered.len(), 48);
        assert_eq!(unique.len(), 48);
        assert_eq!(sync.pending_count().await.unwrap(), 0);
        assert_eq!(LocalStore::new(dir.path()).pending_count().await.unwrap(), 0);
    }
}
