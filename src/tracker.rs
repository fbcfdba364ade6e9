//! Pin tracker - the per-node pin state machine
//!
//! Owns one record per tracked content id and is the only component that
//! changes a record's status:
//!
//! ```text
//!   track      sync (pin accepted)     sync (retained)
//! ─────────▶ Queued ──────────▶ Pinning ──────────▶ Pinned
//!              ▲                    │
//!              │ recover            │ storage reports failure
//!              │                    ▼
//!              └─────────────── PinError / ClusterError
//! ```
//!
//! `ClusterError` is used when storage could not be asked at all, `PinError`
//! when storage answered with a failure. Records are created by `track`,
//! reused across every transition and dropped by `untrack`.
//!
//! Each record carries an operation lock held across the storage call, so at
//! most one transition per content id is in flight. The record data itself
//! sits behind a separate lock that is never held across I/O, which keeps
//! `status` and `state_sync` cheap.

use chrono::Utc;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::policy::FailurePolicy;
use crate::storage::{StorageConnector, StorageError, StorageStatus};
use crate::types::{ContentId, PeerId, PinInfo, TrackerStatus};

/// Reason recorded when storage lost a pin we believed in
const MISSING_FROM_STORAGE: &str = "content missing from storage";

struct TrackedPin {
    info: RwLock<PinInfo>,
    op: Mutex<()>,
}

impl TrackedPin {
    fn new(info: PinInfo) -> Self {
        Self {
            info: RwLock::new(info),
            op: Mutex::new(()),
        }
    }

    async fn snapshot(&self) -> PinInfo {
        self.info.read().await.clone()
    }

    async fn status(&self) -> TrackerStatus {
        self.info.read().await.status
    }
}

pub struct PinTracker {
    peer_id: PeerId,
    storage: Arc<dyn StorageConnector>,
    policy: Arc<dyn FailurePolicy>,
    pins: RwLock<HashMap<ContentId, Arc<TrackedPin>>>,
}

impl PinTracker {
    pub fn new(
        peer_id: PeerId,
        storage: Arc<dyn StorageConnector>,
        policy: Arc<dyn FailurePolicy>,
    ) -> Self {
        Self {
            peer_id,
            storage,
            policy,
            pins: RwLock::new(HashMap::new()),
        }
    }

    fn check(&self, cid: &ContentId) -> Result<()> {
        if self.policy.rejects(cid) {
            return Err(Error::BadContentId(cid.clone()));
        }
        Ok(())
    }

    async fn entry(&self, cid: &ContentId) -> Result<Arc<TrackedPin>> {
        self.pins
            .read()
            .await
            .get(cid)
            .cloned()
            .ok_or_else(|| Error::NotTracked(cid.clone()))
    }

    /// Move a record to `status`, never stamping it earlier than it already is
    async fn transition(
        &self,
        pin: &TrackedPin,
        status: TrackerStatus,
        error: Option<String>,
    ) -> PinInfo {
        let mut info = pin.info.write().await;
        let previous = info.status;

        info.status = status;
        info.error = error;
        info.ts = Utc::now().max(info.ts);

        if previous != status {
            info!(
                cid = %info.cid,
                from = %previous,
                to = %status,
                "Pin status changed"
            );
        }
        info.clone()
    }

    async fn record_storage_error(&self, pin: &TrackedPin, error: StorageError) -> PinInfo {
        let status = match error {
            StorageError::PinFailed(_) => TrackerStatus::PinError,
            StorageError::Unavailable(_) => TrackerStatus::ClusterError,
        };
        warn!(error = %error, status = %status, "Storage error during sync");
        self.transition(pin, status, Some(error.to_string())).await
    }

    /// Start tracking `cid`. New records start `Queued`; tracking an already
    /// tracked id changes nothing.
    pub async fn track(&self, cid: &ContentId) -> Result<()> {
        self.check(cid)?;

        let existing = {
            let mut pins = self.pins.write().await;
            match pins.get(cid) {
                Some(pin) => pin.clone(),
                None => {
                    let info =
                        PinInfo::new(cid.clone(), self.peer_id.clone(), TrackerStatus::Queued);
                    pins.insert(cid.clone(), Arc::new(TrackedPin::new(info)));
                    info!(cid = %cid, "Tracking pin");
                    return Ok(());
                }
            }
        };

        let _op = existing.op.lock().await;
        if existing.status().await == TrackerStatus::Unpinned {
            self.transition(&existing, TrackerStatus::Queued, None).await;
        }
        Ok(())
    }

    /// Stop tracking `cid` and release it from storage.
    pub async fn untrack(&self, cid: &ContentId) -> Result<()> {
        self.check(cid)?;

        let Some(pin) = self.pins.read().await.get(cid).cloned() else {
            debug!(cid = %cid, "Untrack of untracked pin");
            return Ok(());
        };

        let _op = pin.op.lock().await;

        if let Err(e) = self.storage.unpin(cid).await {
            warn!(cid = %cid, error = %e, "Failed to release pin from storage");
        }

        {
            let mut pins = self.pins.write().await;
            if pins.get(cid).is_some_and(|current| Arc::ptr_eq(current, &pin)) {
                pins.remove(cid);
            }
        }

        self.transition(&pin, TrackerStatus::Unpinned, None).await;
        info!(cid = %cid, "Untracked pin");
        Ok(())
    }

    /// Reconcile the record for `cid` with what storage reports.
    pub async fn sync(&self, cid: &ContentId) -> Result<PinInfo> {
        self.check(cid)?;
        let pin = self.entry(cid).await?;
        let _op = pin.op.lock().await;
        Ok(self.sync_locked(cid, &pin).await)
    }

    async fn sync_locked(&self, cid: &ContentId, pin: &TrackedPin) -> PinInfo {
        let mut current = pin.status().await;

        if current == TrackerStatus::Queued {
            match self.storage.pin(cid).await {
                Ok(()) => {
                    self.transition(pin, TrackerStatus::Pinning, None).await;
                    current = TrackerStatus::Pinning;
                }
                Err(e) => return self.record_storage_error(pin, e).await,
            }
        }

        match self.storage.pin_status(cid).await {
            Ok(StorageStatus::Pinned) => self.transition(pin, TrackerStatus::Pinned, None).await,
            Ok(StorageStatus::Pinning) => self.transition(pin, TrackerStatus::Pinning, None).await,
            Ok(StorageStatus::Unpinned) => match current {
                TrackerStatus::Pinning | TrackerStatus::Pinned => {
                    let reason = Some(MISSING_FROM_STORAGE.to_string());
                    self.transition(pin, TrackerStatus::PinError, reason).await
                }
                // Error records only move forward through recover
                _ => pin.snapshot().await,
            },
            Err(e) => self.record_storage_error(pin, e).await,
        }
    }

    /// Retry a pin stuck in an error state. Any other record is synced.
    pub async fn recover(&self, cid: &ContentId) -> Result<PinInfo> {
        self.check(cid)?;
        let pin = self.entry(cid).await?;
        let _op = pin.op.lock().await;

        if !pin.status().await.is_error() {
            return Ok(self.sync_locked(cid, &pin).await);
        }

        let info = self.transition(&pin, TrackerStatus::Queued, None).await;

        // A refused resubmission leaves the record queued; the next sync retries
        if let Err(e) = self.storage.pin(cid).await {
            warn!(cid = %cid, error = %e, "Pin resubmission failed");
        }

        Ok(info)
    }

    /// Current record for `cid`, without contacting storage
    pub async fn status(&self, cid: &ContentId) -> Result<PinInfo> {
        self.check(cid)?;
        Ok(self.entry(cid).await?.snapshot().await)
    }

    /// Every record as currently known, sorted by content id
    pub async fn state_sync(&self) -> Vec<PinInfo> {
        let pins: Vec<_> = self.pins.read().await.values().cloned().collect();

        let mut infos = Vec::with_capacity(pins.len());
        for pin in pins {
            infos.push(pin.snapshot().await);
        }
        infos.sort_by(|a, b| a.cid.cmp(&b.cid));
        infos
    }

    /// Sync every tracked pin concurrently
    pub async fn sync_all(&self) -> Vec<PinInfo> {
        let pins: Vec<_> = self
            .pins
            .read()
            .await
            .iter()
            .map(|(cid, pin)| (cid.clone(), pin.clone()))
            .collect();

        let mut infos = join_all(pins.iter().map(|(cid, pin)| async move {
            let _op = pin.op.lock().await;
            self.sync_locked(cid, pin).await
        }))
        .await;

        infos.sort_by(|a, b| a.cid.cmp(&b.cid));
        infos
    }

    /// Tracked content ids, sorted
    pub async fn cids(&self) -> Vec<ContentId> {
        let mut cids: Vec<_> = self.pins.read().await.keys().cloned().collect();
        cids.sort();
        cids
    }

    /// Sync every pin on a fixed interval until the task is dropped.
    ///
    /// Only moves pins forward; pins in an error state wait for an explicit
    /// recover.
    pub async fn run_periodic_sync(self: Arc<Self>, interval: Duration) {
        let mut tick = tokio::time::interval(interval);
        // The first tick fires immediately
        tick.tick().await;

        loop {
            tick.tick().await;
            let infos = self.sync_all().await;
            let errors = infos.iter().filter(|info| info.status.is_error()).count();
            debug!(pins = infos.len(), errors, "Periodic sync complete");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{AcceptAll, RejectSet};
    use crate::storage::{MemoryStorage, PinBehavior};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cid(s: &str) -> ContentId {
        ContentId::new(s)
    }

    fn tracker_with(storage: Arc<dyn StorageConnector>) -> PinTracker {
        PinTracker::new(PeerId::new("local"), storage, Arc::new(AcceptAll))
    }

    fn memory_tracker() -> (PinTracker, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::default());
        (tracker_with(storage.clone()), storage)
    }

    /// Storage that counts calls and reports the highest number of
    /// overlapping calls it saw
    #[derive(Default)]
    struct CountingStorage {
        inner: MemoryStorage,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl CountingStorage {
        async fn enter(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        fn exit(&self) {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl StorageConnector for CountingStorage {
        async fn id(&self) -> std::result::Result<String, StorageError> {
            self.inner.id().await
        }

        async fn pin(&self, cid: &ContentId) -> std::result::Result<(), StorageError> {
            self.enter().await;
            let result = self.inner.pin(cid).await;
            self.exit();
            result
        }

        async fn unpin(&self, cid: &ContentId) -> std::result::Result<(), StorageError> {
            self.enter().await;
            let result = self.inner.unpin(cid).await;
            self.exit();
            result
        }

        async fn pin_status(
            &self,
            cid: &ContentId,
        ) -> std::result::Result<StorageStatus, StorageError> {
            self.enter().await;
            let result = self.inner.pin_status(cid).await;
            self.exit();
            result
        }
    }

    #[tokio::test]
    async fn test_track_starts_queued() {
        let (tracker, storage) = memory_tracker();

        tracker.track(&cid("QmA")).await.unwrap();

        let info = tracker.status(&cid("QmA")).await.unwrap();
        assert_eq!(info.status, TrackerStatus::Queued);
        assert_eq!(info.peer, PeerId::new("local"));
        assert_eq!(storage.pin_count().await, 0);
    }

    #[tokio::test]
    async fn test_track_twice_is_idempotent() {
        let (tracker, _storage) = memory_tracker();

        tracker.track(&cid("QmA")).await.unwrap();
        tracker.sync(&cid("QmA")).await.unwrap();
        let before = tracker.status(&cid("QmA")).await.unwrap();

        tracker.track(&cid("QmA")).await.unwrap();
        let after = tracker.status(&cid("QmA")).await.unwrap();

        assert_eq!(before, after);
        assert_eq!(after.status, TrackerStatus::Pinned);
        assert_eq!(tracker.cids().await.len(), 1);
    }

    #[tokio::test]
    async fn test_sync_follows_storage() {
        let (tracker, storage) = memory_tracker();
        storage.set_behavior(&cid("QmSlow"), PinBehavior::Stall).await;
        storage
            .set_behavior(&cid("QmBad"), PinBehavior::Fail("no providers".into()))
            .await;

        for id in ["QmFast", "QmSlow", "QmBad"] {
            tracker.track(&cid(id)).await.unwrap();
        }

        assert_eq!(tracker.sync(&cid("QmFast")).await.unwrap().status, TrackerStatus::Pinned);
        assert_eq!(tracker.sync(&cid("QmSlow")).await.unwrap().status, TrackerStatus::Pinning);

        let bad = tracker.sync(&cid("QmBad")).await.unwrap();
        assert_eq!(bad.status, TrackerStatus::PinError);
        assert!(bad.error.unwrap().contains("no providers"));

        storage.complete(&cid("QmSlow")).await;
        assert_eq!(tracker.sync(&cid("QmSlow")).await.unwrap().status, TrackerStatus::Pinned);
    }

    #[tokio::test]
    async fn test_sync_with_storage_down_is_cluster_error() {
        let (tracker, storage) = memory_tracker();
        tracker.track(&cid("QmA")).await.unwrap();

        storage.set_available(false);
        let info = tracker.sync(&cid("QmA")).await.unwrap();

        assert_eq!(info.status, TrackerStatus::ClusterError);
    }

    #[tokio::test]
    async fn test_sync_detects_lost_pin() {
        let (tracker, storage) = memory_tracker();
        tracker.track(&cid("QmA")).await.unwrap();
        tracker.sync(&cid("QmA")).await.unwrap();

        storage.drop_pin(&cid("QmA")).await;
        let info = tracker.sync(&cid("QmA")).await.unwrap();

        assert_eq!(info.status, TrackerStatus::PinError);
        assert_eq!(info.error.as_deref(), Some(MISSING_FROM_STORAGE));

        // Still missing: stays in error until recovered
        let info = tracker.sync(&cid("QmA")).await.unwrap();
        assert_eq!(info.status, TrackerStatus::PinError);
    }

    #[tokio::test]
    async fn test_recover_error_goes_to_queued() {
        let (tracker, storage) = memory_tracker();
        storage
            .set_behavior(&cid("QmBad"), PinBehavior::Fail("timeout".into()))
            .await;
        tracker.track(&cid("QmBad")).await.unwrap();
        tracker.sync(&cid("QmBad")).await.unwrap();

        // Resubmission still fails: record stays queued, not back in error
        let info = tracker.recover(&cid("QmBad")).await.unwrap();
        assert_eq!(info.status, TrackerStatus::Queued);
        assert!(info.error.is_none());
        assert_eq!(tracker.status(&cid("QmBad")).await.unwrap().status, TrackerStatus::Queued);

        storage.set_behavior(&cid("QmBad"), PinBehavior::Complete).await;
        assert_eq!(tracker.sync(&cid("QmBad")).await.unwrap().status, TrackerStatus::Pinned);
    }

    #[tokio::test]
    async fn test_recover_from_cluster_error() {
        let (tracker, storage) = memory_tracker();
        tracker.track(&cid("QmA")).await.unwrap();

        storage.set_available(false);
        let info = tracker.sync(&cid("QmA")).await.unwrap();
        assert_eq!(info.status, TrackerStatus::ClusterError);

        storage.set_available(true);
        let info = tracker.recover(&cid("QmA")).await.unwrap();
        assert_eq!(info.status, TrackerStatus::Queued);
        assert!(info.error.is_none());

        assert_eq!(tracker.sync(&cid("QmA")).await.unwrap().status, TrackerStatus::Pinned);
    }

    #[tokio::test]
    async fn test_recover_on_healthy_pin_syncs() {
        let (tracker, _storage) = memory_tracker();
        tracker.track(&cid("QmA")).await.unwrap();

        let info = tracker.recover(&cid("QmA")).await.unwrap();
        assert_eq!(info.status, TrackerStatus::Pinned);
    }

    #[tokio::test]
    async fn test_untrack_removes_record_and_releases_storage() {
        let (tracker, storage) = memory_tracker();
        tracker.track(&cid("QmA")).await.unwrap();
        tracker.sync(&cid("QmA")).await.unwrap();
        assert_eq!(storage.pin_count().await, 1);

        tracker.untrack(&cid("QmA")).await.unwrap();

        assert!(matches!(
            tracker.status(&cid("QmA")).await,
            Err(Error::NotTracked(_))
        ));
        assert_eq!(storage.pin_count().await, 0);

        // Untracking again is a no-op
        tracker.untrack(&cid("QmA")).await.unwrap();
    }

    #[tokio::test]
    async fn test_untracked_reads_fail() {
        let (tracker, _storage) = memory_tracker();

        assert!(matches!(tracker.status(&cid("QmNope")).await, Err(Error::NotTracked(_))));
        assert!(matches!(tracker.sync(&cid("QmNope")).await, Err(Error::NotTracked(_))));
        assert!(matches!(tracker.recover(&cid("QmNope")).await, Err(Error::NotTracked(_))));
    }

    #[tokio::test]
    async fn test_rejected_cid_never_reaches_storage() {
        let storage = Arc::new(CountingStorage::default());
        let tracker = PinTracker::new(
            PeerId::new("local"),
            storage.clone(),
            Arc::new(RejectSet::new(vec![cid("QmErr")])),
        );

        assert!(matches!(tracker.track(&cid("QmErr")).await, Err(Error::BadContentId(_))));
        assert!(matches!(tracker.sync(&cid("QmErr")).await, Err(Error::BadContentId(_))));
        assert!(matches!(tracker.recover(&cid("QmErr")).await, Err(Error::BadContentId(_))));
        assert!(matches!(tracker.untrack(&cid("QmErr")).await, Err(Error::BadContentId(_))));
        assert!(matches!(tracker.status(&cid("QmErr")).await, Err(Error::BadContentId(_))));

        assert_eq!(storage.calls.load(Ordering::SeqCst), 0);
        assert!(tracker.state_sync().await.is_empty());
    }

    #[tokio::test]
    async fn test_timestamps_never_go_backwards() {
        let (tracker, storage) = memory_tracker();
        storage.set_behavior(&cid("QmA"), PinBehavior::Stall).await;
        tracker.track(&cid("QmA")).await.unwrap();

        let mut last = tracker.status(&cid("QmA")).await.unwrap().ts;
        for _ in 0..5 {
            let info = tracker.sync(&cid("QmA")).await.unwrap();
            assert!(info.ts >= last);
            last = info.ts;
        }
    }

    #[tokio::test]
    async fn test_concurrent_operations_on_one_pin_are_serialized() {
        let storage = Arc::new(CountingStorage::default());
        let tracker = Arc::new(tracker_with(storage.clone()));
        tracker.track(&cid("QmA")).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let tracker = tracker.clone();
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    tracker.sync(&cid("QmA")).await
                } else {
                    tracker.recover(&cid("QmA")).await
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(storage.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.status(&cid("QmA")).await.unwrap().status, TrackerStatus::Pinned);
    }

    #[tokio::test]
    async fn test_state_sync_and_sync_all() {
        let (tracker, storage) = memory_tracker();
        storage.set_behavior(&cid("QmB"), PinBehavior::Stall).await;
        tracker.track(&cid("QmB")).await.unwrap();
        tracker.track(&cid("QmA")).await.unwrap();

        let snapshot = tracker.state_sync().await;
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.iter().all(|info| info.status == TrackerStatus::Queued));
        assert_eq!(snapshot[0].cid, cid("QmA"));

        let synced = tracker.sync_all().await;
        let statuses: Vec<_> = synced.iter().map(|info| info.status).collect();
        assert_eq!(statuses, vec![TrackerStatus::Pinned, TrackerStatus::Pinning]);
    }

    #[tokio::test]
    async fn test_periodic_sync_completes_pins() {
        let (tracker, storage) = memory_tracker();
        let tracker = Arc::new(tracker);
        storage.set_behavior(&cid("QmSlow"), PinBehavior::Stall).await;
        tracker.track(&cid("QmA")).await.unwrap();
        tracker.track(&cid("QmSlow")).await.unwrap();

        let handle = tokio::spawn(tracker.clone().run_periodic_sync(Duration::from_millis(20)));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(tracker.status(&cid("QmA")).await.unwrap().status, TrackerStatus::Pinned);
        assert_eq!(tracker.status(&cid("QmSlow")).await.unwrap().status, TrackerStatus::Pinning);

        storage.complete(&cid("QmSlow")).await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(tracker.status(&cid("QmSlow")).await.unwrap().status, TrackerStatus::Pinned);

        handle.abort();
    }
}
