//! In-memory storage connector
//!
//! Holds pins in a map instead of fetching anything. Each content id can be
//! given a [`PinBehavior`] so tests (and demo nodes) can make pins complete,
//! stall, or fail on demand.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

use super::{StorageConnector, StorageError, StorageStatus};
use crate::types::ContentId;

/// How a pin request for a content id plays out
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PinBehavior {
    /// Pin completes as soon as it is requested
    #[default]
    Complete,
    /// Pin stays outstanding until [`MemoryStorage::complete`] is called
    Stall,
    /// Pin request is refused with this reason
    Fail(String),
}

pub struct MemoryStorage {
    id: String,
    pins: RwLock<HashMap<ContentId, StorageStatus>>,
    behaviors: RwLock<HashMap<ContentId, PinBehavior>>,
    available: AtomicBool,
}

impl MemoryStorage {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pins: RwLock::new(HashMap::new()),
            behaviors: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Set how future pin requests for `cid` behave
    pub async fn set_behavior(&self, cid: &ContentId, behavior: PinBehavior) {
        self.behaviors.write().await.insert(cid.clone(), behavior);
    }

    /// Make every call fail as if the storage daemon were down
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Finish an outstanding pin
    pub async fn complete(&self, cid: &ContentId) {
        if let Some(status) = self.pins.write().await.get_mut(cid) {
            *status = StorageStatus::Pinned;
        }
    }

    /// Forget a pin without going through unpin (content lost underneath us)
    pub async fn drop_pin(&self, cid: &ContentId) {
        self.pins.write().await.remove(cid);
    }

    pub async fn pin_count(&self) -> usize {
        self.pins.read().await.len()
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::Unavailable(format!(
                "memory storage {} is offline",
                self.id
            )))
        }
    }

    async fn behavior(&self, cid: &ContentId) -> PinBehavior {
        self.behaviors
            .read()
            .await
            .get(cid)
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new("memory")
    }
}

#[async_trait]
impl StorageConnector for MemoryStorage {
    async fn id(&self) -> Result<String, StorageError> {
        self.check_available()?;
        Ok(self.id.clone())
    }

    async fn pin(&self, cid: &ContentId) -> Result<(), StorageError> {
        self.check_available()?;

        let status = match self.behavior(cid).await {
            PinBehavior::Complete => StorageStatus::Pinned,
            PinBehavior::Stall => StorageStatus::Pinning,
            PinBehavior::Fail(reason) => return Err(StorageError::PinFailed(reason)),
        };

        let mut pins = self.pins.write().await;
        // An already retained pin stays retained
        let entry = pins.entry(cid.clone()).or_insert(status);
        if *entry != StorageStatus::Pinned {
            *entry = status;
        }
        debug!(cid = %cid, status = ?entry, "Memory storage accepted pin");
        Ok(())
    }

    async fn unpin(&self, cid: &ContentId) -> Result<(), StorageError> {
        self.check_available()?;
        self.pins.write().await.remove(cid);
        Ok(())
    }

    async fn pin_status(&self, cid: &ContentId) -> Result<StorageStatus, StorageError> {
        self.check_available()?;

        let status = self
            .pins
            .read()
            .await
            .get(cid)
            .copied()
            .unwrap_or(StorageStatus::Unpinned);

        if status == StorageStatus::Pinning {
            if let PinBehavior::Fail(reason) = self.behavior(cid).await {
                return Err(StorageError::PinFailed(reason));
            }
        }
        Ok(status)
    }
}
