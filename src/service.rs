//! Cluster service - the operations a cluster peer offers
//!
//! Composes the tracker, the peer manager and the aggregator. Holds no
//! mutable state of its own. Every operation taking a content id asks the
//! failure policy first, before touching any component.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::aggregator::StatusAggregator;
use crate::error::{Error, Result};
use crate::peers::PeerManager;
use crate::policy::FailurePolicy;
use crate::storage::StorageConnector;
use crate::tracker::PinTracker;
use crate::transport::PeerTransport;
use crate::types::{ClusterIdentity, ContentId, GlobalPinInfo, PeerId, PinInfo, StorageIdentity};

/// Version reported by `id` and `version`
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Who this node is
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    pub peer_id: PeerId,
    pub version: String,
    pub storage: StorageIdentity,
    /// Address other peers reach this node at
    pub address: Option<String>,
}

impl NodeIdentity {
    pub fn new(peer_id: PeerId) -> Self {
        Self {
            peer_id,
            version: VERSION.to_string(),
            storage: StorageIdentity::default(),
            address: None,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_storage(mut self, storage: StorageIdentity) -> Self {
        self.storage = storage;
        self
    }

    pub fn cluster_identity(&self) -> ClusterIdentity {
        ClusterIdentity {
            id: self.peer_id.clone(),
            version: self.version.clone(),
            storage: self.storage.clone(),
            address: self.address.clone(),
        }
    }
}

/// Ask the storage node who it is. A failure is recorded, not returned.
pub async fn storage_identity(storage: &dyn StorageConnector) -> StorageIdentity {
    match storage.id().await {
        Ok(id) => StorageIdentity { id, error: None },
        Err(e) => {
            warn!(error = %e, "Could not identify storage node");
            StorageIdentity {
                id: String::new(),
                error: Some(e.to_string()),
            }
        }
    }
}

pub struct ClusterService {
    identity: NodeIdentity,
    policy: Arc<dyn FailurePolicy>,
    tracker: Arc<PinTracker>,
    peers: Arc<PeerManager>,
    aggregator: StatusAggregator,
}

impl ClusterService {
    pub fn new(
        identity: NodeIdentity,
        storage: Arc<dyn StorageConnector>,
        transport: Arc<dyn PeerTransport>,
        policy: Arc<dyn FailurePolicy>,
        rpc_timeout: Duration,
    ) -> Self {
        let tracker = Arc::new(PinTracker::new(
            identity.peer_id.clone(),
            storage,
            policy.clone(),
        ));
        let peers = Arc::new(PeerManager::new(
            identity.cluster_identity(),
            transport.clone(),
            rpc_timeout,
        ));
        let aggregator =
            StatusAggregator::new(tracker.clone(), peers.clone(), transport, rpc_timeout);

        info!(peer_id = %identity.peer_id, version = %identity.version, "Cluster service ready");

        Self {
            identity,
            policy,
            tracker,
            peers,
            aggregator,
        }
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    /// Local tracker, for background sync
    pub fn tracker(&self) -> Arc<PinTracker> {
        self.tracker.clone()
    }

    fn check(&self, cid: &ContentId) -> Result<()> {
        if self.policy.rejects(cid) {
            debug!(cid = %cid, "Content id refused by policy");
            return Err(Error::BadContentId(cid.clone()));
        }
        Ok(())
    }

    // === Pinset ===

    /// Track `cid` and try to start pinning it right away
    pub async fn pin(&self, cid: &ContentId) -> Result<()> {
        self.check(cid)?;
        self.tracker.track(cid).await?;

        match self.tracker.sync(cid).await {
            Ok(info) => debug!(cid = %cid, status = %info.status, "Pin submitted"),
            Err(e) => warn!(cid = %cid, error = %e, "Initial sync after pin failed"),
        }
        Ok(())
    }

    pub async fn unpin(&self, cid: &ContentId) -> Result<()> {
        self.check(cid)?;
        self.tracker.untrack(cid).await
    }

    pub async fn pin_list(&self) -> Vec<ContentId> {
        self.tracker.cids().await
    }

    pub async fn track(&self, cid: &ContentId) -> Result<()> {
        self.check(cid)?;
        self.tracker.track(cid).await
    }

    pub async fn untrack(&self, cid: &ContentId) -> Result<()> {
        self.check(cid)?;
        self.tracker.untrack(cid).await
    }

    // === Identity and membership ===

    pub fn id(&self) -> ClusterIdentity {
        self.identity.cluster_identity()
    }

    pub fn version(&self) -> &str {
        &self.identity.version
    }

    pub async fn peers(&self) -> Vec<ClusterIdentity> {
        self.peers.peers().await
    }

    pub async fn peer_add(&self, address: &str) -> Result<ClusterIdentity> {
        self.peers.peer_add(address).await
    }

    pub async fn peer_remove(&self, peer_id: &PeerId) -> Result<()> {
        self.peers.peer_remove(peer_id).await
    }

    pub async fn peer_manager_peers(&self) -> Vec<PeerId> {
        self.peers.peer_ids().await
    }

    // === Cluster-wide status ===

    pub async fn status(&self, cid: &ContentId) -> Result<GlobalPinInfo> {
        self.check(cid)?;
        self.aggregator.status(cid).await
    }

    pub async fn sync(&self, cid: &ContentId) -> Result<GlobalPinInfo> {
        self.check(cid)?;
        self.aggregator.sync(cid).await
    }

    pub async fn recover(&self, cid: &ContentId) -> Result<GlobalPinInfo> {
        self.check(cid)?;
        self.aggregator.recover(cid).await
    }

    pub async fn status_all(&self) -> Vec<GlobalPinInfo> {
        self.aggregator.status_all().await
    }

    pub async fn sync_all(&self) -> Vec<GlobalPinInfo> {
        self.aggregator.sync_all().await
    }

    /// Local records only, without contacting storage or peers
    pub async fn state_sync(&self) -> Vec<PinInfo> {
        self.tracker.state_sync().await
    }

    // === Peer-internal ===

    pub async fn local_status(&self, cid: &ContentId) -> Result<PinInfo> {
        self.check(cid)?;
        self.tracker.status(cid).await
    }

    pub async fn local_sync(&self, cid: &ContentId) -> Result<PinInfo> {
        self.check(cid)?;
        self.tracker.sync(cid).await
    }

    pub async fn local_recover(&self, cid: &ContentId) -> Result<PinInfo> {
        self.check(cid)?;
        self.tracker.recover(cid).await
    }

    pub async fn local_status_all(&self) -> Vec<PinInfo> {
        self.tracker.state_sync().await
    }

    pub async fn local_sync_all(&self) -> Vec<PinInfo> {
        self.tracker.sync_all().await
    }
}
