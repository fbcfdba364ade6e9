//! Shared fixtures for integration tests
//!
//! Nodes live in one process and reach each other through
//! [`InProcessTransport`], which calls the remote node's service directly.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use elohim_cluster::{
    AcceptAll, ClusterIdentity, ClusterService, ContentId, Error, FailurePolicy, MemoryStorage,
    NodeIdentity, PeerId, PeerTransport, PinInfo, TransportError, TransportResult,
};

/// Transport that dispatches straight into registered services
#[derive(Default)]
pub struct InProcessTransport {
    nodes: RwLock<HashMap<String, Arc<ClusterService>>>,
    hanging: RwLock<HashSet<String>>,
}

impl InProcessTransport {
    pub async fn register(&self, address: &str, service: Arc<ClusterService>) {
        self.nodes.write().await.insert(address.to_string(), service);
    }

    pub async fn disconnect(&self, address: &str) {
        self.nodes.write().await.remove(address);
    }

    /// Calls to `address` never return
    pub async fn hang(&self, address: &str) {
        self.hanging.write().await.insert(address.to_string());
    }

    async fn node(&self, address: &str) -> TransportResult<Arc<ClusterService>> {
        if self.hanging.read().await.contains(address) {
            std::future::pending::<()>().await;
        }
        self.nodes
            .read()
            .await
            .get(address)
            .cloned()
            .ok_or_else(|| TransportError::Unreachable {
                address: address.to_string(),
                reason: "no such node".to_string(),
            })
    }

    fn map_error(address: &str, error: Error) -> TransportError {
        match error {
            Error::NotTracked(cid) => TransportError::NotTracked(cid),
            other => TransportError::Rejected {
                address: address.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

#[async_trait]
impl PeerTransport for InProcessTransport {
    async fn id(&self, address: &str) -> TransportResult<ClusterIdentity> {
        Ok(self.node(address).await?.id())
    }

    async fn local_status(&self, address: &str, cid: &ContentId) -> TransportResult<PinInfo> {
        self.node(address)
            .await?
            .local_status(cid)
            .await
            .map_err(|e| Self::map_error(address, e))
    }

    async fn local_sync(&self, address: &str, cid: &ContentId) -> TransportResult<PinInfo> {
        self.node(address)
            .await?
            .local_sync(cid)
            .await
            .map_err(|e| Self::map_error(address, e))
    }

    async fn local_recover(&self, address: &str, cid: &ContentId) -> TransportResult<PinInfo> {
        self.node(address)
            .await?
            .local_recover(cid)
            .await
            .map_err(|e| Self::map_error(address, e))
    }

    async fn local_status_all(&self, address: &str) -> TransportResult<Vec<PinInfo>> {
        Ok(self.node(address).await?.local_status_all().await)
    }

    async fn local_sync_all(&self, address: &str) -> TransportResult<Vec<PinInfo>> {
        Ok(self.node(address).await?.local_sync_all().await)
    }
}

pub struct TestNode {
    pub address: String,
    pub service: Arc<ClusterService>,
    pub storage: Arc<MemoryStorage>,
}

impl TestNode {
    pub fn peer_id(&self) -> PeerId {
        self.service.identity().peer_id.clone()
    }
}

pub struct TestCluster {
    pub transport: Arc<InProcessTransport>,
    pub nodes: Vec<TestNode>,
}

impl TestCluster {
    /// `size` nodes named `peer-0..` at `node-0..`, every node a member of
    /// every other node's membership
    pub async fn new(size: usize) -> Self {
        Self::with_policy(size, Arc::new(AcceptAll)).await
    }

    pub async fn with_policy(size: usize, policy: Arc<dyn FailurePolicy>) -> Self {
        let transport = Arc::new(InProcessTransport::default());
        let mut nodes = Vec::with_capacity(size);

        for i in 0..size {
            let address = format!("node-{}", i);
            let storage = Arc::new(MemoryStorage::new(format!("mem-{}", i)));
            let service = Arc::new(ClusterService::new(
                NodeIdentity::new(PeerId::new(format!("peer-{}", i))).with_address(address.clone()),
                storage.clone(),
                transport.clone(),
                policy.clone(),
                Duration::from_millis(200),
            ));
            transport.register(&address, service.clone()).await;
            nodes.push(TestNode {
                address,
                service,
                storage,
            });
        }

        for node in &nodes {
            for other in &nodes {
                if node.address != other.address {
                    node.service
                        .peer_add(&other.address)
                        .await
                        .expect("peer add");
                }
            }
        }

        Self { transport, nodes }
    }

    pub fn node(&self, i: usize) -> &TestNode {
        &self.nodes[i]
    }
}
