//! Peer manager - cluster membership
//!
//! Membership is local to this node: adds and removes apply here only and
//! are not coordinated with the rest of the cluster. The local peer is
//! always a member and cannot be removed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::transport::{PeerTransport, TransportError};
use crate::types::{ClusterIdentity, PeerId};

/// A member of the cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub identity: ClusterIdentity,
    /// Transport address; `None` for the local peer
    pub address: Option<String>,
}

impl Member {
    pub fn id(&self) -> &PeerId {
        &self.identity.id
    }
}

pub struct PeerManager {
    local_id: PeerId,
    transport: Arc<dyn PeerTransport>,
    rpc_timeout: Duration,
    members: RwLock<HashMap<PeerId, Member>>,
}

impl PeerManager {
    /// Create a membership containing only the local peer
    pub fn new(
        local: ClusterIdentity,
        transport: Arc<dyn PeerTransport>,
        rpc_timeout: Duration,
    ) -> Self {
        let local_id = local.id.clone();
        let mut members = HashMap::new();
        members.insert(
            local_id.clone(),
            Member {
                identity: local,
                address: None,
            },
        );

        Self {
            local_id,
            transport,
            rpc_timeout,
            members: RwLock::new(members),
        }
    }

    /// Add the peer listening at `address`, returning its identity.
    ///
    /// Adding a peer that is already a member returns the identity recorded
    /// when it was first added.
    pub async fn peer_add(&self, address: &str) -> Result<ClusterIdentity> {
        if let Some(member) = self
            .members
            .read()
            .await
            .values()
            .find(|m| m.address.as_deref() == Some(address))
        {
            debug!(%address, peer_id = %member.id(), "Peer already known at address");
            return Ok(member.identity.clone());
        }

        let identity = match timeout(self.rpc_timeout, self.transport.id(address)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(%address, "Peer did not answer identity request");
                return Err(TransportError::Timeout {
                    address: address.to_string(),
                }
                .into());
            }
        };

        let mut members = self.members.write().await;
        if let Some(existing) = members.get(&identity.id) {
            debug!(%address, peer_id = %identity.id, "Peer already a member");
            return Ok(existing.identity.clone());
        }

        info!(%address, peer_id = %identity.id, version = %identity.version, "Added cluster peer");
        members.insert(
            identity.id.clone(),
            Member {
                identity: identity.clone(),
                address: Some(address.to_string()),
            },
        );
        Ok(identity)
    }

    /// Remove a peer. Removing an unknown peer is a no-op.
    pub async fn peer_remove(&self, peer_id: &PeerId) -> Result<()> {
        if *peer_id == self.local_id {
            return Err(Error::CannotRemoveLocalPeer(peer_id.clone()));
        }

        if self.members.write().await.remove(peer_id).is_some() {
            info!(%peer_id, "Removed cluster peer");
        } else {
            debug!(%peer_id, "Remove of unknown peer");
        }
        Ok(())
    }

    /// Identities of all members, sorted by peer id
    pub async fn peers(&self) -> Vec<ClusterIdentity> {
        self.members()
            .await
            .into_iter()
            .map(|member| member.identity)
            .collect()
    }

    /// Peer ids of all members, sorted
    pub async fn peer_ids(&self) -> Vec<PeerId> {
        let mut ids: Vec<_> = self.members.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Full member records, sorted by peer id
    pub async fn members(&self) -> Vec<Member> {
        let mut members: Vec<_> = self.members.read().await.values().cloned().collect();
        members.sort_by(|a, b| a.id().cmp(b.id()));
        members
    }

    pub async fn len(&self) -> usize {
        self.members.read().await.len()
    }
}
