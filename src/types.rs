//! Core value types shared by the tracker, the aggregator and the RPC layer
//!
//! Everything here is plain data. Identifiers are opaque non-empty strings on
//! the wire; beyond that, which of them are acceptable is decided by the
//! [`FailurePolicy`], never by the types themselves.
//!
//! [`FailurePolicy`]: crate::policy::FailurePolicy

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Identifier of an immutable content item
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentId(String);

impl ContentId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContentId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err("content id cannot be empty".to_string());
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl TryFrom<String> for ContentId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ContentId> for String {
    fn from(id: ContentId) -> Self {
        id.0
    }
}

/// Identifier of a cluster member
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeerId(String);

impl PeerId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generate a fresh random peer id
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PeerId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err("peer id cannot be empty".to_string());
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl TryFrom<String> for PeerId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PeerId> for String {
    fn from(id: PeerId) -> Self {
        id.0
    }
}

/// Status of one pin on one peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerStatus {
    /// Not pinned on this peer
    Unpinned,
    /// Tracked, pin request not yet handed to storage
    Queued,
    /// Storage is fetching the content
    Pinning,
    /// Storage retains the content
    Pinned,
    /// Storage reported a failure for this pin
    PinError,
    /// Unexpected failure: storage or the peer could not be reached
    ClusterError,
}

impl TrackerStatus {
    pub fn is_error(&self) -> bool {
        matches!(self, TrackerStatus::PinError | TrackerStatus::ClusterError)
    }
}

impl fmt::Display for TrackerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrackerStatus::Unpinned => "unpinned",
            TrackerStatus::Queued => "queued",
            TrackerStatus::Pinning => "pinning",
            TrackerStatus::Pinned => "pinned",
            TrackerStatus::PinError => "pin_error",
            TrackerStatus::ClusterError => "cluster_error",
        };
        f.write_str(name)
    }
}

/// One peer's last known status for one content item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinInfo {
    pub cid: ContentId,
    pub peer: PeerId,
    pub status: TrackerStatus,
    pub ts: DateTime<Utc>,
    /// Reason for an error status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PinInfo {
    pub fn new(cid: ContentId, peer: PeerId, status: TrackerStatus) -> Self {
        Self {
            cid,
            peer,
            status,
            ts: Utc::now(),
            error: None,
        }
    }

    /// Entry standing in for a peer that could not be asked
    pub fn cluster_error(cid: ContentId, peer: PeerId, reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::new(cid, peer, TrackerStatus::ClusterError)
        }
    }

    /// Entry for a peer that answered but does not track the content
    pub fn unpinned(cid: ContentId, peer: PeerId) -> Self {
        Self::new(cid, peer, TrackerStatus::Unpinned)
    }
}

/// Merged multi-peer view of one content item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalPinInfo {
    pub cid: ContentId,
    pub peer_map: BTreeMap<PeerId, PinInfo>,
}

impl GlobalPinInfo {
    /// Build the view from per-peer entries, keyed by each entry's peer.
    ///
    /// A later entry for the same peer replaces an earlier one, so the map
    /// never holds more than one entry per peer.
    pub fn from_entries(cid: ContentId, entries: impl IntoIterator<Item = PinInfo>) -> Self {
        let peer_map = entries
            .into_iter()
            .map(|info| (info.peer.clone(), info))
            .collect();
        Self { cid, peer_map }
    }

    pub fn get(&self, peer: &PeerId) -> Option<&PinInfo> {
        self.peer_map.get(peer)
    }
}

/// Identity of the storage node a peer drives
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StorageIdentity {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Snapshot of a cluster peer's identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterIdentity {
    pub id: PeerId,
    pub version: String,
    pub storage: StorageIdentity,
    /// Transport address this peer is reached at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}
