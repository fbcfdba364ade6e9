//! Peer transport - how one node asks another about its pins
//!
//! The aggregator and the peer manager only see [`PeerTransport`]. Each call
//! is addressed by transport address and answered from the remote node's own
//! tracker, never from its aggregator, so fan-out does not recurse.
//! Timeouts are applied by the caller.

pub mod http;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{ClusterIdentity, ContentId, PinInfo};

pub use http::HttpTransport;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Peer unreachable at {address}: {reason}")]
    Unreachable { address: String, reason: String },

    #[error("Call to {address} timed out")]
    Timeout { address: String },

    #[error("Content id not tracked by peer: {0}")]
    NotTracked(ContentId),

    #[error("Peer at {address} rejected the call: {reason}")]
    Rejected { address: String, reason: String },

    #[error("Malformed response from {address}: {reason}")]
    Decode { address: String, reason: String },
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Resolve an address to the identity of the peer listening there
    async fn id(&self, address: &str) -> TransportResult<ClusterIdentity>;

    async fn local_status(&self, address: &str, cid: &ContentId) -> TransportResult<PinInfo>;

    async fn local_sync(&self, address: &str, cid: &ContentId) -> TransportResult<PinInfo>;

    async fn local_recover(&self, address: &str, cid: &ContentId) -> TransportResult<PinInfo>;

    async fn local_status_all(&self, address: &str) -> TransportResult<Vec<PinInfo>>;

    async fn local_sync_all(&self, address: &str) -> TransportResult<Vec<PinInfo>>;
}
