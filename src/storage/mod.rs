//! Storage layer - the content store that actually holds pinned data
//!
//! The tracker only ever talks to storage through [`StorageConnector`]:
//! - submit a pin request and ask how it is going
//! - release content on unpin
//! - report the storage node's own identity
//!
//! Two connectors ship with the crate: [`MemoryStorage`] for standalone
//! nodes and tests, and [`IpfsConnector`] for an IPFS HTTP API daemon.

pub mod ipfs;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::ContentId;

pub use ipfs::IpfsConnector;
pub use memory::{MemoryStorage, PinBehavior};

/// What storage says about one content item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageStatus {
    /// Content is retained
    Pinned,
    /// A pin request is still outstanding
    Pinning,
    /// Storage does not hold a pin for this content
    Unpinned,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Storage answered and reported that the pin failed
    #[error("Pin failed: {0}")]
    PinFailed(String),

    /// Storage could not be reached or answered garbage
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait StorageConnector: Send + Sync {
    /// Identity of the storage node
    async fn id(&self) -> Result<String, StorageError>;

    /// Submit a pin request. Returns once the request is accepted, not once
    /// the content is retained; progress is read back with `pin_status`.
    async fn pin(&self, cid: &ContentId) -> Result<(), StorageError>;

    /// Release the content. Unpinning something not pinned is not an error.
    async fn unpin(&self, cid: &ContentId) -> Result<(), StorageError>;

    async fn pin_status(&self, cid: &ContentId) -> Result<StorageStatus, StorageError>;
}
