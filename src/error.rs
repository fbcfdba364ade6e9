//! Error types for elohim-cluster

use thiserror::Error;

use crate::storage::StorageError;
use crate::transport::TransportError;
use crate::types::{ContentId, PeerId};

#[derive(Error, Debug)]
pub enum Error {
    #[error("Content id refused by failure policy: {0}")]
    BadContentId(ContentId),

    #[error("Content id not tracked: {0}")]
    NotTracked(ContentId),

    #[error("Peer {peer} unreachable: {reason}")]
    PeerUnreachable { peer: PeerId, reason: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Cannot remove the local peer {0}")]
    CannotRemoveLocalPeer(PeerId),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Stable machine-readable name, used on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            Error::BadContentId(_) => "bad_content_id",
            Error::NotTracked(_) => "not_tracked",
            Error::PeerUnreachable { .. } => "peer_unreachable",
            Error::Storage(_) => "storage",
            Error::Transport(_) => "transport",
            Error::CannotRemoveLocalPeer(_) => "cannot_remove_local_peer",
            Error::Config(_) => "config",
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
