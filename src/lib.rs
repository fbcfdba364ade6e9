//! elohim-cluster - pin tracking and cluster-wide pin status
//!
//! Each node tracks the pins it holds in its storage backend and answers for
//! them. Any node can be asked about the whole cluster: it fans the question
//! out to every member and merges the answers, one entry per peer, into a
//! [`GlobalPinInfo`]. Unreachable or slow peers show up as `ClusterError`
//! entries instead of failing the query.
//!
//! ## Modules
//!
//! - [`tracker`] - per-node pin state machine
//! - [`peers`] - cluster membership
//! - [`aggregator`] - cluster-wide status fan-out
//! - [`service`] - the operations a peer offers
//! - [`api`] - HTTP/JSON surface
//! - [`transport`] - how peers reach each other
//! - [`storage`] - storage backends (IPFS, in-memory)

pub mod aggregator;
pub mod api;
pub mod config;
pub mod error;
pub mod peers;
pub mod policy;
pub mod service;
pub mod storage;
pub mod tracker;
pub mod transport;
pub mod types;

pub use aggregator::StatusAggregator;
pub use config::Config;
pub use error::{Error, Result};
pub use peers::{Member, PeerManager};
pub use policy::{AcceptAll, FailurePolicy, RejectSet};
pub use service::{ClusterService, NodeIdentity};
pub use storage::{IpfsConnector, MemoryStorage, StorageConnector, StorageError};
pub use tracker::PinTracker;
pub use transport::{HttpTransport, PeerTransport, TransportError, TransportResult};
pub use types::{
    ClusterIdentity, ContentId, GlobalPinInfo, PeerId, PinInfo, StorageIdentity, TrackerStatus,
};
