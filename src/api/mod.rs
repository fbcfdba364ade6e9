//! RPC API - HTTP/JSON surface of a cluster peer
//!
//! One route per operation, all `POST` with JSON bodies:
//! - `/rpc/*` - the public cluster surface (pin, status, peers, ...)
//! - `/rpc/local/*` - peer-internal calls answered from the local tracker,
//!   used by remote aggregators
//! - `GET /health` - liveness

pub mod routes;

use axum::{
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::service::ClusterService;
use crate::types::{ContentId, PeerId};

/// Route paths, shared with the HTTP transport
pub mod paths {
    pub const PIN: &str = "/rpc/pin";
    pub const UNPIN: &str = "/rpc/unpin";
    pub const PIN_LIST: &str = "/rpc/pin_list";
    pub const ID: &str = "/rpc/id";
    pub const VERSION: &str = "/rpc/version";
    pub const PEERS: &str = "/rpc/peers";
    pub const PEER_ADD: &str = "/rpc/peer_add";
    pub const PEER_REMOVE: &str = "/rpc/peer_remove";
    pub const STATUS_ALL: &str = "/rpc/status_all";
    pub const STATUS: &str = "/rpc/status";
    pub const SYNC_ALL: &str = "/rpc/sync_all";
    pub const SYNC: &str = "/rpc/sync";
    pub const STATE_SYNC: &str = "/rpc/state_sync";
    pub const RECOVER: &str = "/rpc/recover";
    pub const TRACK: &str = "/rpc/track";
    pub const UNTRACK: &str = "/rpc/untrack";
    pub const PEER_MANAGER_PEERS: &str = "/rpc/peer_manager_peers";

    pub const LOCAL_STATUS: &str = "/rpc/local/status";
    pub const LOCAL_SYNC: &str = "/rpc/local/sync";
    pub const LOCAL_RECOVER: &str = "/rpc/local/recover";
    pub const LOCAL_STATUS_ALL: &str = "/rpc/local/status_all";
    pub const LOCAL_SYNC_ALL: &str = "/rpc/local/sync_all";

    pub const HEALTH: &str = "/health";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CidRequest {
    pub cid: ContentId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressRequest {
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerIdRequest {
    pub peer_id: PeerId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
}

/// Body of every error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub error: String,
}

pub type SharedService = Arc<ClusterService>;

/// Create the RPC router
pub fn create_router(service: SharedService) -> Router {
    Router::new()
        // Public surface
        .route(paths::PIN, post(routes::pin))
        .route(paths::UNPIN, post(routes::unpin))
        .route(paths::PIN_LIST, post(routes::pin_list))
        .route(paths::ID, post(routes::id))
        .route(paths::VERSION, post(routes::version))
        .route(paths::PEERS, post(routes::peers))
        .route(paths::PEER_ADD, post(routes::peer_add))
        .route(paths::PEER_REMOVE, post(routes::peer_remove))
        .route(paths::STATUS_ALL, post(routes::status_all))
        .route(paths::STATUS, post(routes::status))
        .route(paths::SYNC_ALL, post(routes::sync_all))
        .route(paths::SYNC, post(routes::sync))
        .route(paths::STATE_SYNC, post(routes::state_sync))
        .route(paths::RECOVER, post(routes::recover))
        .route(paths::TRACK, post(routes::track))
        .route(paths::UNTRACK, post(routes::untrack))
        .route(paths::PEER_MANAGER_PEERS, post(routes::peer_manager_peers))
        // Peer-internal surface
        .route(paths::LOCAL_STATUS, post(routes::local_status))
        .route(paths::LOCAL_SYNC, post(routes::local_sync))
        .route(paths::LOCAL_RECOVER, post(routes::local_recover))
        .route(paths::LOCAL_STATUS_ALL, post(routes::local_status_all))
        .route(paths::LOCAL_SYNC_ALL, post(routes::local_sync_all))
        // Health check
        .route(paths::HEALTH, get(routes::health))
        .with_state(service)
}

/// Serve the RPC API on an already bound listener until the server stops
pub async fn serve(
    listener: tokio::net::TcpListener,
    service: SharedService,
) -> std::io::Result<()> {
    axum::serve(listener, create_router(service)).await
}
