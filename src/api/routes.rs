//! RPC route handlers
//!
//! Thin wrappers: decode the body, call the service, encode the answer.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};

use super::{
    Ack, AddressRequest, CidRequest, ErrorBody, PeerIdRequest, SharedService, VersionResponse,
};
use crate::error::Error;
use crate::types::{ClusterIdentity, ContentId, GlobalPinInfo, PeerId, PinInfo};

/// Service error rendered as `{kind, error}` with a matching status code
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self(error)
    }
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self.0 {
            Error::BadContentId(_) => StatusCode::BAD_REQUEST,
            Error::NotTracked(_) => StatusCode::NOT_FOUND,
            Error::CannotRemoveLocalPeer(_) => StatusCode::CONFLICT,
            Error::Transport(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            kind: self.0.kind().to_string(),
            error: self.0.to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn ack() -> ApiResult<Ack> {
    Ok(Json(Ack { ok: true }))
}

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    "OK"
}

// === Public surface ===

/// POST /rpc/pin
pub async fn pin(
    State(service): State<SharedService>,
    Json(req): Json<CidRequest>,
) -> ApiResult<Ack> {
    service.pin(&req.cid).await?;
    ack()
}

/// POST /rpc/unpin
pub async fn unpin(
    State(service): State<SharedService>,
    Json(req): Json<CidRequest>,
) -> ApiResult<Ack> {
    service.unpin(&req.cid).await?;
    ack()
}

/// POST /rpc/pin_list
pub async fn pin_list(State(service): State<SharedService>) -> Json<Vec<ContentId>> {
    Json(service.pin_list().await)
}

/// POST /rpc/id
pub async fn id(State(service): State<SharedService>) -> Json<ClusterIdentity> {
    Json(service.id())
}

/// POST /rpc/version
pub async fn version(State(service): State<SharedService>) -> Json<VersionResponse> {
    Json(VersionResponse {
        version: service.version().to_string(),
    })
}

/// POST /rpc/peers
pub async fn peers(State(service): State<SharedService>) -> Json<Vec<ClusterIdentity>> {
    Json(service.peers().await)
}

/// POST /rpc/peer_add
pub async fn peer_add(
    State(service): State<SharedService>,
    Json(req): Json<AddressRequest>,
) -> ApiResult<ClusterIdentity> {
    Ok(Json(service.peer_add(&req.address).await?))
}

/// POST /rpc/peer_remove
pub async fn peer_remove(
    State(service): State<SharedService>,
    Json(req): Json<PeerIdRequest>,
) -> ApiResult<Ack> {
    service.peer_remove(&req.peer_id).await?;
    ack()
}

/// POST /rpc/status_all
pub async fn status_all(State(service): State<SharedService>) -> Json<Vec<GlobalPinInfo>> {
    Json(service.status_all().await)
}

/// POST /rpc/status
pub async fn status(
    State(service): State<SharedService>,
    Json(req): Json<CidRequest>,
) -> ApiResult<GlobalPinInfo> {
    Ok(Json(service.status(&req.cid).await?))
}

/// POST /rpc/sync_all
pub async fn sync_all(State(service): State<SharedService>) -> Json<Vec<GlobalPinInfo>> {
    Json(service.sync_all().await)
}

/// POST /rpc/sync
pub async fn sync(
    State(service): State<SharedService>,
    Json(req): Json<CidRequest>,
) -> ApiResult<GlobalPinInfo> {
    Ok(Json(service.sync(&req.cid).await?))
}

/// POST /rpc/state_sync
pub async fn state_sync(State(service): State<SharedService>) -> Json<Vec<PinInfo>> {
    Json(service.state_sync().await)
}

/// POST /rpc/recover
pub async fn recover(
    State(service): State<SharedService>,
    Json(req): Json<CidRequest>,
) -> ApiResult<GlobalPinInfo> {
    Ok(Json(service.recover(&req.cid).await?))
}

/// POST /rpc/track
pub async fn track(
    State(service): State<SharedService>,
    Json(req): Json<CidRequest>,
) -> ApiResult<Ack> {
    service.track(&req.cid).await?;
    ack()
}

/// POST /rpc/untrack
pub async fn untrack(
    State(service): State<SharedService>,
    Json(req): Json<CidRequest>,
) -> ApiResult<Ack> {
    service.untrack(&req.cid).await?;
    ack()
}

/// POST /rpc/peer_manager_peers
pub async fn peer_manager_peers(State(service): State<SharedService>) -> Json<Vec<PeerId>> {
    Json(service.peer_manager_peers().await)
}

// === Peer-internal surface ===

pub async fn local_status(
    State(service): State<SharedService>,
    Json(req): Json<CidRequest>,
) -> ApiResult<PinInfo> {
    Ok(Json(service.local_status(&req.cid).await?))
}

pub async fn local_sync(
    State(service): State<SharedService>,
    Json(req): Json<CidRequest>,
) -> ApiResult<PinInfo> {
    Ok(Json(service.local_sync(&req.cid).await?))
}

pub async fn local_recover(
    State(service): State<SharedService>,
    Json(req): Json<CidRequest>,
) -> ApiResult<PinInfo> {
    Ok(Json(service.local_recover(&req.cid).await?))
}

pub async fn local_status_all(State(service): State<SharedService>) -> Json<Vec<PinInfo>> {
    Json(service.local_status_all().await)
}

pub async fn local_sync_all(State(service): State<SharedService>) -> Json<Vec<PinInfo>> {
    Json(service.local_sync_all().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageError;
    use crate::transport::TransportError;

    #[test]
    fn test_error_status_codes() {
        let cid = ContentId::new("QmX");
        let cases = [
            (Error::BadContentId(cid.clone()), StatusCode::BAD_REQUEST),
            (Error::NotTracked(cid.clone()), StatusCode::NOT_FOUND),
            (
                Error::CannotRemoveLocalPeer(PeerId::new("me")),
                StatusCode::CONFLICT,
            ),
            (
                Error::Transport(TransportError::Timeout {
                    address: "x:1".into(),
                }),
                StatusCode::BAD_GATEWAY,
            ),
            (
                Error::Storage(StorageError::Unavailable("down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(ApiError(error).status_code(), expected);
        }
    }

    #[test]
    fn test_error_response_status() {
        let response = ApiError(Error::NotTracked(ContentId::new("QmX"))).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
