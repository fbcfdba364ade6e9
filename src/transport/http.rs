//! HTTP/JSON peer transport
//!
//! Client side of the routes served by [`crate::api`]. Addresses are
//! `host:port` or full `http(s)://` base URLs.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use super::{PeerTransport, TransportError, TransportResult};
use crate::api::{paths, CidRequest, ErrorBody};
use crate::types::{ClusterIdentity, ContentId, PinInfo};

#[derive(Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    fn url(address: &str, path: &str) -> String {
        let base = address.trim_end_matches('/');
        if base.starts_with("http://") || base.starts_with("https://") {
            format!("{}{}", base, path)
        } else {
            format!("http://{}{}", base, path)
        }
    }

    async fn call<B, T>(
        &self,
        address: &str,
        path: &str,
        body: &B,
        cid: Option<&ContentId>,
    ) -> TransportResult<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = Self::url(address, path);
        debug!(%url, "Peer RPC call");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout {
                        address: address.to_string(),
                    }
                } else {
                    TransportError::Unreachable {
                        address: address.to_string(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.json::<ErrorBody>().await.ok();
            return Err(match (body, cid) {
                (Some(body), Some(cid)) if body.kind == "not_tracked" => {
                    TransportError::NotTracked(cid.clone())
                }
                (Some(body), _) => TransportError::Rejected {
                    address: address.to_string(),
                    reason: body.error,
                },
                (None, _) => TransportError::Rejected {
                    address: address.to_string(),
                    reason: format!("HTTP {}", status),
                },
            });
        }

        response.json::<T>().await.map_err(|e| TransportError::Decode {
            address: address.to_string(),
            reason: e.to_string(),
        })
    }

    async fn call_cid(
        &self,
        address: &str,
        path: &str,
        cid: &ContentId,
    ) -> TransportResult<PinInfo> {
        let body = CidRequest { cid: cid.clone() };
        self.call(address, path, &body, Some(cid)).await
    }
}

#[async_trait]
impl PeerTransport for HttpTransport {
    async fn id(&self, address: &str) -> TransportResult<ClusterIdentity> {
        let mut identity: ClusterIdentity = self
            .call(address, paths::ID, &serde_json::json!({}), None)
            .await?;

        if identity.address.is_none() {
            identity.address = Some(address.to_string());
        }
        Ok(identity)
    }

    async fn local_status(&self, address: &str, cid: &ContentId) -> TransportResult<PinInfo> {
        self.call_cid(address, paths::LOCAL_STATUS, cid).await
    }

    async fn local_sync(&self, address: &str, cid: &ContentId) -> TransportResult<PinInfo> {
        self.call_cid(address, paths::LOCAL_SYNC, cid).await
    }

    async fn local_recover(&self, address: &str, cid: &ContentId) -> TransportResult<PinInfo> {
        self.call_cid(address, paths::LOCAL_RECOVER, cid).await
    }

    async fn local_status_all(&self, address: &str) -> TransportResult<Vec<PinInfo>> {
        self.call(address, paths::LOCAL_STATUS_ALL, &serde_json::json!({}), None)
            .await
    }

    async fn local_sync_all(&self, address: &str) -> TransportResult<Vec<PinInfo>> {
        self.call(address, paths::LOCAL_SYNC_ALL, &serde_json::json!({}), None)
            .await
    }
}
