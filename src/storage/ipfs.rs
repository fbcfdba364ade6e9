//! IPFS HTTP API connector
//!
//! Talks to a Kubo-compatible daemon (`/api/v0/...`). `pin/add` blocks until
//! the content is fetched, so pin requests run in a background task and the
//! connector remembers which requests are still in flight or have failed.
//!
//! Every request carries a generation. A request that finishes after its
//! content was unpinned removes the pin it just created; one that was
//! superseded by a newer request leaves everything to the newer one.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{StorageConnector, StorageError, StorageStatus};
use crate::types::ContentId;

/// Timeout for quick API calls (id, pin/ls, pin/rm)
const API_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
enum PinRequest {
    InFlight { generation: u64 },
    /// Unpinned while in flight; the request undoes itself when it lands
    Cancelled { generation: u64 },
    Failed(StorageError),
}

#[derive(Deserialize)]
struct IdResponse {
    #[serde(rename = "ID")]
    id: String,
}

#[derive(Deserialize)]
struct PinLsResponse {
    #[serde(rename = "Keys", default)]
    keys: HashMap<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct ApiErrorResponse {
    #[serde(rename = "Message", default)]
    message: String,
}

pub struct IpfsConnector {
    client: reqwest::Client,
    api_url: String,
    requests: Arc<RwLock<HashMap<ContentId, PinRequest>>>,
    next_generation: AtomicU64,
}

impl IpfsConnector {
    /// Create a connector for the API at `api_url` (e.g. `http://127.0.0.1:5001`)
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            requests: Arc::new(RwLock::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/v0/{}", self.api_url, path)
    }

    /// Extract the daemon's error message from a failed response
    async fn api_error(response: reqwest::Response) -> String {
        let status = response.status();
        match response.json::<ApiErrorResponse>().await {
            Ok(body) if !body.message.is_empty() => body.message,
            _ => format!("HTTP {}", status),
        }
    }
}

/// `pin/rm`, treating "not pinned" as success
async fn remove_pin(
    client: &reqwest::Client,
    url: String,
    cid: &ContentId,
) -> Result<(), StorageError> {
    let response = client
        .post(url)
        .query(&[("arg", cid.as_str())])
        .timeout(API_TIMEOUT)
        .send()
        .await
        .map_err(unavailable)?;

    if response.status().is_success() {
        return Ok(());
    }

    let message = IpfsConnector::api_error(response).await;
    if is_not_pinned(&message) {
        Ok(())
    } else {
        Err(StorageError::Unavailable(message))
    }
}

fn unavailable(error: reqwest::Error) -> StorageError {
    StorageError::Unavailable(error.to_string())
}

fn is_not_pinned(message: &str) -> bool {
    message.contains("not pinned")
}

#[async_trait]
impl StorageConnector for IpfsConnector {
    async fn id(&self) -> Result<String, StorageError> {
        let response = self
            .client
            .post(self.endpoint("id"))
            .timeout(API_TIMEOUT)
            .send()
            .await
            .map_err(unavailable)?;

        if !response.status().is_success() {
            return Err(StorageError::Unavailable(Self::api_error(response).await));
        }

        let body: IdResponse = response.json().await.map_err(unavailable)?;
        Ok(body.id)
    }

    async fn pin(&self, cid: &ContentId) -> Result<(), StorageError> {
        // Held until the new request is registered so the task cannot land first
        let mut requests = self.requests.write().await;
        if matches!(requests.get(cid), Some(PinRequest::InFlight { .. })) {
            debug!(cid = %cid, "Pin request already in flight");
            return Ok(());
        }

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        requests.insert(cid.clone(), PinRequest::InFlight { generation });

        let client = self.client.clone();
        let add_url = self.endpoint("pin/add");
        let rm_url = self.endpoint("pin/rm");
        let shared = self.requests.clone();
        let cid = cid.clone();

        tokio::spawn(async move {
            let request = client.post(add_url).query(&[("arg", cid.as_str())]);
            let outcome = match request.send().await {
                Ok(response) if response.status().is_success() => None,
                Ok(response) => Some(StorageError::PinFailed(Self::api_error(response).await)),
                Err(e) => Some(unavailable(e)),
            };

            let mut requests = shared.write().await;
            let current = requests.get(&cid).cloned();
            match current {
                Some(PinRequest::InFlight { generation: current }) if current == generation => {
                    match outcome {
                        None => {
                            info!(cid = %cid, "IPFS pin complete");
                            requests.remove(&cid);
                        }
                        Some(error) => {
                            warn!(cid = %cid, error = %error, "IPFS pin failed");
                            requests.insert(cid, PinRequest::Failed(error));
                        }
                    }
                }
                Some(PinRequest::Cancelled { generation: current }) if current == generation => {
                    requests.remove(&cid);
                    drop(requests);
                    if outcome.is_none() {
                        debug!(cid = %cid, "Pin landed after unpin, removing it");
                        if let Err(e) = remove_pin(&client, rm_url, &cid).await {
                            warn!(cid = %cid, error = %e, "Failed to remove late pin");
                        }
                    }
                }
                _ => debug!(cid = %cid, generation, "Superseded pin request finished"),
            }
        });

        Ok(())
    }

    async fn unpin(&self, cid: &ContentId) -> Result<(), StorageError> {
        {
            let mut requests = self.requests.write().await;
            match requests.remove(cid) {
                Some(PinRequest::InFlight { generation })
                | Some(PinRequest::Cancelled { generation }) => {
                    requests.insert(cid.clone(), PinRequest::Cancelled { generation });
                }
                _ => {}
            }
        }

        remove_pin(&self.client, self.endpoint("pin/rm"), cid).await
    }

    async fn pin_status(&self, cid: &ContentId) -> Result<StorageStatus, StorageError> {
        match self.requests.read().await.get(cid) {
            Some(PinRequest::InFlight { .. }) => return Ok(StorageStatus::Pinning),
            Some(PinRequest::Cancelled { .. }) => return Ok(StorageStatus::Unpinned),
            Some(PinRequest::Failed(error)) => return Err(error.clone()),
            None => {}
        }

        let response = self
            .client
            .post(self.endpoint("pin/ls"))
            .query(&[("arg", cid.as_str()), ("type", "recursive")])
            .timeout(API_TIMEOUT)
            .send()
            .await
            .map_err(unavailable)?;

        if !response.status().is_success() {
            let message = Self::api_error(response).await;
            return if is_not_pinned(&message) {
                Ok(StorageStatus::Unpinned)
            } else {
                Err(StorageError::Unavailable(message))
            };
        }

        let body: PinLsResponse = response.json().await.map_err(unavailable)?;
        if body.keys.contains_key(cid.as_str()) {
            Ok(StorageStatus::Pinned)
        } else {
            Ok(StorageStatus::Unpinned)
        }
    }
}
