//! Status aggregator - merges per-peer pin views into one cluster view
//!
//! Every query is fanned out to the whole membership in parallel. The local
//! peer is answered by the tracker directly; remote peers go through the
//! transport, each call under its own timeout. Every member ends up in the
//! result:
//!
//! | peer outcome               | entry                     |
//! |----------------------------|---------------------------|
//! | answered                   | the peer's `PinInfo`      |
//! | does not track the content | `Unpinned`                |
//! | timeout / transport error  | `ClusterError` + reason   |
//!
//! Peers that disagree are reported as they are; nothing is reconciled.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::peers::{Member, PeerManager};
use crate::tracker::PinTracker;
use crate::transport::{PeerTransport, TransportError, TransportResult};
use crate::types::{ContentId, GlobalPinInfo, PinInfo};

/// Per-item query sent to each peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemQuery {
    Status,
    Sync,
    Recover,
}

/// Whole-pinset query sent to each peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BulkQuery {
    Status,
    Sync,
}

/// Why a peer has no answer, and when we gave up on it
#[derive(Debug, Clone)]
struct PeerFailure {
    reason: String,
    at: DateTime<Utc>,
}

enum ItemAnswer {
    Info(PinInfo),
    NotTracked,
    Failed(PeerFailure),
}

pub struct StatusAggregator {
    tracker: Arc<PinTracker>,
    peers: Arc<PeerManager>,
    transport: Arc<dyn PeerTransport>,
    rpc_timeout: Duration,
}

impl StatusAggregator {
    pub fn new(
        tracker: Arc<PinTracker>,
        peers: Arc<PeerManager>,
        transport: Arc<dyn PeerTransport>,
        rpc_timeout: Duration,
    ) -> Self {
        Self {
            tracker,
            peers,
            transport,
            rpc_timeout,
        }
    }

    /// Cluster-wide status of one content id
    pub async fn status(&self, cid: &ContentId) -> Result<GlobalPinInfo> {
        self.global_item(cid, ItemQuery::Status).await
    }

    /// Sync one content id on every peer and merge the results
    pub async fn sync(&self, cid: &ContentId) -> Result<GlobalPinInfo> {
        self.global_item(cid, ItemQuery::Sync).await
    }

    /// Recover one content id on every peer and merge the results
    pub async fn recover(&self, cid: &ContentId) -> Result<GlobalPinInfo> {
        self.global_item(cid, ItemQuery::Recover).await
    }

    /// Cluster-wide status of every locally tracked content id
    pub async fn status_all(&self) -> Vec<GlobalPinInfo> {
        self.global_all(BulkQuery::Status).await
    }

    /// Sync everything on every peer, then merge per locally tracked id
    pub async fn sync_all(&self) -> Vec<GlobalPinInfo> {
        self.global_all(BulkQuery::Sync).await
    }

    fn failure(&self, member: &Member, reason: String) -> PeerFailure {
        warn!(peer_id = %member.id(), %reason, "Peer failed during aggregation");
        PeerFailure {
            reason: Error::PeerUnreachable {
                peer: member.id().clone(),
                reason,
            }
            .to_string(),
            at: Utc::now(),
        }
    }

    /// Run a remote call under the configured timeout
    async fn remote<T, F>(&self, address: &str, call: F) -> TransportResult<T>
    where
        F: std::future::Future<Output = TransportResult<T>>,
    {
        match timeout(self.rpc_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                address: address.to_string(),
            }),
        }
    }

    async fn ask_item(&self, member: &Member, cid: &ContentId, query: ItemQuery) -> ItemAnswer {
        let result = match &member.address {
            None => {
                let local = match query {
                    ItemQuery::Status => self.tracker.status(cid).await,
                    ItemQuery::Sync => self.tracker.sync(cid).await,
                    ItemQuery::Recover => self.tracker.recover(cid).await,
                };
                match local {
                    Ok(info) => Ok(info),
                    Err(Error::NotTracked(_)) => return ItemAnswer::NotTracked,
                    Err(e) => Err(e.to_string()),
                }
            }
            Some(address) => {
                let call = async {
                    match query {
                        ItemQuery::Status => self.transport.local_status(address, cid).await,
                        ItemQuery::Sync => self.transport.local_sync(address, cid).await,
                        ItemQuery::Recover => self.transport.local_recover(address, cid).await,
                    }
                };
                match self.remote(address, call).await {
                    Ok(info) => Ok(info),
                    Err(TransportError::NotTracked(_)) => return ItemAnswer::NotTracked,
                    Err(e) => Err(e.to_string()),
                }
            }
        };

        match result {
            Ok(info) => ItemAnswer::Info(info),
            Err(reason) => ItemAnswer::Failed(self.failure(member, reason)),
        }
    }

    async fn ask_bulk(
        &self,
        member: &Member,
        query: BulkQuery,
    ) -> std::result::Result<HashMap<ContentId, PinInfo>, PeerFailure> {
        let infos = match &member.address {
            None => match query {
                BulkQuery::Status => self.tracker.state_sync().await,
                BulkQuery::Sync => self.tracker.sync_all().await,
            },
            Some(address) => {
                let call = async {
                    match query {
                        BulkQuery::Status => self.transport.local_status_all(address).await,
                        BulkQuery::Sync => self.transport.local_sync_all(address).await,
                    }
                };
                self.remote(address, call)
                    .await
                    .map_err(|e| self.failure(member, e.to_string()))?
            }
        };

        Ok(infos.into_iter().map(|info| (info.cid.clone(), info)).collect())
    }

    async fn global_item(&self, cid: &ContentId, query: ItemQuery) -> Result<GlobalPinInfo> {
        let members = self.peers.members().await;

        let answers = join_all(
            members
                .iter()
                .map(|member| async move { (member, self.ask_item(member, cid, query).await) }),
        )
        .await;

        let known_anywhere = answers
            .iter()
            .any(|(_, answer)| !matches!(answer, ItemAnswer::NotTracked));
        if !known_anywhere {
            return Err(Error::NotTracked(cid.clone()));
        }

        debug!(cid = %cid, ?query, peers = answers.len(), "Aggregated pin status");

        let entries = answers.into_iter().map(|(member, answer)| match answer {
            ItemAnswer::Info(info) => attribute(info, member, cid),
            ItemAnswer::NotTracked => PinInfo::unpinned(cid.clone(), member.id().clone()),
            ItemAnswer::Failed(failure) => failed_entry(&failure, member, cid),
        });

        Ok(GlobalPinInfo::from_entries(cid.clone(), entries))
    }

    async fn global_all(&self, query: BulkQuery) -> Vec<GlobalPinInfo> {
        let members = self.peers.members().await;

        let answers = join_all(
            members
                .iter()
                .map(|member| async move { (member, self.ask_bulk(member, query).await) }),
        )
        .await;

        let cids = self.tracker.cids().await;
        debug!(?query, pins = cids.len(), peers = answers.len(), "Aggregated pinset");

        cids.into_iter()
            .map(|cid| {
                let entries = answers.iter().map(|(member, answer)| match answer {
                    Ok(infos) => match infos.get(&cid) {
                        Some(info) => attribute(info.clone(), member, &cid),
                        None => PinInfo::unpinned(cid.clone(), member.id().clone()),
                    },
                    Err(failure) => failed_entry(failure, member, &cid),
                });
                GlobalPinInfo::from_entries(cid.clone(), entries)
            })
            .collect()
    }
}

/// Key an answer by the member it came from, whatever the peer claims
fn attribute(info: PinInfo, member: &Member, cid: &ContentId) -> PinInfo {
    PinInfo {
        cid: cid.clone(),
        peer: member.id().clone(),
        ..info
    }
}

fn failed_entry(failure: &PeerFailure, member: &Member, cid: &ContentId) -> PinInfo {
    PinInfo {
        ts: failure.at,
        ..PinInfo::cluster_error(cid.clone(), member.id().clone(), failure.reason.clone())
    }
}
