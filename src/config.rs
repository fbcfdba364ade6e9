//! Configuration for elohim-cluster

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::policy::{AcceptAll, FailurePolicy, RejectSet};
use crate::types::{ContentId, PeerId};

/// Configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub fault_injection: FaultInjectionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Peer id; generated at startup when absent
    #[serde(default)]
    pub id: Option<String>,
    /// Address the RPC API listens on
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Address other peers should use to reach this node
    #[serde(default)]
    pub advertise_addr: Option<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: None,
            listen_addr: default_listen_addr(),
            advertise_addr: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Peer addresses added at startup
    #[serde(default)]
    pub bootstrap_peers: Vec<String>,
    /// Per-peer call timeout
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,
    /// Background tracker sync interval (0 = disabled)
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            bootstrap_peers: Vec::new(),
            rpc_timeout_ms: default_rpc_timeout_ms(),
            sync_interval_secs: default_sync_interval(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// IPFS HTTP API, e.g. `http://127.0.0.1:5001`. In-memory storage when unset.
    #[serde(default)]
    pub ipfs_api_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FaultInjectionConfig {
    /// Content ids every operation refuses
    #[serde(default)]
    pub rejected_cids: Vec<ContentId>,
}

fn default_listen_addr() -> String {
    "0.0.0.0:9094".to_string()
}

fn default_rpc_timeout_ms() -> u64 {
    5000
}

fn default_sync_interval() -> u64 {
    60
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Configured peer id, or a fresh random one
    pub fn resolve_peer_id(&self) -> Result<PeerId> {
        match &self.node.id {
            Some(id) => id
                .parse()
                .map_err(|_| Error::Config(format!("invalid node id {:?}", id))),
            None => Ok(PeerId::random()),
        }
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.cluster.rpc_timeout_ms)
    }

    pub fn sync_interval(&self) -> Option<Duration> {
        match self.cluster.sync_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Failure policy built from `[fault_injection]`
    pub fn failure_policy(&self) -> Arc<dyn FailurePolicy> {
        if self.fault_injection.rejected_cids.is_empty() {
            Arc::new(AcceptAll)
        } else {
            Arc::new(RejectSet::new(self.fault_injection.rejected_cids.iter().cloned()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.node.listen_addr, "0.0.0.0:9094");
        assert_eq!(config.rpc_timeout(), Duration::from_secs(5));
        assert_eq!(config.sync_interval(), Some(Duration::from_secs(60)));
        assert!(config.storage.ipfs_api_url.is_none());
        assert!(!config.failure_policy().rejects(&ContentId::new("QmAny")));
    }

    #[test]
    fn test_zero_interval_disables_sync() {
        let config = Config::parse("[cluster]\nsync_interval_secs = 0\n").unwrap();
        assert_eq!(config.sync_interval(), None);
    }

    #[test]
    fn test_rejected_cids_feed_policy() {
        let config = Config::parse("[fault_injection]\nrejected_cids = [\"QmBad\"]\n").unwrap();
        let policy = config.failure_policy();

        assert!(policy.rejects(&ContentId::new("QmBad")));
        assert!(!policy.rejects(&ContentId::new("QmGood")));
    }

    #[test]
    fn test_node_id() {
        let config = Config::parse("[node]\nid = \"peer-7\"\n").unwrap();
        assert_eq!(config.resolve_peer_id().unwrap(), PeerId::new("peer-7"));

        let blank = Config::parse("[node]\nid = \"  \"\n").unwrap();
        assert!(matches!(blank.resolve_peer_id(), Err(Error::Config(_))));

        let generated = Config::default();
        assert_ne!(
            generated.resolve_peer_id().unwrap(),
            generated.resolve_peer_id().unwrap()
        );
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        assert!(matches!(Config::parse("[node"), Err(Error::Config(_))));
    }
}
