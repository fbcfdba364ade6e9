//! elohim-cluster: cluster pin tracker daemon
//!
//! Tracks pins in the local storage node and serves cluster-wide pin status
//! over HTTP/JSON.

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use elohim_cluster::{
    api, service::storage_identity, ClusterService, Config, HttpTransport, IpfsConnector,
    MemoryStorage, NodeIdentity, StorageConnector,
};

#[derive(Parser)]
#[command(name = "elohim-cluster")]
#[command(about = "Pin tracking and cluster-wide pin status for Elohim nodes")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "elohim-cluster.toml")]
    config: String,

    /// Listen address (overrides config file)
    #[arg(long, env = "ELOHIM_CLUSTER_LISTEN")]
    listen: Option<String>,

    /// Node ID (overrides config file)
    #[arg(long, env = "ELOHIM_NODE_ID")]
    node_id: Option<String>,

    /// Peer address to join at startup (repeatable)
    #[arg(long = "bootstrap")]
    bootstrap: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("elohim_cluster=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    info!("Starting elohim-cluster v{}", env!("CARGO_PKG_VERSION"));
    info!("Config file: {}", cli.config);

    let mut config = if Path::new(&cli.config).exists() {
        Config::load(&cli.config)?
    } else {
        info!("Config file not found, using defaults");
        Config::default()
    };

    // Apply CLI overrides
    if let Some(listen) = cli.listen {
        config.node.listen_addr = listen;
    }
    if let Some(node_id) = cli.node_id {
        config.node.id = Some(node_id);
    }
    config.cluster.bootstrap_peers.extend(cli.bootstrap);

    let peer_id = config.resolve_peer_id()?;

    let storage: Arc<dyn StorageConnector> = match &config.storage.ipfs_api_url {
        Some(url) => {
            info!(%url, "Using IPFS storage");
            Arc::new(IpfsConnector::new(url.clone()))
        }
        None => {
            warn!("No IPFS API configured, pins are kept in memory only");
            Arc::new(MemoryStorage::default())
        }
    };

    let mut identity =
        NodeIdentity::new(peer_id).with_storage(storage_identity(storage.as_ref()).await);
    if let Some(address) = &config.node.advertise_addr {
        identity = identity.with_address(address.clone());
    }

    let service = Arc::new(ClusterService::new(
        identity,
        storage,
        Arc::new(HttpTransport::new()),
        config.failure_policy(),
        config.rpc_timeout(),
    ));

    info!(peer_id = %service.identity().peer_id, "Node identity");

    if let Some(interval) = config.sync_interval() {
        info!(interval_secs = interval.as_secs(), "Starting periodic pin sync");
        tokio::spawn(service.tracker().run_periodic_sync(interval));
    }

    let listener = tokio::net::TcpListener::bind(&config.node.listen_addr).await?;
    info!("RPC API listening on {}", listener.local_addr()?);

    // Join bootstrap peers without holding up the listener
    let bootstrap = service.clone();
    let bootstrap_peers = config.cluster.bootstrap_peers.clone();
    tokio::spawn(async move {
        let joins = bootstrap_peers.iter().map(|address| {
            let service = bootstrap.clone();
            async move {
                match service.peer_add(address).await {
                    Ok(peer) => info!(%address, peer_id = %peer.id, "Joined bootstrap peer"),
                    Err(e) => warn!(%address, error = %e, "Failed to add bootstrap peer"),
                }
            }
        });
        futures::future::join_all(joins).await;
    });

    api::serve(listener, service).await?;

    Ok(())
}
