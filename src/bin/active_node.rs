//! CLI entry point for one `ActiveCluster` node.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use quorumfs::cluster::{spawn_health_check, run_server, ActiveCluster, PeerAddress};
use quorumfs::config::NodeConfig;
use quorumfs::file_store::FileStore;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "active-node", about = "Peer-symmetric active cluster node")]
struct Args {
    /// Node id, used in lock ownership and fencing records.
    #[arg(long)]
    id: String,

    /// Host:port to listen on for both clients and peers.
    #[arg(long, default_value = "127.0.0.1:7000")]
    listen: String,

    /// Directory this node stores files in.
    #[arg(long)]
    storage_dir: PathBuf,

    /// A known peer as `id@host:port`, repeatable.
    #[arg(long = "peer")]
    peers: Vec<String>,

    /// Optional TOML config file; CLI flags above take precedence only
    /// where this crate exposes a matching flag.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn parse_peer(spec: &str) -> Option<PeerAddress> {
    let (id, addr) = spec.split_once('@')?;
    let (host, port) = addr.split_once(':')?;
    Some(PeerAddress::new(id, host, port.parse().ok()?))
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match &args.config {
        Some(path) => NodeConfig::from_toml_file(path).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to load config, using defaults");
            NodeConfig::default()
        }),
        None => NodeConfig::default(),
    };

    let store =
        Arc::new(FileStore::open(args.storage_dir.clone(), config.replication.verify_writes).await?);
    let cluster = ActiveCluster::new(args.id.clone(), store, config);

    for spec in &args.peers {
        match parse_peer(spec) {
            Some(peer) => {
                info!(peer = %peer.internal_addr(), "adding peer");
                if let Err(e) = cluster.add_peer(peer).await {
                    tracing::warn!(error = %e, "initial peer sync failed");
                }
            }
            None => tracing::warn!(spec, "ignoring malformed --peer argument"),
        }
    }

    spawn_health_check(Arc::clone(&cluster));
    run_server(&args.listen, cluster).await
}
