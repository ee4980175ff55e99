//! CLI entry point for one `FlatGroupCoordinator` node, plus a one-shot
//! client mode for sending a request with failover against a known port
//! list (`--client`).

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use quorumfs::config::NodeConfig;
use quorumfs::flatgroup::{request_with_failover, BootstrapPeer, FaultConfig, FlatGroupCoordinator};

#[derive(Parser, Debug)]
#[command(name = "flat-node", about = "Leaderless flat-group coordinator node")]
struct Args {
    #[arg(long)]
    id: String,

    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long)]
    internal_port: u16,

    #[arg(long)]
    client_port: u16,

    /// A bootstrap peer as `host:internal_port`, repeatable.
    #[arg(long = "peer")]
    peers: Vec<String>,

    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = 0.0)]
    connection_failure_rate: f64,
    #[arg(long, default_value_t = 0.0)]
    incorrect_response_rate: f64,
    #[arg(long, default_value_t = 0)]
    base_delay_ms: u64,
    #[arg(long, default_value_t = 0)]
    max_delay_ms: u64,

    /// Instead of starting a node, send one request with client-side
    /// failover against `--client-ports` and print the decision.
    #[arg(long)]
    client: Option<String>,

    #[arg(long = "client-port", value_delimiter = ',')]
    client_ports: Vec<u16>,

    #[arg(long, default_value_t = 3)]
    max_retries: u32,
}

fn parse_bootstrap_peer(spec: &str) -> Option<(String, u16)> {
    let (host, port) = spec.split_once(':')?;
    Some((host.to_string(), port.parse().ok()?))
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Some(req) = args.client {
        let (decision, stats) = request_with_failover(
            &args.host,
            &args.client_ports,
            &req,
            args.max_retries,
            Duration::from_secs(5),
        )
        .await;
        match decision {
            Some(decision) => println!("{decision}"),
            None => eprintln!("no reachable coordinator after {} attempts: {stats:?}", stats.attempts),
        }
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => NodeConfig::from_toml_file(path).unwrap_or_default(),
        None => NodeConfig::default(),
    };

    let fault = FaultConfig {
        base_delay_ms: args.base_delay_ms,
        max_delay_ms: args.max_delay_ms,
        connection_failure_rate: args.connection_failure_rate,
        incorrect_response_rate: args.incorrect_response_rate,
    };

    let coordinator = FlatGroupCoordinator::new(
        args.id,
        args.host,
        args.internal_port,
        args.client_port,
        fault,
        config,
    );

    let bootstrap_peers: Vec<BootstrapPeer> = args
        .peers
        .iter()
        .filter_map(|spec| parse_bootstrap_peer(spec))
        .map(|(host, internal_port)| BootstrapPeer { host, internal_port })
        .collect();
    coordinator.bootstrap(&bootstrap_peers).await;
    coordinator.spawn_announce_loop(Duration::from_secs(3));

    quorumfs::flatgroup::run_servers(coordinator).await
}
