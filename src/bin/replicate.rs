//! CLI entry point for a master node running one of the three
//! `ReplicationEngine` consistency modes, fronted by the same pipe-framed
//! wire protocol as `active-node`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use quorumfs::config::NodeConfig;
use quorumfs::error::FileStoreError;
use quorumfs::file_store::{FileStore, WriteMode};
use quorumfs::replication::ConsistencyMode;
use quorumfs::wire::{Command, Frame};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::warn;

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ModeArg {
    Strict,
    Continuous,
    Lazy,
}

#[derive(Parser, Debug)]
#[command(name = "replicate", about = "Master/replica file propagation node")]
struct Args {
    #[arg(long, default_value = "127.0.0.1:7100")]
    listen: String,

    #[arg(long)]
    storage_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = ModeArg::Lazy)]
    mode: ModeArg,

    /// A replica directory as `id=path`, repeatable.
    #[arg(long = "replica")]
    replicas: Vec<String>,

    #[arg(long, default_value_t = 1000)]
    poll_interval_ms: u64,

    #[arg(long)]
    config: Option<PathBuf>,
}

fn parse_replica(spec: &str) -> Option<(String, PathBuf)> {
    let (id, path) = spec.split_once('=')?;
    Some((id.to_string(), PathBuf::from(path)))
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match &args.config {
        Some(path) => NodeConfig::from_toml_file(path).unwrap_or_default(),
        None => NodeConfig::default(),
    };

    let master =
        Arc::new(FileStore::open(args.storage_dir.clone(), config.replication.verify_writes).await?);
    let poll_interval = Duration::from_millis(args.poll_interval_ms);
    let mode = match args.mode {
        ModeArg::Strict => ConsistencyMode::Strict { poll_interval },
        ModeArg::Continuous => ConsistencyMode::Continuous { interval: poll_interval },
        ModeArg::Lazy => ConsistencyMode::Lazy { poll_interval },
    };

    let engine = quorumfs::replication::ReplicationEngine::new(master.clone(), mode);
    for spec in &args.replicas {
        match parse_replica(spec) {
            Some((id, path)) => {
                if let Err(e) = engine.add_replica(id, path).await {
                    warn!(error = %e, "failed to register replica");
                }
            }
            None => warn!(spec, "ignoring malformed --replica argument"),
        }
    }
    engine.spawn().await;

    let listener = TcpListener::bind(&args.listen).await?;
    tracing::info!(addr = %args.listen, "replicate master listening");
    loop {
        let (socket, _) = listener.accept().await?;
        let master = Arc::clone(&master);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, master).await {
                warn!(error = %e, "connection ended with error");
            }
        });
    }
}

async fn handle_connection(socket: TcpStream, master: Arc<FileStore>) -> std::io::Result<()> {
    let (read_half, mut write_half) = socket.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    loop {
        line.clear();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return Ok(());
        }
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if trimmed.is_empty() {
            continue;
        }
        let reply = match Frame::parse(trimmed) {
            Ok(frame) => dispatch(frame, &master).await,
            Err(e) => Frame::new(Command::Error).with_content(e.to_string()),
        };
        write_half.write_all(format!("{}\n", reply.serialize()).as_bytes()).await?;
        write_half.flush().await?;
    }
}

async fn dispatch(frame: Frame, master: &Arc<FileStore>) -> Frame {
    match frame.command {
        Command::Write => {
            let (Some(name), Some(content)) = (frame.filename, frame.content) else {
                return Frame::new(Command::Error).with_content("WRITE requires filename and content");
            };
            match master.write(&name, content.as_bytes(), WriteMode::Overwrite).await {
                Ok(()) => Frame::new(Command::Success).with_filename(name),
                Err(e) => Frame::new(Command::Error).with_filename(name).with_content(e.to_string()),
            }
        }
        Command::Delete => {
            let Some(name) = frame.filename else {
                return Frame::new(Command::Error).with_content("DELETE requires filename");
            };
            match master.delete(&name).await {
                Ok(()) => Frame::new(Command::Success).with_filename(name),
                Err(e) => Frame::new(Command::Error).with_filename(name).with_content(e.to_string()),
            }
        }
        Command::Read => {
            let Some(name) = frame.filename else {
                return Frame::new(Command::Error).with_content("READ requires filename");
            };
            match master.read(&name).await {
                Ok(bytes) => Frame::new(Command::Success)
                    .with_filename(&name)
                    .with_content(String::from_utf8_lossy(&bytes).into_owned()),
                Err(FileStoreError::NotFound(_)) => Frame::new(Command::NotFound).with_filename(name),
                Err(e) => Frame::new(Command::Error).with_filename(name).with_content(e.to_string()),
            }
        }
        Command::List => match master.list().await {
            Ok(entries) => {
                let names = entries.into_iter().map(|e| e.name).collect::<Vec<_>>().join(",");
                Frame::new(Command::Success).with_content(names)
            }
            Err(e) => Frame::new(Command::Error).with_content(e.to_string()),
        },
        _ => Frame::new(Command::Error).with_content("unsupported command here"),
    }
}
