//! TCP front end for one active-cluster node.
//!
//! This protocol is strictly one request then one reply per line, so a
//! single task per connection reads, dispatches, and writes back without
//! needing to split into separate read/write tasks or multiplex anything.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};

use crate::file_store::WriteMode;
use crate::wire::{Command, Frame};

use super::ActiveCluster;

/// Binds `addr` and serves connections until the process exits.
pub async fn run_server(addr: &str, cluster: Arc<ActiveCluster>) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr, node = %cluster.self_id, "cluster node listening");
    loop {
        let (socket, peer_addr) = listener.accept().await?;
        let cluster = Arc::clone(&cluster);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, &cluster).await {
                warn!(peer = %peer_addr, error = %e, "connection ended with error");
            }
        });
    }
}

async fn handle_connection(
    socket: TcpStream,
    cluster: &Arc<ActiveCluster>,
) -> std::io::Result<()> {
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
            Ok(frame) => ClusterHandler::new(cluster).dispatch(frame).await,
            Err(e) => Frame::new(Command::Error).with_content(e.to_string()),
        };

        let out = format!("{}\n", reply.serialize());
        write_half.write_all(out.as_bytes()).await?;
        write_half.flush().await?;
    }
}

/// Dispatches one parsed [`Frame`] against an [`ActiveCluster`] and
/// produces the reply frame.
pub struct ClusterHandler<'a> {
    cluster: &'a Arc<ActiveCluster>,
}

impl<'a> ClusterHandler<'a> {
    pub fn new(cluster: &'a Arc<ActiveCluster>) -> Self {
        Self { cluster }
    }

    pub async fn dispatch(&self, frame: Frame) -> Frame {
        match frame.command {
            Command::Write => self.handle_write(frame).await,
            Command::Delete => self.handle_delete(frame).await,
            Command::Read => self.handle_read(frame).await,
            Command::List => self.handle_list().await,
            Command::LockRequest => self.handle_lock_request(frame),
            Command::LockReleased => self.handle_lock_released(frame),
            Command::OperationCommit => self.handle_commit(frame).await,
            Command::Heartbeat => Frame::new(Command::Success),
            _ => Frame::new(Command::Error).with_content("unsupported command here"),
        }
    }

    async fn handle_write(&self, frame: Frame) -> Frame {
        let (Some(name), Some(content)) = (frame.filename, frame.content) else {
            return Frame::new(Command::Error).with_content("WRITE requires filename and content");
        };
        match self.cluster.apply_write(&name, content.as_bytes(), WriteMode::Overwrite).await {
            Ok(()) => Frame::new(Command::Success).with_filename(name),
            Err(e) => {
                debug!(file = name, error = %e, "write failed");
                Frame::new(Command::Error).with_filename(name).with_content(e.to_string())
            }
        }
    }

    async fn handle_delete(&self, frame: Frame) -> Frame {
        let Some(name) = frame.filename else {
            return Frame::new(Command::Error).with_content("DELETE requires filename");
        };
        match self.cluster.apply_delete(&name).await {
            Ok(()) => Frame::new(Command::Success).with_filename(name),
            Err(e) => Frame::new(Command::Error).with_filename(name).with_content(e.to_string()),
        }
    }

    async fn handle_read(&self, frame: Frame) -> Frame {
        let Some(name) = frame.filename else {
            return Frame::new(Command::Error).with_content("READ requires filename");
        };
        match self.cluster.store().read(&name).await {
            Ok(bytes) => Frame::new(Command::Success)
                .with_filename(&name)
                .with_content(String::from_utf8_lossy(&bytes).into_owned()),
            Err(crate::error::FileStoreError::NotFound(_)) => {
                Frame::new(Command::NotFound).with_filename(name)
            }
            Err(e) => Frame::new(Command::Error).with_filename(name).with_content(e.to_string()),
        }
    }

    async fn handle_list(&self) -> Frame {
        match self.cluster.store().list().await {
            Ok(entries) => {
                let names = entries.into_iter().map(|e| e.name).collect::<Vec<_>>().join(",");
                Frame::new(Command::Success).with_content(names)
            }
            Err(e) => Frame::new(Command::Error).with_content(e.to_string()),
        }
    }

    fn handle_lock_request(&self, frame: Frame) -> Frame {
        let Some(resource) = frame.filename else {
            return Frame::new(Command::Error).with_content("LOCK_REQUEST requires filename");
        };
        if self.cluster.handle_lock_request(&resource) {
            Frame::new(Command::LockGranted).with_filename(resource)
        } else {
            Frame::new(Command::LockDenied).with_filename(resource)
        }
    }

    fn handle_lock_released(&self, frame: Frame) -> Frame {
        if let Some(resource) = frame.filename {
            self.cluster.handle_lock_released(&resource);
        }
        Frame::new(Command::Success)
    }

    async fn handle_commit(&self, frame: Frame) -> Frame {
        let Some(name) = frame.filename else {
            return Frame::new(Command::OperationFailed).with_content("missing filename");
        };
        let fence: u64 = frame.timestamp.as_deref().and_then(|s| s.parse().ok()).unwrap_or(0);
        let content = match frame.content.as_deref() {
            Some(super::wire_fanout::DELETE_SENTINEL) => None,
            Some(text) => Some(text.as_bytes()),
            None => None,
        };
        match self.cluster.handle_remote_commit(&name, content, fence).await {
            Ok(()) => Frame::new(Command::OperationCommitted).with_filename(name),
            Err(e) => Frame::new(Command::OperationFailed)
                .with_filename(name)
                .with_content(e.to_string()),
        }
    }
}
