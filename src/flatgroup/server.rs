//! TCP front end for one flat-group node: a client-port listener serving
//! plain request lines, and an internal-port listener serving the group's
//! gossip/consensus control messages (§4.4 "Role").

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::warn;

use super::{FlatGroupCoordinator, Message};

/// Binds both the client port and the internal port and serves forever.
pub async fn run_servers(coordinator: Arc<FlatGroupCoordinator>) -> std::io::Result<()> {
    let client_addr = format!("{}:{}", coordinator.host, coordinator.client_port);
    let internal_addr = format!("{}:{}", coordinator.host, coordinator.internal_port);

    let client_listener = TcpListener::bind(&client_addr).await?;
    let internal_listener = TcpListener::bind(&internal_addr).await?;
    tracing::info!(client_addr, internal_addr, node = %coordinator.self_id, "flat-group node listening");

    let client_coordinator = Arc::clone(&coordinator);
    let client_task = tokio::spawn(async move {
        loop {
            match client_listener.accept().await {
                Ok((socket, _)) => {
                    let coordinator = Arc::clone(&client_coordinator);
                    tokio::spawn(async move {
                        if let Err(e) = handle_client_socket(socket, &coordinator).await {
                            warn!(error = %e, "client connection ended with error");
                        }
                    });
                }
                Err(e) => warn!(error = %e, "client accept failed"),
            }
        }
    });

    let internal_task = tokio::spawn(async move {
        loop {
            match internal_listener.accept().await {
                Ok((socket, _)) => {
                    let coordinator = Arc::clone(&coordinator);
                    tokio::spawn(async move {
                        if let Err(e) = handle_internal_socket(socket, &coordinator).await {
                            warn!(error = %e, "internal connection ended with error");
                        }
                    });
                }
                Err(e) => warn!(error = %e, "internal accept failed"),
            }
        }
    });

    let _ = tokio::join!(client_task, internal_task);
    Ok(())
}

async fn handle_client_socket(
    mut socket: TcpStream,
    coordinator: &Arc<FlatGroupCoordinator>,
) -> std::io::Result<()> {
    let (read_half, mut write_half) = socket.split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Ok(());
    }
    let req = line.trim_end();
    let decision = coordinator.handle_client_request(req).await;
    write_half.write_all(format!("{decision}\n").as_bytes()).await?;
    write_half.flush().await
}

async fn handle_internal_socket(
    socket: TcpStream,
    coordinator: &Arc<FlatGroupCoordinator>,
) -> std::io::Result<()> {
    let (read_half, mut write_half) = socket.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Ok(());
    }
    let trimmed = line.trim_end();
    let Some(msg) = Message::parse(trimmed) else {
        return Ok(());
    };

    match msg {
        Message::Join { id, port } => {
            let host = coordinator.host.clone();
            coordinator.handle_join(id, host, port);
        }
        Message::Leave { id } => coordinator.handle_leave(&id),
        Message::VoteRequest { from, req } => {
            coordinator.handle_vote_request(&from, &req).await;
        }
        Message::Vote { req, vote, .. } => coordinator.handle_vote(&req, &vote),
        Message::ForwardRequest { req } => {
            let decision = coordinator.run_consensus_round(&req).await;
            write_half.write_all(format!("{decision}\n").as_bytes()).await?;
            write_half.flush().await?;
        }
    }
    Ok(())
}
