//! Frame construction and parallel fan-out helpers shared by
//! [`super::lock::DistributedLockManager`] and [`super::ActiveCluster`].

use std::sync::Arc;
use std::time::Duration;

use crate::wire::{Command, Frame};

use super::client::PeerPool;
use super::{MutationKind, PeerAddress};

pub fn lock_request_frame(resource: &str, op: MutationKind, self_id: &str) -> Frame {
    Frame::new(Command::LockRequest)
        .with_filename(resource)
        .with_content(op.as_str())
        .with_client_id(self_id)
}

pub fn lock_released_frame(resource: &str, self_id: &str) -> Frame {
    Frame::new(Command::LockReleased).with_filename(resource).with_client_id(self_id)
}

/// `DELETE:` sentinel for the commit payload (§4.3 "Fan-out semantics").
pub const DELETE_SENTINEL: &str = "DELETE:";

pub fn commit_frame(
    name: &str,
    content: Option<&[u8]>,
    fence: u64,
    coordinator_id: &str,
) -> Frame {
    let frame = Frame::new(Command::OperationCommit)
        .with_filename(name)
        .with_timestamp(fence.to_string())
        .with_client_id(coordinator_id);
    match content {
        Some(bytes) => frame.with_content(String::from_utf8_lossy(bytes).into_owned()),
        None => frame.with_content(DELETE_SENTINEL),
    }
}

pub fn heartbeat_frame(self_id: &str) -> Frame {
    Frame::new(Command::Heartbeat).with_client_id(self_id)
}

/// Sends `frame` to every peer concurrently and collects replies within
/// `timeout`; a peer that errors or times out yields `None` at its index.
/// Each request runs on its own task so one slow peer cannot delay the
/// others; each request runs on its own task rather than being awaited
/// in sequence.
pub async fn request_all(
    pool: &Arc<PeerPool>,
    peers: &[PeerAddress],
    frame: Frame,
    timeout: Duration,
) -> Vec<Option<Frame>> {
    let mut handles = Vec::with_capacity(peers.len());
    for peer in peers {
        let pool = Arc::clone(pool);
        let frame = frame.clone();
        let addr = peer.internal_addr();
        handles.push(tokio::spawn(async move { pool.request(&addr, &frame, timeout).await.ok() }));
    }
    let mut replies = Vec::with_capacity(handles.len());
    for handle in handles {
        replies.push(handle.await.unwrap_or(None));
    }
    replies
}

/// Sends `frame` to every peer concurrently without waiting for replies.
pub async fn notify_all(pool: &Arc<PeerPool>, peers: &[PeerAddress], frame: Frame) {
    let mut handles = Vec::with_capacity(peers.len());
    for peer in peers {
        let pool = Arc::clone(pool);
        let frame = frame.clone();
        let addr = peer.internal_addr();
        handles.push(tokio::spawn(async move {
            pool.notify(&addr, &frame, Duration::from_millis(500)).await
        }));
    }
    for handle in handles {
        let _ = handle.await;
    }
}
