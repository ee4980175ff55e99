//! Bounded per-peer connection pool with lease/return discipline (§5).

use std::time::Duration;

use dashmap::DashMap;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::error::ClusterError;
use crate::wire::Frame;

const DEFAULT_POOL_SIZE: usize = 3;

/// A leased connection; not returned to the pool if it is dropped without
/// calling [`PeerPool::return_conn`] (e.g. after an I/O error), so a
/// faulty connection is never reused.
pub struct LeasedConn {
    stream: TcpStream,
}

/// One bounded connection pool per peer address.
pub struct PeerPool {
    capacity: usize,
    pools: DashMap<String, Mutex<Vec<TcpStream>>>,
}

impl PeerPool {
    pub fn new() -> Self {
        Self { capacity: DEFAULT_POOL_SIZE, pools: DashMap::new() }
    }

    async fn lease(&self, addr: &str, timeout: Duration) -> Result<LeasedConn, ClusterError> {
        self.pools.entry(addr.to_string()).or_insert_with(|| Mutex::new(Vec::new()));
        let pooled_stream = {
            let slot = self.pools.get(addr).expect("just inserted");
            let mut pooled = slot.lock().await;
            pooled.pop()
        };
        if let Some(stream) = pooled_stream {
            return Ok(LeasedConn { stream });
        }
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ClusterError::PeerUnreachable(addr.to_string()))?
            .map_err(|e| ClusterError::PeerUnreachable(format!("{addr}: {e}")))?;
        Ok(LeasedConn { stream })
    }

    async fn give_back(&self, addr: &str, conn: LeasedConn) {
        if let Some(slot) = self.pools.get(addr) {
            let mut pooled = slot.lock().await;
            if pooled.len() < self.capacity {
                pooled.push(conn.stream);
            }
        }
    }

    /// Sends one frame to `addr` and waits for exactly one reply frame,
    /// within `timeout`. The connection is pooled on success and discarded
    /// on any I/O error.
    pub async fn request(
        &self,
        addr: &str,
        frame: &Frame,
        timeout: Duration,
    ) -> Result<Frame, ClusterError> {
        let mut conn = self.lease(addr, timeout).await?;
        let result = tokio::time::timeout(timeout, async {
            let line = format!("{}\n", frame.serialize());
            conn.stream.write_all(line.as_bytes()).await?;
            conn.stream.flush().await?;
            let mut reader = BufReader::new(&mut conn.stream);
            let mut response = String::new();
            reader.read_line(&mut response).await?;
            Ok::<_, std::io::Error>(response)
        })
        .await;

        match result {
            Ok(Ok(line)) if !line.trim_end().is_empty() => {
                let parsed = Frame::parse(line.trim_end()).map_err(|e| {
                    ClusterError::Protocol(format!("{addr}: {e}"))
                })?;
                self.give_back(addr, conn).await;
                Ok(parsed)
            }
            Ok(Ok(_)) => Err(ClusterError::PeerUnreachable(format!("{addr}: connection closed"))),
            Ok(Err(e)) => Err(ClusterError::PeerUnreachable(format!("{addr}: {e}"))),
            Err(_) => Err(ClusterError::PeerUnreachable(format!("{addr}: timed out"))),
        }
    }

    /// Sends one frame to `addr` without waiting for a reply (used for
    /// `LOCK_RELEASED`, which needs no ack).
    pub async fn notify(&self, addr: &str, frame: &Frame, timeout: Duration) {
        if let Ok(mut conn) = self.lease(addr, timeout).await {
            let line = format!("{}\n", frame.serialize());
            if conn.stream.write_all(line.as_bytes()).await.is_ok()
                && conn.stream.flush().await.is_ok()
            {
                self.give_back(addr, conn).await;
            }
        }
    }
}

impl Default for PeerPool {
    fn default() -> Self {
        Self::new()
    }
}
