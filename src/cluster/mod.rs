//! Peer-symmetric active cluster: every node accepts client writes,
//! acquires a distributed lock, applies locally, then fans the mutation
//! out to every other peer before replying to the client (§4.3).

mod client;
mod health;
mod lock;
mod server;
mod wire_fanout;

pub use client::PeerPool;
pub use health::spawn_health_check;
pub use lock::{DistributedLockManager, GrantPolicy, LockRecord};
pub use server::{run_server, ClusterHandler};

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{info, warn};

use crate::config::NodeConfig;
use crate::error::ClusterError;
use crate::file_store::{FileStore, WriteMode};

/// A peer node's address and cluster-visible id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerAddress {
    pub id: String,
    pub host: String,
    pub port: u16,
}

impl PeerAddress {
    pub fn new(id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self { id: id.into(), host: host.into(), port }
    }

    pub fn internal_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Which filesystem mutation a lock acquisition guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Write,
    Delete,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Write => "WRITE",
            MutationKind::Delete => "DELETE",
        }
    }
}

/// One node of a peer-symmetric active cluster.
pub struct ActiveCluster {
    pub self_id: String,
    store: Arc<FileStore>,
    peers: DashMap<String, PeerAddress>,
    lock_mgr: DistributedLockManager,
    pool: Arc<PeerPool>,
    config: NodeConfig,
}

impl ActiveCluster {
    pub fn new(self_id: impl Into<String>, store: Arc<FileStore>, config: NodeConfig) -> Arc<Self> {
        let self_id = self_id.into();
        Arc::new(Self {
            lock_mgr: DistributedLockManager::new(self_id.clone()),
            self_id,
            store,
            peers: DashMap::new(),
            pool: Arc::new(PeerPool::new()),
            config,
        })
    }

    /// Adds a peer to this node's membership view and performs the initial
    /// full-copy sync described in §4.3 "Adding a peer": every file this
    /// node currently holds is pushed to the new peer via `OPERATION_COMMIT`
    /// so the new peer starts with a consistent snapshot.
    pub async fn add_peer(self: &Arc<Self>, peer: PeerAddress) -> Result<(), ClusterError> {
        let addr = peer.internal_addr();
        self.peers.insert(peer.id.clone(), peer);
        let files = self.store.all_metadata().await?;
        for name in files.keys() {
            let bytes = self.store.read(name).await?;
            let frame = wire_fanout::commit_frame(name, Some(&bytes), 0, &self.self_id);
            if self.pool.request(&addr, &frame, self.config.timeout.sync()).await.is_err() {
                warn!(peer = addr, file = name, "initial sync push failed");
            }
        }
        Ok(())
    }

    pub fn remove_peer(&self, id: &str) {
        self.peers.remove(id);
    }

    fn peer_list(&self) -> Vec<PeerAddress> {
        self.peers.iter().map(|p| p.value().clone()).collect()
    }

    fn grant_policy(&self) -> GrantPolicy {
        if self.config.consensus.require_unanimity {
            GrantPolicy::Unanimous
        } else {
            GrantPolicy::Majority
        }
    }

    /// The full client-write state machine from §4.3: ACQUIRE_LOCK ->
    /// LOCAL_APPLY -> FAN_OUT -> RELEASE_LOCK -> REPLY_OK. Falls back to a
    /// direct best-effort copy to unreachable peers if fan-out leaves any
    /// peer uncommitted.
    pub async fn apply_write(
        self: &Arc<Self>,
        name: &str,
        content: &[u8],
        mode: WriteMode,
    ) -> Result<(), ClusterError> {
        self.apply_mutation(name, Some(content), mode).await
    }

    pub async fn apply_delete(self: &Arc<Self>, name: &str) -> Result<(), ClusterError> {
        self.apply_mutation(name, None, WriteMode::Overwrite).await
    }

    async fn apply_mutation(
        self: &Arc<Self>,
        name: &str,
        content: Option<&[u8]>,
        mode: WriteMode,
    ) -> Result<(), ClusterError> {
        let peers = self.peer_list();
        let kind = if content.is_some() { MutationKind::Write } else { MutationKind::Delete };

        let fence = self
            .lock_mgr
            .acquire(name, kind, &peers, &self.pool, self.grant_policy(), self.config.timeout.lock())
            .await?;

        let apply_result = match content {
            Some(bytes) => self.store.write(name, bytes, mode).await,
            None => self.store.delete(name).await,
        };
        if let Err(e) = apply_result {
            self.lock_mgr.release(name, &peers, &self.pool).await;
            return Err(ClusterError::Store(e));
        }
        self.lock_mgr.record_applied_fence(name, fence);

        let outcome = self.fan_out(name, content, fence, &peers).await;
        self.lock_mgr.release(name, &peers, &self.pool).await;

        if outcome.committed < outcome.total && outcome.total > 0 {
            warn!(
                file = name,
                committed = outcome.committed,
                total = outcome.total,
                "fan-out partial, falling back to direct copy for stragglers"
            );
            self.direct_copy_fallback(name, content, fence, &outcome.unreachable_peers).await;
        }
        Ok(())
    }

    /// Sends `OPERATION_COMMIT` to every peer and tallies acks within the
    /// configured sync timeout.
    async fn fan_out(
        &self,
        name: &str,
        content: Option<&[u8]>,
        fence: u64,
        peers: &[PeerAddress],
    ) -> FanOutOutcome {
        if peers.is_empty() {
            return FanOutOutcome::default();
        }
        let frame = wire_fanout::commit_frame(name, content, fence, &self.self_id);
        let replies =
            wire_fanout::request_all(&self.pool, peers, frame, self.config.timeout.sync()).await;

        let mut committed = 0usize;
        let mut unreachable_peers = Vec::new();
        for (peer, reply) in peers.iter().zip(replies.iter()) {
            match reply {
                Some(f) if f.command == crate::wire::Command::OperationCommitted => committed += 1,
                _ => unreachable_peers.push(peer.clone()),
            }
        }
        FanOutOutcome { committed, total: peers.len(), unreachable_peers }
    }

    /// Best-effort direct copy to peers the fan-out round could not reach,
    /// Idempotent: resent
    /// via `OPERATION_COMMIT` with the same fence, so a peer that actually
    /// did receive the original commit just re-applies the same bytes.
    async fn direct_copy_fallback(
        &self,
        name: &str,
        content: Option<&[u8]>,
        fence: u64,
        peers: &[PeerAddress],
    ) {
        let frame = wire_fanout::commit_frame(name, content, fence, &self.self_id);
        for peer in peers {
            let addr = peer.internal_addr();
            match self.pool.request(&addr, &frame, self.config.timeout.sync()).await {
                Ok(_) => info!(peer = addr, file = name, "direct-copy fallback committed"),
                Err(e) => warn!(peer = addr, file = name, error = %e, "direct-copy fallback failed"),
            }
        }
    }

    /// Handles an inbound `OPERATION_COMMIT` from a peer coordinator:
    /// rejects a fence that is behind what this node already applied for
    /// `name` (stale-commit protection), otherwise
    /// applies the mutation and records the new fence.
    pub async fn handle_remote_commit(
        &self,
        name: &str,
        content: Option<&[u8]>,
        fence: u64,
    ) -> Result<(), ClusterError> {
        if !self.lock_mgr.accepts_fence(name, fence) {
            return Err(ClusterError::StaleFence {
                resource: name.to_string(),
                got: fence,
                have: self.lock_mgr.last_applied_fence(name).unwrap_or(0),
            });
        }
        match content {
            Some(bytes) => self.store.write(name, bytes, WriteMode::Overwrite).await?,
            None => match self.store.delete(name).await {
                Ok(()) | Err(crate::error::FileStoreError::NotFound(_)) => {}
                Err(e) => return Err(ClusterError::Store(e)),
            },
        }
        self.lock_mgr.record_applied_fence(name, fence);
        Ok(())
    }

    pub fn holds_lock(&self, resource: &str) -> bool {
        self.lock_mgr.holds_locally(resource)
    }

    pub fn handle_lock_request(&self, resource: &str) -> bool {
        self.lock_mgr.handle_lock_request(resource)
    }

    pub fn handle_lock_released(&self, resource: &str) {
        self.lock_mgr.handle_lock_released(resource)
    }

    pub fn store(&self) -> &Arc<FileStore> {
        &self.store
    }

    pub fn peer_addresses(&self) -> Vec<PeerAddress> {
        self.peer_list()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<PeerPool> {
        &self.pool
    }
}

#[derive(Debug, Default)]
struct FanOutOutcome {
    committed: usize,
    total: usize,
    unreachable_peers: Vec<PeerAddress>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn cluster(id: &str) -> (TempDir, Arc<ActiveCluster>) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileStore::open(dir.path(), false).await.unwrap());
        (dir, ActiveCluster::new(id, store, NodeConfig::default()))
    }

    #[tokio::test]
    async fn apply_write_with_no_peers_just_writes_locally() {
        let (_dir, node) = cluster("n1").await;
        node.apply_write("a.txt", b"HELLO", WriteMode::Overwrite).await.unwrap();
        assert_eq!(node.store().read("a.txt").await.unwrap(), b"HELLO");
    }

    #[tokio::test]
    async fn handle_remote_commit_rejects_stale_fence() {
        let (_dir, node) = cluster("n1").await;
        node.handle_remote_commit("a.txt", Some(b"V1"), 5).await.unwrap();
        let err = node.handle_remote_commit("a.txt", Some(b"STALE"), 3).await.unwrap_err();
        match err {
            ClusterError::StaleFence { resource, got, have } => {
                assert_eq!(resource, "a.txt");
                assert_eq!(got, 3);
                assert_eq!(have, 5, "have must report the fence already applied, not the rejected one");
            }
            other => panic!("expected StaleFence, got {other:?}"),
        }
        assert_eq!(node.store().read("a.txt").await.unwrap(), b"V1");
    }

    #[tokio::test]
    async fn handle_remote_commit_with_no_content_deletes() {
        let (_dir, node) = cluster("n1").await;
        node.handle_remote_commit("a.txt", Some(b"V1"), 1).await.unwrap();
        node.handle_remote_commit("a.txt", None, 2).await.unwrap();
        assert!(node.store().read("a.txt").await.is_err());
    }
}
