//! Ricart-Agrawala-flavored distributed mutual exclusion (§4.3).
//!
//! Generalizes a simple grant/deny lock manager into a grant/deny-over-
//! the-wire protocol with a monotonic per-resource fencing token attached
//! to every granted acquisition.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::error::ClusterError;

use super::client::PeerPool;
use super::{MutationKind, PeerAddress};

/// A held lock, recorded locally by the coordinator that acquired it.
#[derive(Debug, Clone)]
pub struct LockRecord {
    pub resource: String,
    pub owner: String,
    pub op: MutationKind,
    pub fence: u64,
    pub acquired_at: Instant,
}

/// Whether a distributed lock acquisition requires every peer to grant, or
/// only a majority. `NodeConfig`'s `consensus.require.unanimity` decides
/// this, not a hardcoded policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantPolicy {
    Majority,
    Unanimous,
}

/// Per-node distributed lock manager. Tracks locks this node currently
/// holds (as coordinator) and, independently, the monotonic fence counter
/// per resource this node has last applied a commit for (used to reject
/// stale commits).
pub struct DistributedLockManager {
    self_id: String,
    held: DashMap<String, LockRecord>,
    fence_counters: DashMap<String, AtomicU64>,
    last_applied_fence: DashMap<String, u64>,
}

impl DistributedLockManager {
    pub fn new(self_id: impl Into<String>) -> Self {
        Self {
            self_id: self_id.into(),
            held: DashMap::new(),
            fence_counters: DashMap::new(),
            last_applied_fence: DashMap::new(),
        }
    }

    /// True iff this node currently holds `resource` (used to answer an
    /// inbound `LOCK_REQUEST` from a peer coordinator).
    pub fn holds_locally(&self, resource: &str) -> bool {
        self.held.contains_key(resource)
    }

    fn next_fence(&self, resource: &str) -> u64 {
        let counter = self.fence_counters.entry(resource.to_string()).or_insert_with(|| AtomicU64::new(0));
        counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Acquires the distributed lock on `resource` by sending
    /// `LOCK_REQUEST` to every peer and tallying grants within
    /// `timeout`. Returns the fence token to attach to the resulting
    /// commit.
    pub async fn acquire(
        &self,
        resource: &str,
        op: MutationKind,
        peers: &[PeerAddress],
        pool: &Arc<PeerPool>,
        policy: GrantPolicy,
        timeout: std::time::Duration,
    ) -> Result<u64, ClusterError> {
        // The coordinator's own acquisition already counts as one grant
        // (it never sends itself a LOCK_REQUEST), so the threshold below
        // is how many *peer* grants are still needed to cross the
        // group-wide policy threshold, not the peer-only one. Majority is
        // floor((peers+1)/2) peer grants, which together with the
        // coordinator's implicit grant reaches floor(group_size/2)+1 —
        // e.g. 0 peers needs 0 more grants, so a peerless node always
        // succeeds per §4.3 fan-out rule (a).
        let required = match policy {
            GrantPolicy::Unanimous => peers.len(),
            GrantPolicy::Majority => (peers.len() + 1) / 2,
        };

        let mut grants = 0usize;
        let mut denials = 0usize;
        if !peers.is_empty() {
            let replies = super::wire_fanout::request_all(
                pool,
                peers,
                super::wire_fanout::lock_request_frame(resource, op, &self.self_id),
                timeout,
            )
            .await;
            for reply in replies.into_iter().flatten() {
                match reply.command {
                    crate::wire::Command::LockGranted => grants += 1,
                    crate::wire::Command::LockDenied => denials += 1,
                    _ => {}
                }
            }
        }

        let _ = denials;
        if grants < required {
            warn!(resource, grants, required, "lock acquisition failed");
            return Err(ClusterError::LockDenied(resource.to_string()));
        }

        let fence = self.next_fence(resource);
        self.held.insert(
            resource.to_string(),
            LockRecord {
                resource: resource.to_string(),
                owner: self.self_id.clone(),
                op,
                fence,
                acquired_at: Instant::now(),
            },
        );
        debug!(resource, fence, "lock acquired");
        Ok(fence)
    }

    /// Removes the local lock record and fires `LOCK_RELEASED` to all
    /// peers (no ack required, per §4.3).
    pub async fn release(&self, resource: &str, peers: &[PeerAddress], pool: &Arc<PeerPool>) {
        self.held.remove(resource);
        let frame = super::wire_fanout::lock_released_frame(resource, &self.self_id);
        super::wire_fanout::notify_all(pool, peers, frame).await;
    }

    /// Handles an inbound `LOCK_REQUEST` from a peer coordinator, grants
    /// iff this node does not already hold `resource` locally.
    pub fn handle_lock_request(&self, resource: &str) -> bool {
        !self.holds_locally(resource)
    }

    /// Handles an inbound `LOCK_RELEASED`: no-op here since this node
    /// never recorded a lock for a resource it did not itself acquire.
    pub fn handle_lock_released(&self, _resource: &str) {}

    /// True iff `fence` is not behind the last fence this node applied for
    /// `resource` — the stale-commit rejection that makes fencing useful.
    pub fn accepts_fence(&self, resource: &str, fence: u64) -> bool {
        match self.last_applied_fence.get(resource) {
            Some(last) => fence >= *last,
            None => true,
        }
    }

    /// The last fence this node applied for `resource`, if any — used to
    /// report what a rejected commit was stale against.
    pub fn last_applied_fence(&self, resource: &str) -> Option<u64> {
        self.last_applied_fence.get(resource).map(|v| *v)
    }

    pub fn record_applied_fence(&self, resource: &str, fence: u64) {
        self.last_applied_fence.insert(resource.to_string(), fence);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_lock_request_denies_when_locally_held() {
        let mgr = DistributedLockManager::new("n1");
        assert!(mgr.handle_lock_request("a.txt"));
        // Simulate this node itself holding the lock as coordinator.
        mgr.held.insert(
            "a.txt".to_string(),
            LockRecord {
                resource: "a.txt".to_string(),
                owner: "n1".to_string(),
                op: MutationKind::Write,
                fence: 1,
                acquired_at: Instant::now(),
            },
        );
        assert!(!mgr.handle_lock_request("a.txt"));
    }

    #[test]
    fn fence_rejects_stale_commits() {
        let mgr = DistributedLockManager::new("n1");
        assert!(mgr.accepts_fence("a.txt", 1));
        mgr.record_applied_fence("a.txt", 5);
        assert!(mgr.accepts_fence("a.txt", 5));
        assert!(mgr.accepts_fence("a.txt", 6));
        assert!(!mgr.accepts_fence("a.txt", 4));
    }

    #[test]
    fn fence_counter_is_monotonic_per_resource() {
        let mgr = DistributedLockManager::new("n1");
        assert_eq!(mgr.next_fence("a.txt"), 1);
        assert_eq!(mgr.next_fence("a.txt"), 2);
        assert_eq!(mgr.next_fence("b.txt"), 1);
    }

    #[tokio::test]
    async fn acquire_with_no_peers_always_succeeds_under_majority() {
        let mgr = DistributedLockManager::new("n1");
        let pool = Arc::new(PeerPool::new());
        let fence = mgr
            .acquire(
                "a.txt",
                MutationKind::Write,
                &[],
                &pool,
                GrantPolicy::Majority,
                std::time::Duration::from_millis(50),
            )
            .await
            .expect("a peerless node must always win its own lock, per §4.3 fan-out rule (a)");
        assert_eq!(fence, 1);
    }

    #[tokio::test]
    async fn acquire_with_no_peers_always_succeeds_under_unanimous() {
        let mgr = DistributedLockManager::new("n1");
        let pool = Arc::new(PeerPool::new());
        mgr.acquire(
            "a.txt",
            MutationKind::Write,
            &[],
            &pool,
            GrantPolicy::Unanimous,
            std::time::Duration::from_millis(50),
        )
        .await
        .expect("zero peers means zero grants required under either policy");
    }

    #[test]
    fn majority_threshold_counts_the_coordinators_own_implicit_grant() {
        // peer grants needed for a group-wide majority, given peer count:
        // 0 peers (1-node group) -> 0; 2 peers (3-node group) -> 1, not 2;
        // 4 peers (5-node group) -> 2, not 3.
        let required = |peer_count: usize| (peer_count + 1) / 2;
        assert_eq!(required(0), 0);
        assert_eq!(required(2), 1);
        assert_eq!(required(4), 2);
    }
}
