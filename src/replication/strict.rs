//! Strict (event-driven) consistency mode (§4.2 mode 1).
//!
//! The teacher repo has no filesystem-notification dependency (no `notify`
//! crate in its table), so "event-driven" is implemented the way the rest
//! of this crate implements timers — a `tokio::time::interval` tight poll
//! that diffs the master's current state against a remembered snapshot and
//! reacts to CREATE/MODIFY/DELETE as if they were discrete events.

use std::collections::HashMap;

use tracing::warn;

use crate::file_store::FileStore;
use crate::hash::Checksum;

use super::ReplicationEngine;

#[derive(Default)]
pub(super) struct Snapshot {
    pub(super) checksums: HashMap<String, Checksum>,
}

impl ReplicationEngine {
    /// Runs one strict-mode poll: detects create/modify/delete since the
    /// last call and propagates each as a discrete event.
    pub(super) async fn strict_tick(&self, snapshot: &mut Snapshot) {
        let current = match self.master.all_metadata().await {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "strict mode: failed to read master metadata");
                return;
            }
        };

        for (name, meta) in &current {
            let changed = snapshot.checksums.get(name).map(|c| *c != meta.checksum).unwrap_or(true);
            if changed {
                self.propagate_file(name).await;
            }
        }
        let deleted: Vec<String> = snapshot
            .checksums
            .keys()
            .filter(|name| !current.contains_key(*name))
            .cloned()
            .collect();
        for name in deleted {
            self.remove_from_replicas(&name).await;
        }

        snapshot.checksums = current.into_iter().map(|(k, v)| (k, v.checksum)).collect();
    }

    /// Copies one master file to every replica, overwriting and preserving
    /// the content (timestamps are a consequence of the write, since the
    /// flat file store does not expose a separate "set mtime" operation).
    pub(super) async fn propagate_file(&self, name: &str) {
        let bytes = match self.master.read(name).await {
            Ok(b) => b,
            Err(e) => {
                warn!(file = name, error = %e, "strict mode: master read failed");
                return;
            }
        };
        for replica in self.replicas.iter() {
            let store: &FileStore = replica.value();
            if let Err(e) =
                store.write(name, &bytes, crate::file_store::WriteMode::Overwrite).await
            {
                warn!(replica = replica.key(), file = name, error = %e, "replica write failed");
            }
        }
    }

    pub(super) async fn remove_from_replicas(&self, name: &str) {
        let marker = super::invalidation::append_invalid_suffix(name, &self.invalid_suffix);
        for replica in self.replicas.iter() {
            let store: &FileStore = replica.value();
            let _ = store.delete(name).await;
            let _ = store.delete(&marker).await;
        }
    }
}
