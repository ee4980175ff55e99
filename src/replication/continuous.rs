//! Continuous (periodic full reconcile) consistency mode (§4.2 mode 2).

use tracing::warn;

use crate::file_store::{FileStore, WriteMode};

use super::ReplicationEngine;

impl ReplicationEngine {
    /// Every interval: copy every master file to every replica, then
    /// delete any replica file absent from the master. Invalidation
    /// markers are untouched by this mode.
    pub(super) async fn continuous_tick(&self) {
        let master_files = match self.master.list().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "continuous mode: failed to list master");
                return;
            }
        };

        for entry in &master_files {
            let bytes = match self.master.read(&entry.name).await {
                Ok(b) => b,
                Err(e) => {
                    warn!(file = %entry.name, error = %e, "continuous mode: master read failed");
                    continue;
                }
            };
            for replica in self.replicas.iter() {
                let store: &FileStore = replica.value();
                if let Err(e) = store.write(&entry.name, &bytes, WriteMode::Overwrite).await {
                    warn!(replica = replica.key(), file = %entry.name, error = %e, "replica write failed");
                }
            }
        }

        let master_names: std::collections::HashSet<&str> =
            master_files.iter().map(|e| e.name.as_str()).collect();
        for replica in self.replicas.iter() {
            let store: &FileStore = replica.value();
            let replica_files = match store.list().await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(replica = replica.key(), error = %e, "continuous mode: failed to list replica");
                    continue;
                }
            };
            for entry in replica_files {
                if !master_names.contains(entry.name.as_str()) {
                    if let Err(e) = store.delete(&entry.name).await {
                        warn!(replica = replica.key(), file = %entry.name, error = %e, "replica delete failed");
                    }
                }
            }
        }
    }
}
