//! Lazy-invalidation consistency mode (§4.2 mode 3, §4.2.1).

use std::collections::HashMap;

use tracing::warn;

use crate::hash::Checksum;

use super::ReplicationEngine;

#[derive(Default)]
pub(super) struct Snapshot {
    pub(super) checksums: HashMap<String, Checksum>,
}

impl ReplicationEngine {
    /// Runs one lazy-mode poll: new files propagate fully, modified files
    /// invalidate their replica copies, disappeared files invalidate and
    /// remove.
    pub(super) async fn lazy_tick(&self, snapshot: &mut Snapshot) {
        let current = match self.master.all_metadata().await {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "lazy mode: failed to read master metadata");
                return;
            }
        };

        for (name, meta) in &current {
            match snapshot.checksums.get(name) {
                None => {
                    self.propagate_file(name).await;
                    self.invalid.mark_valid(name);
                }
                Some(prior) if *prior != meta.checksum => {
                    self.invalidate(name).await;
                }
                _ => {}
            }
        }

        let disappeared: Vec<String> = snapshot
            .checksums
            .keys()
            .filter(|name| !current.contains_key(*name))
            .cloned()
            .collect();
        for name in disappeared {
            self.invalidate(&name).await;
            self.remove_from_replicas(&name).await;
        }

        snapshot.checksums = current.into_iter().map(|(k, v)| (k, v.checksum)).collect();
    }
}
