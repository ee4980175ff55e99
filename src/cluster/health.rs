//! Background heartbeat task: periodically pings every peer and drops any
//! peer that fails to answer, per §4.3 "Health checking".

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::{wire_fanout, ActiveCluster};

/// Spawns the periodic heartbeat loop for `cluster`, running until the
/// process exits (the binaries never stop it explicitly).
pub fn spawn_health_check(cluster: Arc<ActiveCluster>) -> JoinHandle<()> {
    let interval = cluster.config().interval.health_check();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let peers = cluster.peer_addresses();
            for peer in peers {
                let frame = wire_fanout::heartbeat_frame(&cluster.self_id);
                let addr = peer.internal_addr();
                match cluster.pool().request(&addr, &frame, cluster.config().timeout.connection()).await
                {
                    Ok(_) => {}
                    Err(e) => {
                        warn!(peer = addr, error = %e, "peer failed heartbeat, removing from membership");
                        cluster.remove_peer(&peer.id);
                    }
                }
            }
            info!(live_peers = cluster.peer_addresses().len(), "heartbeat round complete");
        }
    })
}
