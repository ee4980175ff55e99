//! Master/replica file propagation under one of three consistency
//! disciplines (§4.2).

mod continuous;
mod invalidation;
mod lazy;
mod strict;

pub use invalidation::{append_invalid_suffix, strip_invalid_suffix, InvalidationRecord, DEFAULT_SUFFIX};

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::ReplicationError;
use crate::file_store::FileStore;

/// Which of the three consistency disciplines an engine runs, plus its
/// timing parameter.
#[derive(Debug, Clone, Copy)]
pub enum ConsistencyMode {
    Strict { poll_interval: Duration },
    Continuous { interval: Duration },
    Lazy { poll_interval: Duration },
}

/// Master-to-replicas propagation engine. Owns no sockets: it reads the
/// master [`FileStore`] and rewrites replica [`FileStore`]s directly, as
/// described in §4.2 "Topology".
pub struct ReplicationEngine {
    master: Arc<FileStore>,
    replicas: DashMap<String, Arc<FileStore>>,
    mode: ConsistencyMode,
    invalid: InvalidationRecord,
    invalid_suffix: String,
    shutdown: Mutex<Option<mpsc::Sender<()>>>,
}

impl ReplicationEngine {
    pub fn new(master: Arc<FileStore>, mode: ConsistencyMode) -> Arc<Self> {
        Arc::new(Self {
            master,
            replicas: DashMap::new(),
            mode,
            invalid: InvalidationRecord::new(),
            invalid_suffix: DEFAULT_SUFFIX.to_string(),
            shutdown: Mutex::new(None),
        })
    }

    /// Registers a new replica directory, creating it if missing, and
    /// performs the initial sync described in §4.2.1's `addReplica`: valid
    /// master files are copied in full, invalid ones get a fresh marker,
    /// and replica files absent from the master are pruned.
    pub async fn add_replica(
        self: &Arc<Self>,
        id: impl Into<String>,
        path: impl Into<std::path::PathBuf>,
    ) -> Result<(), ReplicationError> {
        let id = id.into();
        let store = Arc::new(FileStore::open(path, false).await.map_err(|e| {
            ReplicationError::ReplicaFailed {
                replica: id.clone(),
                file: String::new(),
                message: e.to_string(),
            }
        })?);

        let master_meta = self.master.all_metadata().await?;
        for (name, _meta) in &master_meta {
            let _ = store.delete(&append_invalid_suffix(name, &self.invalid_suffix)).await;
            if self.invalid.is_invalid(name) {
                store
                    .write(
                        &append_invalid_suffix(name, &self.invalid_suffix),
                        b"",
                        crate::file_store::WriteMode::Overwrite,
                    )
                    .await
                    .ok();
            } else {
                let bytes = self.master.read(name).await?;
                store.write(name, &bytes, crate::file_store::WriteMode::Overwrite).await.ok();
            }
        }
        let known: std::collections::HashSet<&str> =
            master_meta.keys().map(|s| s.as_str()).collect();
        for entry in store.list().await.map_err(ReplicationError::Store)? {
            let canonical = strip_invalid_suffix(&entry.name, &self.invalid_suffix);
            if !known.contains(canonical.as_str()) {
                let _ = store.delete(&entry.name).await;
            }
        }

        self.replicas.insert(id, store);
        Ok(())
    }

    /// Starts the background propagation loop for this engine's mode.
    /// Idempotent: calling twice replaces the prior loop's shutdown handle,
    /// which drops its sender and lets the old loop exit on its next tick.
    pub async fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let (tx, mut rx) = mpsc::channel::<()>(1);
        *self.shutdown.lock().await = Some(tx);

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            match engine.mode {
                ConsistencyMode::Strict { poll_interval } => {
                    let mut ticker = tokio::time::interval(poll_interval);
                    let mut snapshot = strict::Snapshot::default();
                    loop {
                        tokio::select! {
                            _ = ticker.tick() => engine.strict_tick(&mut snapshot).await,
                            _ = rx.recv() => break,
                        }
                    }
                }
                ConsistencyMode::Continuous { interval } => {
                    let mut ticker = tokio::time::interval(interval);
                    loop {
                        tokio::select! {
                            _ = ticker.tick() => engine.continuous_tick().await,
                            _ = rx.recv() => break,
                        }
                    }
                }
                ConsistencyMode::Lazy { poll_interval } => {
                    let mut ticker = tokio::time::interval(poll_interval);
                    let mut snapshot = lazy::Snapshot::default();
                    loop {
                        tokio::select! {
                            _ = ticker.tick() => engine.lazy_tick(&mut snapshot).await,
                            _ = rx.recv() => break,
                        }
                    }
                }
            }
            info!("replication engine loop stopped");
        })
    }

    /// Signals the background loop to stop on its next tick.
    pub async fn stop(&self) {
        self.shutdown.lock().await.take();
    }

    /// Marks `name` invalid and renames every replica's current copy to
    /// its invalidation marker (§4.2.1 `invalidate`).
    pub(crate) async fn invalidate(&self, name: &str) {
        self.invalid.mark_invalid(name);
        let marker = append_invalid_suffix(name, &self.invalid_suffix);
        for replica in self.replicas.iter() {
            let store: &FileStore = replica.value();
            match store.read(name).await {
                Ok(bytes) => {
                    if store.delete(name).await.is_ok() {
                        if let Err(e) = store
                            .write(&marker, &bytes, crate::file_store::WriteMode::Overwrite)
                            .await
                        {
                            warn!(replica = replica.key(), file = name, error = %e, "failed to write invalidation marker");
                        }
                    }
                }
                Err(_) => {
                    let _ = store
                        .write(&marker, b"", crate::file_store::WriteMode::Overwrite)
                        .await;
                }
            }
        }
    }

    /// The replica-side read path: resolves `requested` (which may already
    /// carry the invalidation suffix) to its canonical name, revalidating
    /// from the master if necessary (§4.2.1 `accessFile`).
    pub async fn access_file(
        &self,
        replica_id: &str,
        requested: &str,
    ) -> Result<Vec<u8>, ReplicationError> {
        let canonical = strip_invalid_suffix(requested, &self.invalid_suffix);
        let store = self
            .replicas
            .get(replica_id)
            .ok_or_else(|| ReplicationError::ReplicaFailed {
                replica: replica_id.to_string(),
                file: canonical.clone(),
                message: "unknown replica".to_string(),
            })?;
        let marker = append_invalid_suffix(&canonical, &self.invalid_suffix);
        let needs_revalidation = self.invalid.is_invalid(&canonical) || store.read(&marker).await.is_ok();

        if needs_revalidation {
            match self.master.read(&canonical).await {
                Ok(bytes) => {
                    store.write(&canonical, &bytes, crate::file_store::WriteMode::Overwrite).await?;
                    let _ = store.delete(&marker).await;
                    self.invalid.mark_valid(&canonical);
                    return Ok(bytes);
                }
                Err(crate::error::FileStoreError::NotFound(_)) => {
                    return Err(ReplicationError::Store(crate::error::FileStoreError::NotFound(
                        canonical,
                    )));
                }
                Err(e) => return Err(ReplicationError::Store(e)),
            }
        }

        Ok(store.read(&canonical).await?)
    }

    pub fn replica_store(&self, replica_id: &str) -> Option<Arc<FileStore>> {
        self.replicas.get(replica_id).map(|r| Arc::clone(r.value()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_store::WriteMode;
    use tempfile::TempDir;

    async fn engine_with(mode: ConsistencyMode) -> (TempDir, Vec<TempDir>, Arc<ReplicationEngine>) {
        let master_dir = TempDir::new().unwrap();
        let master = Arc::new(FileStore::open(master_dir.path(), false).await.unwrap());
        let engine = ReplicationEngine::new(master, mode);
        let replica_dirs = vec![TempDir::new().unwrap(), TempDir::new().unwrap()];
        for (i, dir) in replica_dirs.iter().enumerate() {
            engine.add_replica(format!("r{i}"), dir.path()).await.unwrap();
        }
        (master_dir, replica_dirs, engine)
    }

    #[tokio::test]
    async fn s1_strict_replication_propagates_and_deletes() {
        let (master_dir, replica_dirs, engine) =
            engine_with(ConsistencyMode::Strict { poll_interval: Duration::from_millis(10) })
                .await;
        let master = FileStore::open(master_dir.path(), false).await.unwrap();
        master.write("a.txt", b"HELLO", WriteMode::Overwrite).await.unwrap();

        let mut snapshot = strict::Snapshot::default();
        engine.strict_tick(&mut snapshot).await;

        for dir in &replica_dirs {
            let replica = FileStore::open(dir.path(), false).await.unwrap();
            assert_eq!(replica.read("a.txt").await.unwrap(), b"HELLO");
        }

        master.delete("a.txt").await.unwrap();
        engine.strict_tick(&mut snapshot).await;
        for dir in &replica_dirs {
            let replica = FileStore::open(dir.path(), false).await.unwrap();
            assert!(replica.read("a.txt").await.is_err());
        }
    }

    #[tokio::test]
    async fn s2_lazy_invalidation_round_trip() {
        let (master_dir, replica_dirs, engine) =
            engine_with(ConsistencyMode::Lazy { poll_interval: Duration::from_millis(10) }).await;
        let master = FileStore::open(master_dir.path(), false).await.unwrap();
        master.write("b.txt", b"ONE", WriteMode::Overwrite).await.unwrap();

        let mut snapshot = lazy::Snapshot::default();
        engine.lazy_tick(&mut snapshot).await; // initial propagation (new file)

        master.write("b.txt", b"TWO", WriteMode::Overwrite).await.unwrap();
        engine.lazy_tick(&mut snapshot).await; // detects modification -> invalidate

        let replica = FileStore::open(replica_dirs[0].path(), false).await.unwrap();
        assert!(replica.read("b.txt").await.is_err());
        // The marker is the renamed stale copy, not an empty placeholder,
        // since a local copy existed when invalidation fired.
        assert_eq!(replica.read("b_invalid.txt").await.unwrap(), b"ONE");

        let fresh = engine.access_file("r0", "b.txt").await.unwrap();
        assert_eq!(fresh, b"TWO");
        assert_eq!(replica.read("b.txt").await.unwrap(), b"TWO");
        assert!(replica.read("b_invalid.txt").await.is_err());
    }

    #[tokio::test]
    async fn continuous_mode_prunes_replica_only_files() {
        let (master_dir, replica_dirs, engine) = engine_with(ConsistencyMode::Continuous {
            interval: Duration::from_millis(10),
        })
        .await;
        let master = FileStore::open(master_dir.path(), false).await.unwrap();
        master.write("kept.txt", b"K", WriteMode::Overwrite).await.unwrap();

        let replica = FileStore::open(replica_dirs[0].path(), false).await.unwrap();
        replica.write("stray.txt", b"S", WriteMode::Overwrite).await.unwrap();

        engine.continuous_tick().await;

        assert_eq!(replica.read("kept.txt").await.unwrap(), b"K");
        assert!(replica.read("stray.txt").await.is_err());
    }

    #[tokio::test]
    async fn access_file_surfaces_not_found_when_master_lacks_file() {
        let (_master_dir, _replica_dirs, engine) =
            engine_with(ConsistencyMode::Lazy { poll_interval: Duration::from_millis(10) }).await;
        engine.invalidate("ghost.txt").await;
        let err = engine.access_file("r0", "ghost.txt").await.unwrap_err();
        assert!(matches!(err, ReplicationError::Store(crate::error::FileStoreError::NotFound(_))));
    }
}
