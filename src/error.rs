//! Crate-wide error taxonomy (§7 of the design).
//!
//! Each subsystem defines its own error enum; all of them funnel into
//! [`Error`] at the crate boundary so external drivers (CLIs, tests) only
//! ever need to match on one type.

use thiserror::Error;

/// Errors raised by [`crate::file_store::FileStore`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FileStoreError {
    #[error("invalid file name {0:?}")]
    InvalidArgument(String),
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("write verification failed for {0}")]
    WriteVerificationFailed(String),
    #[error("io error on {path}: {message}")]
    Io { path: String, message: String },
}

/// Errors raised by [`crate::replication::ReplicationEngine`].
#[derive(Debug, Error)]
pub enum ReplicationError {
    #[error(transparent)]
    Store(#[from] FileStoreError),
    #[error("replica {replica} failed for {file}: {message}")]
    ReplicaFailed { replica: String, file: String, message: String },
}

/// Errors raised by [`crate::cluster`] (ActiveCluster).
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error(transparent)]
    Store(#[from] FileStoreError),
    #[error("lock timeout on resource {0}")]
    LockTimeout(String),
    #[error("lock denied on resource {0}")]
    LockDenied(String),
    #[error("peer unreachable: {0}")]
    PeerUnreachable(String),
    #[error("replication partial: {committed}/{total} peers committed")]
    ReplicationPartial { committed: usize, total: usize },
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("stale fence: commit fence {got} behind applied fence {have} for {resource}")]
    StaleFence { resource: String, got: u64, have: u64 },
}

/// Errors raised by [`crate::flatgroup`] (FlatGroupCoordinator).
#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("insufficient members: need at least 3, have {0}")]
    InsufficientMembers(usize),
    #[error("no consensus: {voted} of {total}")]
    NoConsensus { voted: usize, total: usize },
    #[error("timeout waiting for consensus round {0}")]
    Timeout(u64),
    #[error("peer unreachable: {0}")]
    PeerUnreachable(String),
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Top-level crate error, composed from the subsystem errors via `#[from]`.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    FileStore(#[from] FileStoreError),
    #[error(transparent)]
    Replication(#[from] ReplicationError),
    #[error(transparent)]
    Cluster(#[from] ClusterError),
    #[error(transparent)]
    Consensus(#[from] ConsensusError),
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
