//! The wire command set (§6) — a superset; not every component uses every
//! command.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    // Client <-> server
    Write,
    Read,
    Delete,
    List,
    // Server -> client replies
    Success,
    Error,
    NotFound,
    // Replication (legacy / strict+continuous)
    Replicate,
    SyncRequest,
    SyncFile,
    SyncDelete,
    SyncStateRequest,
    SyncStateResponse,
    BackupReady,
    Heartbeat,
    // Distributed lock
    LockRequest,
    LockGranted,
    LockDenied,
    LockReleased,
    // Active replication
    OperationProposal,
    OperationAccepted,
    OperationRejected,
    OperationCommit,
    OperationCommitted,
    OperationAbort,
    OperationFailed,
}

impl Command {
    pub fn parse(s: &str) -> Option<Self> {
        use Command::*;
        Some(match s {
            "WRITE" => Write,
            "READ" => Read,
            "DELETE" => Delete,
            "LIST" => List,
            "SUCCESS" => Success,
            "ERROR" => Error,
            "NOT_FOUND" => NotFound,
            "REPLICATE" => Replicate,
            "SYNC_REQUEST" => SyncRequest,
            "SYNC_FILE" => SyncFile,
            "SYNC_DELETE" => SyncDelete,
            "SYNC_STATE_REQUEST" => SyncStateRequest,
            "SYNC_STATE_RESPONSE" => SyncStateResponse,
            "BACKUP_READY" => BackupReady,
            "HEARTBEAT" => Heartbeat,
            "LOCK_REQUEST" => LockRequest,
            "LOCK_GRANTED" => LockGranted,
            "LOCK_DENIED" => LockDenied,
            "LOCK_RELEASED" => LockReleased,
            "OPERATION_PROPOSAL" => OperationProposal,
            "OPERATION_ACCEPTED" => OperationAccepted,
            "OPERATION_REJECTED" => OperationRejected,
            "OPERATION_COMMIT" => OperationCommit,
            "OPERATION_COMMITTED" => OperationCommitted,
            "OPERATION_ABORT" => OperationAbort,
            "OPERATION_FAILED" => OperationFailed,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        use Command::*;
        match self {
            Write => "WRITE",
            Read => "READ",
            Delete => "DELETE",
            List => "LIST",
            Success => "SUCCESS",
            Error => "ERROR",
            NotFound => "NOT_FOUND",
            Replicate => "REPLICATE",
            SyncRequest => "SYNC_REQUEST",
            SyncFile => "SYNC_FILE",
            SyncDelete => "SYNC_DELETE",
            SyncStateRequest => "SYNC_STATE_REQUEST",
            SyncStateResponse => "SYNC_STATE_RESPONSE",
            BackupReady => "BACKUP_READY",
            Heartbeat => "HEARTBEAT",
            LockRequest => "LOCK_REQUEST",
            LockGranted => "LOCK_GRANTED",
            LockDenied => "LOCK_DENIED",
            LockReleased => "LOCK_RELEASED",
            OperationProposal => "OPERATION_PROPOSAL",
            OperationAccepted => "OPERATION_ACCEPTED",
            OperationRejected => "OPERATION_REJECTED",
            OperationCommit => "OPERATION_COMMIT",
            OperationCommitted => "OPERATION_COMMITTED",
            OperationAbort => "OPERATION_ABORT",
            OperationFailed => "OPERATION_FAILED",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
