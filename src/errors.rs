//! Snapshot Coordinator Error Hierarchy
//!
//! Errors are grouped by the layer that produces them: request validation
//! against the in-memory indices, the durable record codec, the replicator
//! and the tablet workers.

use std::time::Duration;

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Request validation and state transition failures
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// Durable record encoding failures
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Replicated log submission failures
    #[error(transparent)]
    Replication(#[from] ReplicationError),

    /// Tablet worker reported a failure
    #[error("Tablet worker failure: {0}")]
    Worker(tonic::Status),

    /// Coordinator configuration validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Could not find {entity}: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Duplicate {entity} id: {id}")]
    AlreadyExists { entity: &'static str, id: String },

    /// Illegal lifecycle transition
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// Schedule already has a snapshot in flight
    #[error("Creating snapshot in progress: {0}")]
    ParallelOperation(String),

    /// Restore requested before the snapshot reached COMPLETE
    #[error("The snapshot state is not complete: {0}")]
    SnapshotNotReady(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Unexpected value type or malformed record
    #[error("Corruption: {0}")]
    Corruption(String),

    /// Serialization failures for persisted payloads
    #[error(transparent)]
    BincodeError(#[from] bincode::Error),

    /// Key does not carry a known entity tag and a 16 byte id
    #[error("Invalid record key: {0}")]
    InvalidKey(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
    /// Commit did not arrive before the caller's deadline
    #[error("Replicated write not committed after {0:?}")]
    DeadlineExceeded(Duration),

    /// Submission rejected because this node does not lead the term
    #[error("Replication requires leader role (term: {term})")]
    NotLeader { term: i64 },

    /// Replicator dropped the commit notification
    #[error("Replicated write aborted")]
    Aborted,

    #[error("Replicator error: {0}")]
    Internal(String),
}

/// Flat classification of [`Error`], independent of the layer that raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    IllegalState,
    ParallelOperation,
    SnapshotNotReady,
    InvalidArgument,
    Corruption,
    DeadlineExceeded,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Snapshot(e) => match e {
                SnapshotError::NotFound { .. } => ErrorKind::NotFound,
                SnapshotError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
                SnapshotError::IllegalState(_) => ErrorKind::IllegalState,
                SnapshotError::ParallelOperation(_) => ErrorKind::ParallelOperation,
                SnapshotError::SnapshotNotReady(_) => ErrorKind::SnapshotNotReady,
                SnapshotError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            },
            Error::Storage(_) => ErrorKind::Corruption,
            Error::Replication(ReplicationError::DeadlineExceeded(_)) => ErrorKind::DeadlineExceeded,
            Error::Replication(_) => ErrorKind::Internal,
            Error::Worker(_) => ErrorKind::Internal,
            Error::Config(_) => ErrorKind::InvalidArgument,
            Error::Fatal(_) => ErrorKind::Internal,
        }
    }
}

// ============== Conversion Implementations ============== //
impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Storage(StorageError::BincodeError(e))
    }
}

impl From<tonic::Status> for Error {
    fn from(status: tonic::Status) -> Self {
        Error::Worker(status)
    }
}
