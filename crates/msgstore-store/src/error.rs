use std::path::PathBuf;

/// Errors from article store operations.
///
/// Validation and conflict outcomes (missing fields, duplicates, unknown
/// identifiers) are not errors; they are reported through
/// [`IngestOutcome`](crate::IngestOutcome) and
/// [`RetrieveOutcome`](crate::RetrieveOutcome). Everything here is a storage
/// failure that aborts the request.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error from the underlying filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Index or ledger (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A persisted index file exists but does not describe a partition.
    #[error("corrupt partition index {path:?}: {reason}")]
    CorruptIndex { path: PathBuf, reason: String },

    /// A lock guarding shared store state was poisoned by a panicking writer.
    #[error("lock poisoned: {0}")]
    LockPoisoned(&'static str),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
