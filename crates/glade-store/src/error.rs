use thiserror::Error;

/// I/O-layer errors (§7 "I/O" kind: `StoreFailure`).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend rejected or failed the operation.
    #[error("store operation failed: {0}")]
    Failed(String),
    /// No group-state snapshot exists for the requested group id.
    #[error("group not found")]
    GroupNotFound,
}
