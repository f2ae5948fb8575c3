//! Error types for the group runtime.
//!
//! One enum per kind, not per type (§7): callers match on `RuntimeError`
//! variants rather than juggling a separate error type per failing
//! subsystem. `is_transient()` distinguishes retryable I/O conditions from
//! protocol violations, the same classifier idiom used throughout this
//! codebase's error types.

use thiserror::Error;

/// Errors the group runtime (C10) and client façade (C11) can return.
///
/// Per-event classifications produced *during* ingest (`UnreadableEvent`,
/// `CommitRejected`) are carried as [`crate::runtime::IngestOutcome`] values,
/// not as this error type — §7's propagation policy is that they never
/// propagate as exceptions. `RuntimeError` is reserved for failures that do
/// halt the current operation: state-store failures, publish failures, and
/// lifecycle misuse.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The group-state store failed to read or write a snapshot.
    #[error("group state store failed: {0}")]
    StoreFailure(String),

    /// A commit was published but no relay acknowledged it.
    #[error("no relay acknowledged the commit")]
    NoRelayAck,

    /// A network request exceeded its caller-supplied timeout.
    #[error("request timed out")]
    RequestTimeout,

    /// Publishing an event to the network interface failed outright.
    #[error("publish failed: {0}")]
    PublishFailed(String),

    /// The caller is not in the group's current admin set (§4.10).
    #[error("caller is not an admin of this group")]
    NotAdmin,

    /// No local key package matched any secret in a Welcome (§4.11).
    #[error("no local key package matches this welcome")]
    WelcomeUnmatched,

    /// No `kind=443` event corresponds to an invited member's key package.
    #[error("no matching key package event for invitee")]
    NoMatchingKeyPackageEvent,

    /// The openmls provider rejected an operation outright (not a per-event
    /// ingest classification — see `IngestOutcome::Unreadable`/`CommitRejected`).
    #[error("mls processing failed: {0}")]
    MlsProcessingFailed(String),

    /// Attempted to create a group that already exists.
    #[error("group already exists")]
    GroupAlreadyExists,

    /// Referenced a group id with no persisted state.
    #[error("group not found")]
    GroupNotFound,

    /// A wire codec operation failed at the boundary of the runtime.
    #[error("codec error: {0}")]
    Codec(#[from] glade_codec::CodecError),
}

impl RuntimeError {
    /// True if retrying the same operation later might succeed: network and
    /// store I/O conditions. Protocol violations (`NotAdmin`,
    /// `MlsProcessingFailed`, lifecycle misuse) are never transient — they
    /// indicate a broken or malicious peer, or caller error.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::StoreFailure(_) | Self::NoRelayAck | Self::RequestTimeout | Self::PublishFailed(_)
        )
    }
}

impl From<glade_store::StoreError> for RuntimeError {
    fn from(err: glade_store::StoreError) -> Self {
        Self::StoreFailure(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_transient() {
        assert!(RuntimeError::StoreFailure("disk full".to_string()).is_transient());
        assert!(RuntimeError::NoRelayAck.is_transient());
        assert!(RuntimeError::RequestTimeout.is_transient());
        assert!(RuntimeError::PublishFailed("closed".to_string()).is_transient());
    }

    #[test]
    fn protocol_violations_are_fatal() {
        assert!(!RuntimeError::NotAdmin.is_transient());
        assert!(!RuntimeError::WelcomeUnmatched.is_transient());
        assert!(!RuntimeError::GroupAlreadyExists.is_transient());
        assert!(!RuntimeError::MlsProcessingFailed("bad commit".to_string()).is_transient());
    }
}
