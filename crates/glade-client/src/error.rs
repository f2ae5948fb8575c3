//! Error type for the client façade (C11).

use thiserror::Error;

/// Errors the client façade can return, layered over [`glade_core::RuntimeError`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// The group runtime (C10) failed or rejected an operation.
    #[error(transparent)]
    Runtime(#[from] glade_core::RuntimeError),

    /// A storage backend failed outside the group runtime's own use of it
    /// (key-package store reads/writes during join/create).
    #[error("store failed: {0}")]
    StoreFailure(String),

    /// The identity signer failed to produce a signature.
    #[error("signer failed: {0}")]
    SignerFailed(String),

    /// No locally stored key package matched any secret in the Welcome
    /// (§4.11). Returned whenever every candidate is exhausted, whether
    /// because none existed at all or because each one's `GroupRuntime::
    /// join` attempt failed; `source` carries the last attempt's failure,
    /// `None` only when the candidate list was empty to begin with.
    #[error("no local key package matches this welcome")]
    WelcomeUnmatched {
        /// The last candidate's join failure, if any candidate was tried.
        #[source]
        source: Option<Box<glade_core::RuntimeError>>,
    },
}

impl From<glade_store::StoreError> for ClientError {
    fn from(err: glade_store::StoreError) -> Self {
        Self::StoreFailure(err.to_string())
    }
}

impl ClientError {
    /// True if retrying the same call later might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Runtime(inner) => inner.is_transient(),
            Self::StoreFailure(_) => true,
            Self::SignerFailed(_) | Self::WelcomeUnmatched { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_failures_are_transient() {
        assert!(ClientError::StoreFailure("disk full".to_string()).is_transient());
    }

    #[test]
    fn welcome_unmatched_is_not_transient() {
        assert!(!ClientError::WelcomeUnmatched { source: None }.is_transient());
        assert!(
            !ClientError::WelcomeUnmatched { source: Some(Box::new(glade_core::RuntimeError::NotAdmin)) }
                .is_transient()
        );
    }
}
