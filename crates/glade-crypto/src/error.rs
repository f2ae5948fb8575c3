use thiserror::Error;

/// Errors raised by the envelope sealing/opening and signing primitives.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// AEAD seal or open failed (wrong key, tampered ciphertext, truncated input).
    #[error("AEAD operation failed")]
    AeadFailed,
    /// HKDF expand was asked for an output longer than its theoretical maximum.
    #[error("key derivation failed: {0}")]
    KdfFailed(String),
    /// A byte slice did not have the length a key/nonce/secret requires.
    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected length in bytes.
        expected: usize,
        /// Actual length observed.
        actual: usize,
    },
    /// Schnorr signing or verification failed.
    #[error("signature operation failed: {0}")]
    SignatureFailed(String),
}
