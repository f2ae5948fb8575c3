use thiserror::Error;

/// Codec-layer errors (§7 "Input validation" / "Codec" / "Transport/MLS" kinds).
#[derive(Debug, Error)]
pub enum CodecError {
    /// A hex-encoded field did not contain valid lowercase hex.
    #[error("invalid pubkey encoding")]
    InvalidPubkey,
    /// A relay URL was not `ws://` or `wss://`.
    #[error("invalid relay url: {0}")]
    InvalidRelayUrl(String),
    /// A length-prefixed field was truncated or carried an invalid length.
    #[error("malformed extension: {0}")]
    MalformedExtension(&'static str),
    /// The MLS credential identity did not match the event author's pubkey.
    #[error("credential identity does not match event author")]
    CredentialBindingMismatch,
    /// The MLS credential was not a basic credential.
    #[error("unsupported credential type")]
    UnsupportedCredentialType,
    /// Generic decode failure (malformed JSON, truncated TLS bytes, etc).
    #[error("decode failed: {0}")]
    DecodeFailed(String),
    /// An `encoding` tag named a scheme the reader does not recognize.
    #[error("encoding mismatch: expected one of {0}")]
    EncodingMismatch(&'static str),
    /// The event carried a `kind` other than the one the codec expects.
    #[error("wrong event kind: expected {expected}, got {actual}")]
    WrongKind {
        /// Kind the codec requires.
        expected: u16,
        /// Kind actually observed.
        actual: u16,
    },
    /// The routing tag (`h`) required by this event kind was absent.
    #[error("missing routing tag")]
    MissingRoutingTag,
    /// AEAD decryption of the envelope content failed under every candidate key.
    #[error("decrypt failed")]
    DecryptFailed,
    /// The envelope's outer framing (nonce length, ciphertext length) was invalid.
    #[error("malformed envelope")]
    MalformedEnvelope,
    /// A rumor's `id` did not match the hash of its canonical serialization.
    #[error("rumor id mismatch")]
    RumorIdMismatch,
    /// Caller supplied a `sig` on a value that must be unsigned.
    #[error("rumor must not carry a signature")]
    UnexpectedSignature,
}
