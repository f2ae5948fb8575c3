//! AEAD sealing of the inner MLS message under the envelope conversation key.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};

use crate::error::CryptoError;
use crate::kdf::CONVERSATION_KEY_SIZE;

/// Random nonce size for [`seal`]/[`open`], in bytes.
pub const NONCE_SIZE: usize = 24;

/// Seal `plaintext` (the TLS-encoded MLS message) under `key` and a caller-supplied
/// random `nonce`. Returns the ciphertext with the authentication tag appended.
pub fn seal(
    key: &[u8; CONVERSATION_KEY_SIZE],
    nonce: &[u8; NONCE_SIZE],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::InvalidLength {
        expected: CONVERSATION_KEY_SIZE,
        actual: key.len(),
    })?;
    let nonce = XNonce::from_slice(nonce);
    cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::AeadFailed)
}

/// Open a ciphertext produced by [`seal`] under the same `key` and `nonce`.
pub fn open(
    key: &[u8; CONVERSATION_KEY_SIZE],
    nonce: &[u8; NONCE_SIZE],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::InvalidLength {
        expected: CONVERSATION_KEY_SIZE,
        actual: key.len(),
    })?;
    let nonce = XNonce::from_slice(nonce);
    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::AeadFailed)
}
