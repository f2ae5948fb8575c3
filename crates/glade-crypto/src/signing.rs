//! Schnorr-over-secp256k1 signing helpers.
//!
//! Used both by the envelope codec (C3), which signs every outer event with a
//! fresh, never-reused ephemeral keypair, and by any `Signer` implementation
//! that wants a ready-made wrapper over a long-lived identity key.

use secp256k1::hashes::sha256;
use secp256k1::{Keypair, Message, SECP256K1, SecretKey, XOnlyPublicKey};

use crate::error::CryptoError;

/// Size in bytes of a Nostr-style x-only public key.
pub const PUBKEY_SIZE: usize = 32;
/// Size in bytes of a Schnorr signature.
pub const SIGNATURE_SIZE: usize = 64;

/// A secp256k1 keypair used to sign a single outer event.
///
/// Never serialized to storage; generated fresh for every envelope per
/// §4.3 ("Generate a fresh ephemeral signing keypair, never reused across
/// events").
pub struct EphemeralKeypair {
    keypair: Keypair,
}

impl EphemeralKeypair {
    /// Generate a new ephemeral keypair from caller-supplied random bytes.
    ///
    /// The caller is responsible for sourcing cryptographically secure
    /// randomness (the `Environment` abstraction upstream, or an OS RNG).
    pub fn from_random_bytes(bytes: &[u8; 32]) -> Result<Self, CryptoError> {
        let secret = SecretKey::from_slice(bytes)
            .map_err(|e| CryptoError::SignatureFailed(e.to_string()))?;
        Ok(Self {
            keypair: Keypair::from_secret_key(SECP256K1, &secret),
        })
    }

    /// The 32-byte x-only public key, hex-independent raw form.
    pub fn public_key(&self) -> [u8; PUBKEY_SIZE] {
        self.keypair.x_only_public_key().0.serialize()
    }

    /// Sign a 32-byte message digest (the event id) with BIP-340 Schnorr.
    pub fn sign(&self, digest: &[u8; 32]) -> [u8; SIGNATURE_SIZE] {
        let message = Message::from_digest(*digest);
        self.keypair.sign_schnorr(message).serialize()
    }
}

/// Verify a BIP-340 Schnorr signature over a 32-byte digest.
pub fn verify(
    pubkey: &[u8; PUBKEY_SIZE],
    digest: &[u8; 32],
    signature: &[u8; SIGNATURE_SIZE],
) -> Result<(), CryptoError> {
    let xonly = XOnlyPublicKey::from_slice(pubkey)
        .map_err(|e| CryptoError::SignatureFailed(e.to_string()))?;
    let sig = secp256k1::schnorr::Signature::from_slice(signature)
        .map_err(|e| CryptoError::SignatureFailed(e.to_string()))?;
    let message = Message::from_digest(*digest);
    SECP256K1
        .verify_schnorr(&sig, &message, &xonly)
        .map_err(|e| CryptoError::SignatureFailed(e.to_string()))
}

/// Hash arbitrary bytes (the canonical JSON serialization of an event) to a
/// 32-byte digest using SHA-256, as Nostr event ids are defined.
pub fn event_id_digest(canonical_bytes: &[u8]) -> [u8; 32] {
    use secp256k1::hashes::Hash;
    sha256::Hash::hash(canonical_bytes).to_byte_array()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_round_trips() {
        let keypair = EphemeralKeypair::from_random_bytes(&[11u8; 32]).expect("keypair");
        let digest = event_id_digest(b"some canonical event bytes");
        let signature = keypair.sign(&digest);
        let pubkey = keypair.public_key();
        verify(&pubkey, &digest, &signature).expect("valid signature");
    }

    #[test]
    fn tampered_digest_fails_verification() {
        let keypair = EphemeralKeypair::from_random_bytes(&[11u8; 32]).expect("keypair");
        let digest = event_id_digest(b"some canonical event bytes");
        let signature = keypair.sign(&digest);
        let pubkey = keypair.public_key();
        let other_digest = event_id_digest(b"different bytes");
        assert!(verify(&pubkey, &other_digest, &signature).is_err());
    }

    #[test]
    fn distinct_random_bytes_yield_distinct_keys() {
        let a = EphemeralKeypair::from_random_bytes(&[1u8; 32]).expect("keypair");
        let b = EphemeralKeypair::from_random_bytes(&[2u8; 32]).expect("keypair");
        assert_ne!(a.public_key(), b.public_key());
    }
}
