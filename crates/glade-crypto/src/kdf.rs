//! Key derivation for the envelope transport layer.
//!
//! The conversation key for a given MLS epoch is bound to both the epoch's
//! MLS exporter secret and the group's routing id (`nostr_group_id`), so a
//! key derived for one group can never be reused against another even if two
//! groups somehow shared an exporter secret.

use hkdf::Hkdf;
use sha2::Sha256;

use crate::error::CryptoError;

/// Length in bytes of a derived envelope conversation key (XChaCha20-Poly1305).
pub const CONVERSATION_KEY_SIZE: usize = 32;

const CONVERSATION_KEY_INFO: &[u8] = b"glade-envelope-conversation-key-v1";
const GIFT_WRAP_KEY_INFO: &[u8] = b"glade-gift-wrap-key-v1";

/// Expand `ikm` (salted with `salt`, if any) into a 32-byte key bound to `info`.
pub fn derive_key(salt: Option<&[u8]>, ikm: &[u8], info: &[u8]) -> Result<[u8; 32], CryptoError> {
    let hk = Hkdf::<Sha256>::new(salt, ikm);
    let mut key = [0u8; 32];
    hk.expand(info, &mut key)
        .map_err(|e| CryptoError::KdfFailed(e.to_string()))?;
    Ok(key)
}

/// Derive the symmetric conversation key for one MLS epoch of one group.
///
/// `exporter_secret` is the epoch-scoped secret pulled from the MLS provider
/// (label `"nostr"`, context `b"nostr"`, length 32). `nostr_group_id` is the
/// group's 32-byte routing id, distinct from the MLS group id.
pub fn derive_conversation_key(
    exporter_secret: &[u8],
    nostr_group_id: &[u8; 32],
) -> Result<[u8; CONVERSATION_KEY_SIZE], CryptoError> {
    derive_key(Some(nostr_group_id), exporter_secret, CONVERSATION_KEY_INFO)
}

/// Derive the symmetric key used to seal a gift-wrap, from an ECDH shared
/// secret between a fresh ephemeral keypair and the recipient's identity key.
pub fn derive_gift_wrap_key(ecdh_shared_secret: &[u8; 32]) -> Result<[u8; 32], CryptoError> {
    derive_key(None, ecdh_shared_secret, GIFT_WRAP_KEY_INFO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let secret = [7u8; 32];
        let group_id = [9u8; 32];
        let a = derive_conversation_key(&secret, &group_id).expect("derive");
        let b = derive_conversation_key(&secret, &group_id).expect("derive");
        assert_eq!(a, b);
    }

    #[test]
    fn different_group_ids_diverge() {
        let secret = [7u8; 32];
        let a = derive_conversation_key(&secret, &[1u8; 32]).expect("derive");
        let b = derive_conversation_key(&secret, &[2u8; 32]).expect("derive");
        assert_ne!(a, b);
    }

    #[test]
    fn different_secrets_diverge() {
        let group_id = [9u8; 32];
        let a = derive_conversation_key(&[1u8; 32], &group_id).expect("derive");
        let b = derive_conversation_key(&[2u8; 32], &group_id).expect("derive");
        assert_ne!(a, b);
    }
}
