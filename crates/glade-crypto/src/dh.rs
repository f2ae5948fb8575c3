//! ECDH shared secrets for gift-wrap key agreement.

use secp256k1::ecdh::SharedSecret;
use secp256k1::{Parity, SecretKey, XOnlyPublicKey};

use crate::error::CryptoError;

/// Compute the ECDH shared secret between a local secret key and a remote
/// x-only (Nostr-style) public key, assuming even parity as Nostr does.
pub fn shared_secret(
    local_secret: &[u8; 32],
    remote_xonly_pubkey: &[u8; 32],
) -> Result<[u8; 32], CryptoError> {
    let sk = SecretKey::from_slice(local_secret)
        .map_err(|e| CryptoError::SignatureFailed(e.to_string()))?;
    let xonly = XOnlyPublicKey::from_slice(remote_xonly_pubkey)
        .map_err(|e| CryptoError::SignatureFailed(e.to_string()))?;
    let pk = xonly.public_key(Parity::Even);
    let shared = SharedSecret::new(&pk, &sk);
    Ok(*shared.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::EphemeralKeypair;

    #[test]
    fn deterministic_for_same_inputs() {
        let local = [1u8; 32];
        let remote = EphemeralKeypair::from_random_bytes(&[2u8; 32])
            .expect("keypair")
            .public_key();
        let a = shared_secret(&local, &remote).expect("dh");
        let b = shared_secret(&local, &remote).expect("dh");
        assert_eq!(a, b);
    }

    #[test]
    fn different_remote_keys_diverge() {
        let local = [1u8; 32];
        let remote_a = EphemeralKeypair::from_random_bytes(&[2u8; 32])
            .expect("keypair")
            .public_key();
        let remote_b = EphemeralKeypair::from_random_bytes(&[3u8; 32])
            .expect("keypair")
            .public_key();
        let a = shared_secret(&local, &remote_a).expect("dh");
        let b = shared_secret(&local, &remote_b).expect("dh");
        assert_ne!(a, b);
    }
}
