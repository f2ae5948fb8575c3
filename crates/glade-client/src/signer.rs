//! Identity signer (§6 I3).
//!
//! The library never holds private identity material directly: every
//! operation that needs a Nostr signature goes through this trait. Gift-wrap
//! opening is deliberately not part of this interface — it needs the raw
//! ECDH scalar, not just a signing capability, and is left to the embedding
//! application.

use async_trait::async_trait;
use secp256k1::{Keypair, Message, SECP256K1, SecretKey};

use glade_codec::event::{Event, PubKey, Rumor, Signature};

use crate::error::ClientError;

/// Produces a public key and signs rumors into events.
#[async_trait]
pub trait Signer: Send + Sync + 'static {
    /// The signer's 32-byte Nostr public key.
    fn public_key(&self) -> PubKey;
    /// Sign a rumor, producing a publishable event.
    async fn sign_event(&self, rumor: Rumor) -> Result<Event, ClientError>;
}

/// Reference [`Signer`] backed by a long-lived in-process secp256k1 keypair.
///
/// Suitable for tests and single-process deployments; production embedders
/// are expected to supply their own [`Signer`] backed by a hardware key, a
/// remote signer (NIP-46), or an OS keychain.
pub struct LocalSigner {
    keypair: Keypair,
}

impl LocalSigner {
    /// Wrap a raw 32-byte secret key.
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Result<Self, ClientError> {
        let secret_key = SecretKey::from_slice(secret)
            .map_err(|e| ClientError::SignerFailed(e.to_string()))?;
        Ok(Self {
            keypair: Keypair::from_secret_key(SECP256K1, &secret_key),
        })
    }
}

#[async_trait]
impl Signer for LocalSigner {
    fn public_key(&self) -> PubKey {
        PubKey(self.keypair.x_only_public_key().0.serialize())
    }

    async fn sign_event(&self, rumor: Rumor) -> Result<Event, ClientError> {
        rumor
            .verify_id()
            .map_err(|e| ClientError::SignerFailed(e.to_string()))?;
        let message = Message::from_digest(rumor.id.0);
        let sig = self.keypair.sign_schnorr(message);
        Ok(Event {
            rumor,
            sig: Signature(sig.serialize()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn signs_event_matching_own_public_key() {
        let signer = LocalSigner::from_secret_bytes(&[7u8; 32]).expect("signer");
        let rumor = Rumor::new(signer.public_key(), 1000, 9, vec![], "hi".to_string());
        let event = signer.sign_event(rumor.clone()).await.expect("sign");
        assert_eq!(event.rumor, rumor);
        glade_crypto::signing::verify(&signer.public_key().0, &event.id.0, &event.sig.0)
            .expect("valid signature");
    }
}
