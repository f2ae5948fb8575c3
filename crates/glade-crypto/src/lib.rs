//! Cryptographic primitives for group-event envelopes.
//!
//! Pure functions with deterministic outputs; callers provide random bytes
//! so tests can be deterministic.
//!
//! # Key hierarchy
//!
//! One symmetric key is derived per MLS epoch per group, bound to both the
//! epoch's MLS exporter secret and the group's routing id. There is no
//! per-message ratchet: MLS itself already provides forward secrecy across
//! epochs, and the envelope layer only needs one AEAD key per epoch.
//!
//! ```text
//! MLS Exporter Secret (epoch-scoped)
//!        │
//!        ▼
//! HKDF(exporter_secret, nostr_group_id) → Conversation Key
//!        │
//!        ▼
//! XChaCha20-Poly1305 Seal → Envelope Ciphertext
//! ```
//!
//! # Security
//!
//! - Forward secrecy and post-compromise security come from MLS epoch
//!   rotation; a new epoch's exporter secret invalidates every previously
//!   derived conversation key.
//! - Every outer event is signed by a fresh, never-reused ephemeral
//!   keypair, so signatures do not link events to a long-lived identity.
//! - XChaCha20-Poly1305 provides tamper-evident encryption; a failed
//!   authentication tag is surfaced as [`error::CryptoError::AeadFailed`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod aead;
pub mod dh;
pub mod error;
pub mod kdf;
pub mod signing;

pub use aead::{NONCE_SIZE, open, seal};
pub use error::CryptoError;
pub use kdf::{CONVERSATION_KEY_SIZE, derive_conversation_key, derive_gift_wrap_key, derive_key};
pub use signing::{EphemeralKeypair, PUBKEY_SIZE, SIGNATURE_SIZE, event_id_digest, verify};
