//! Envelope codec (C3): outer `kind=445` group events.
//!
//! This module builds and parses the transport layer only. Deriving the
//! conversation key from an MLS exporter secret ([`glade_crypto::kdf`]) and
//! choosing which epoch(s) to try on decrypt failure is the caller's
//! responsibility (the group runtime owns the exporter-secret window);
//! [`open_with_candidates`] accepts an ordered iterator of candidate keys so
//! the runtime can retry adjacent epochs per §4.3.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use glade_crypto::aead::{self, NONCE_SIZE};
use glade_crypto::signing::EphemeralKeypair;

use crate::error::CodecError;
use crate::event::{Event, PubKey, Rumor, Signature, Tag};

/// Event kind for outer group events.
pub const GROUP_EVENT_KIND: u16 = 445;

/// Build a signed `kind=445` envelope wrapping an already-serialized MLS message.
///
/// `conversation_key`/`nonce` are the output of [`glade_crypto::kdf::derive_conversation_key`]
/// and caller-supplied randomness respectively. The event is signed by a
/// fresh `ephemeral` keypair (never reused across events, per §4.3).
pub fn seal_envelope(
    ephemeral: &EphemeralKeypair,
    nostr_group_id: &[u8; 32],
    conversation_key: &[u8; 32],
    nonce: &[u8; NONCE_SIZE],
    mls_message_bytes: &[u8],
    created_at: i64,
) -> Result<Event, CodecError> {
    let ciphertext = aead::seal(conversation_key, nonce, mls_message_bytes)
        .map_err(|_| CodecError::MalformedEnvelope)?;

    let mut framed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    framed.extend_from_slice(nonce);
    framed.extend_from_slice(&ciphertext);
    let content = BASE64.encode(framed);

    let pubkey = PubKey(ephemeral.public_key());
    let tags = vec![Tag::routing(nostr_group_id)];
    let rumor = Rumor::new(pubkey, created_at, GROUP_EVENT_KIND, tags, content);
    let sig = Signature(ephemeral.sign(&rumor.id.0));

    Ok(Event { rumor, sig })
}

/// Validate kind and extract+check the `h` routing tag against `nostr_group_id`.
pub fn verify_kind_and_routing(event: &Event, nostr_group_id: &[u8; 32]) -> Result<(), CodecError> {
    if event.kind != GROUP_EVENT_KIND {
        return Err(CodecError::WrongKind {
            expected: GROUP_EVENT_KIND,
            actual: event.kind,
        });
    }
    let routing_hex = Tag::find(&event.tags, "h").ok_or(CodecError::MissingRoutingTag)?;
    if routing_hex != hex::encode(nostr_group_id) {
        return Err(CodecError::MissingRoutingTag);
    }
    Ok(())
}

fn unframe_content(content: &str) -> Result<([u8; NONCE_SIZE], Vec<u8>), CodecError> {
    let raw = BASE64.decode(content).map_err(|_| CodecError::MalformedEnvelope)?;
    if raw.len() < NONCE_SIZE {
        return Err(CodecError::MalformedEnvelope);
    }
    let (nonce_bytes, ciphertext) = raw.split_at(NONCE_SIZE);
    let nonce: [u8; NONCE_SIZE] = nonce_bytes
        .try_into()
        .map_err(|_| CodecError::MalformedEnvelope)?;
    Ok((nonce, ciphertext.to_vec()))
}

/// Open an envelope with a single candidate conversation key.
pub fn open_with_key(
    event: &Event,
    nostr_group_id: &[u8; 32],
    key: &[u8; 32],
) -> Result<Vec<u8>, CodecError> {
    verify_kind_and_routing(event, nostr_group_id)?;
    let (nonce, ciphertext) = unframe_content(&event.content)?;
    aead::open(key, &nonce, &ciphertext).map_err(|_| CodecError::DecryptFailed)
}

/// Open an envelope, trying each candidate key in order (current epoch first,
/// then adjacent epochs within the caller's retention window). Returns
/// `DecryptFailed` only once every candidate has been tried, classifying the
/// event as unreadable (epoch-mismatch) per §4.3.
pub fn open_with_candidates(
    event: &Event,
    nostr_group_id: &[u8; 32],
    candidate_keys: impl IntoIterator<Item = [u8; 32]>,
) -> Result<Vec<u8>, CodecError> {
    verify_kind_and_routing(event, nostr_group_id)?;
    let (nonce, ciphertext) = unframe_content(&event.content)?;
    for key in candidate_keys {
        if let Ok(plaintext) = aead::open(&key, &nonce, &ciphertext) {
            return Ok(plaintext);
        }
    }
    Err(CodecError::DecryptFailed)
}
