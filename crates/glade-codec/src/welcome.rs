//! Welcome codec + gift-wrap (C6): `kind=444` rumors and `kind=1059` gift-wraps.
//!
//! A Welcome rumor is never signed (E6). It is delivered to the invitee
//! wrapped in a sender-anonymizing gift-wrap: a `kind=1059` event signed by
//! a fresh ephemeral keypair, whose content is the Welcome rumor's canonical
//! JSON sealed under a key derived from an ECDH shared secret between that
//! ephemeral keypair and the invitee's identity key.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use glade_crypto::aead::{self, NONCE_SIZE};
use glade_crypto::dh::shared_secret;
use glade_crypto::kdf::derive_gift_wrap_key;
use glade_crypto::signing::EphemeralKeypair;

use crate::error::CodecError;
use crate::event::{Event, EventId, PubKey, Rumor, Signature, Tag, deserialize_rumor, serialize_rumor};

/// Event kind for Welcome rumors.
pub const WELCOME_KIND: u16 = 444;
/// Event kind for gift-wrap envelopes (NIP-59 convention).
pub const GIFT_WRAP_KIND: u16 = 1059;

/// Build the unsigned Welcome rumor (E6) for a single invitee.
///
/// `key_package_event_id` identifies which local key package the Welcome is
/// addressed to; `relays` advertise the group's relay hints.
pub fn build_welcome_rumor(
    inviter_pubkey: PubKey,
    created_at: i64,
    welcome_tls_bytes: &[u8],
    key_package_event_id: EventId,
    relays: Vec<String>,
) -> Rumor {
    let content = BASE64.encode(welcome_tls_bytes);
    let tags = vec![
        Tag::relays(relays),
        Tag::encoding("base64"),
        Tag::event_ref(key_package_event_id),
    ];
    Rumor::new(inviter_pubkey, created_at, WELCOME_KIND, tags, content)
}

/// Parse a Welcome rumor, decoding its content per the `encoding` tag.
pub fn parse_welcome_rumor(rumor: &Rumor) -> Result<(Vec<u8>, EventId, Vec<String>), CodecError> {
    if rumor.kind != WELCOME_KIND {
        return Err(CodecError::WrongKind {
            expected: WELCOME_KIND,
            actual: rumor.kind,
        });
    }
    let encoding = Tag::find(&rumor.tags, "encoding");
    let welcome_bytes = match encoding {
        Some("base64") | None => BASE64
            .decode(&rumor.content)
            .map_err(|_| CodecError::DecodeFailed("invalid base64 content".to_string()))?,
        Some("hex") => hex::decode(&rumor.content)
            .map_err(|_| CodecError::DecodeFailed("invalid hex content".to_string()))?,
        Some(_) => return Err(CodecError::EncodingMismatch("base64|hex")),
    };
    let key_package_event_id = Tag::find(&rumor.tags, "e")
        .ok_or(CodecError::MalformedExtension("welcome missing e tag"))
        .and_then(EventId::from_hex)?;
    let relays = Tag::find_values(&rumor.tags, "relays");
    Ok((welcome_bytes, key_package_event_id, relays))
}

/// Gift-wrap a Welcome rumor for delivery to `recipient`.
///
/// Generates a fresh ephemeral keypair (distinct from the one used for
/// C3 envelopes), derives an ECDH shared secret with the recipient's
/// identity key, and seals the rumor's canonical JSON under a key derived
/// from that shared secret.
pub fn gift_wrap(
    ephemeral: &EphemeralKeypair,
    ephemeral_secret_bytes: &[u8; 32],
    recipient: PubKey,
    nonce: &[u8; NONCE_SIZE],
    created_at: i64,
    welcome_rumor: &Rumor,
) -> Result<Event, CodecError> {
    let plaintext = serialize_rumor(welcome_rumor)?;
    let shared = shared_secret(ephemeral_secret_bytes, &recipient.0)
        .map_err(|_| CodecError::DecodeFailed("ecdh failed".to_string()))?;
    let key = derive_gift_wrap_key(&shared).map_err(|_| CodecError::DecodeFailed("kdf failed".to_string()))?;
    let ciphertext = aead::seal(&key, nonce, &plaintext).map_err(|_| CodecError::MalformedEnvelope)?;

    let mut framed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    framed.extend_from_slice(nonce);
    framed.extend_from_slice(&ciphertext);
    let content = BASE64.encode(framed);

    let pubkey = PubKey(ephemeral.public_key());
    let tags = vec![Tag(vec!["p".to_string(), recipient.to_hex()])];
    let rumor = Rumor::new(pubkey, created_at, GIFT_WRAP_KIND, tags, content);
    let sig = Signature(ephemeral.sign(&rumor.id.0));
    Ok(Event { rumor, sig })
}

/// Unwrap a gift-wrap addressed to `recipient_secret_bytes`'s owner, recovering the inner Welcome rumor.
pub fn open_gift_wrap(
    gift_wrap_event: &Event,
    recipient_secret_bytes: &[u8; 32],
) -> Result<Rumor, CodecError> {
    if gift_wrap_event.kind != GIFT_WRAP_KIND {
        return Err(CodecError::WrongKind {
            expected: GIFT_WRAP_KIND,
            actual: gift_wrap_event.kind,
        });
    }
    let sender = gift_wrap_event.pubkey;
    let shared = shared_secret(recipient_secret_bytes, &sender.0)
        .map_err(|_| CodecError::DecodeFailed("ecdh failed".to_string()))?;
    let key = derive_gift_wrap_key(&shared).map_err(|_| CodecError::DecodeFailed("kdf failed".to_string()))?;

    let raw = BASE64
        .decode(&gift_wrap_event.content)
        .map_err(|_| CodecError::MalformedEnvelope)?;
    if raw.len() < NONCE_SIZE {
        return Err(CodecError::MalformedEnvelope);
    }
    let (nonce_bytes, ciphertext) = raw.split_at(NONCE_SIZE);
    let nonce: [u8; NONCE_SIZE] = nonce_bytes
        .try_into()
        .map_err(|_| CodecError::MalformedEnvelope)?;
    let plaintext = aead::open(&key, &nonce, ciphertext).map_err(|_| CodecError::DecryptFailed)?;
    deserialize_rumor(&plaintext)
}
