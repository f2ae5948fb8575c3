//! Key-package codec (C5): `kind=443` events.
//!
//! This crate treats the MLS key package itself as an opaque TLS-encoded
//! byte string; extracting the basic credential's identity bytes to check
//! against the event author is the caller's job (it requires deserializing
//! the key package through the MLS provider, which lives in `glade-core`).
//! This module only owns the event framing: dual hex/base64 encoding, the
//! `relays`/`mls_version`/`cipher_suite`/`extensions` tags, and asserting
//! the binding once the caller has extracted the identity bytes.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::error::CodecError;
use crate::event::{Event, PubKey, Rumor, Tag};

/// Event kind for key-package events.
pub const KEY_PACKAGE_KIND: u16 = 443;

/// Fields recovered from a parsed `kind=443` event, alongside the raw key package bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPackageFields {
    /// TLS-encoded MLS key package bytes.
    pub key_package_bytes: Vec<u8>,
    /// Relay hints advertised for this key package.
    pub relays: Vec<String>,
    /// `mls_version` tag value, if present.
    pub mls_version: Option<String>,
    /// `cipher_suite` tag value, if present.
    pub cipher_suite: Option<String>,
    /// `extensions` tag values, if present.
    pub extensions: Vec<String>,
}

/// Build an unsigned key-package rumor. The caller signs it with the
/// identity's own signer (not an ephemeral key, unlike C3's envelopes).
///
/// `credential_identity` is the 32-byte identity extracted from the key
/// package's basic credential; it MUST equal `pubkey`'s bytes (E5 invariant).
pub fn build_key_package_rumor(
    pubkey: PubKey,
    created_at: i64,
    key_package_bytes: &[u8],
    credential_identity: &[u8],
    relays: Vec<String>,
    mls_version: &str,
    cipher_suite: &str,
    extensions: Vec<String>,
) -> Result<Rumor, CodecError> {
    if credential_identity != pubkey.0 {
        return Err(CodecError::CredentialBindingMismatch);
    }

    let content = BASE64.encode(key_package_bytes);
    let mut tags = vec![Tag::relays(relays), Tag::encoding("base64")];
    tags.push(Tag(vec!["mls_version".to_string(), mls_version.to_string()]));
    tags.push(Tag(vec![
        "cipher_suite".to_string(),
        cipher_suite.to_string(),
    ]));
    if !extensions.is_empty() {
        let mut ext_tag = vec!["extensions".to_string()];
        ext_tag.extend(extensions);
        tags.push(Tag(ext_tag));
    }

    Ok(Rumor::new(pubkey, created_at, KEY_PACKAGE_KIND, tags, content))
}

/// Parse a signed `kind=443` event, decoding its content per the `encoding`
/// tag. An absent tag means legacy hex (reader supports both).
pub fn parse_key_package_event(event: &Event) -> Result<KeyPackageFields, CodecError> {
    if event.kind != KEY_PACKAGE_KIND {
        return Err(CodecError::WrongKind {
            expected: KEY_PACKAGE_KIND,
            actual: event.kind,
        });
    }

    let encoding = Tag::find(&event.tags, "encoding");
    let key_package_bytes = match encoding {
        Some("base64") => BASE64
            .decode(&event.content)
            .map_err(|_| CodecError::DecodeFailed("invalid base64 content".to_string()))?,
        Some("hex") | None => hex::decode(&event.content)
            .map_err(|_| CodecError::DecodeFailed("invalid hex content".to_string()))?,
        Some(_) => return Err(CodecError::EncodingMismatch("base64|hex")),
    };

    Ok(KeyPackageFields {
        key_package_bytes,
        relays: Tag::find_values(&event.tags, "relays"),
        mls_version: Tag::find(&event.tags, "mls_version").map(str::to_string),
        cipher_suite: Tag::find(&event.tags, "cipher_suite").map(str::to_string),
        extensions: Tag::find_values(&event.tags, "extensions"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Signature;

    fn sign_rumor(rumor: Rumor) -> Event {
        // Tests don't exercise real signatures; the codec doesn't verify them.
        Event {
            rumor,
            sig: Signature([0u8; 64]),
        }
    }

    #[test]
    fn round_trips_base64_default() {
        let pubkey = PubKey([1u8; 32]);
        let rumor = build_key_package_rumor(
            pubkey,
            1000,
            b"fake key package bytes",
            &[1u8; 32],
            vec!["wss://relay.example".to_string()],
            "1.0",
            "MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519",
            vec![],
        )
        .expect("build");
        let event = sign_rumor(rumor);
        let fields = parse_key_package_event(&event).expect("parse");
        assert_eq!(fields.key_package_bytes, b"fake key package bytes");
        assert_eq!(fields.relays, vec!["wss://relay.example".to_string()]);
        assert_eq!(fields.mls_version.as_deref(), Some("1.0"));
    }

    #[test]
    fn legacy_hex_without_encoding_tag() {
        let rumor = Rumor::new(
            PubKey([1u8; 32]),
            1000,
            KEY_PACKAGE_KIND,
            vec![],
            hex::encode(b"legacy bytes"),
        );
        let event = sign_rumor(rumor);
        let fields = parse_key_package_event(&event).expect("parse");
        assert_eq!(fields.key_package_bytes, b"legacy bytes");
    }

    #[test]
    fn credential_mismatch_is_rejected() {
        let result = build_key_package_rumor(
            PubKey([1u8; 32]),
            1000,
            b"kp",
            &[2u8; 32],
            vec![],
            "1.0",
            "cs",
            vec![],
        );
        assert!(matches!(
            result,
            Err(CodecError::CredentialBindingMismatch)
        ));
    }
}
