//! Nostr-style signed events and unsigned rumors (E1), and the
//! application-rumor codec (C4).
//!
//! `Event` and `Rumor` are deliberately distinct types rather than one
//! struct with an optional `sig` field: the distinction is enforced by the
//! type system instead of by a runtime check, the same newtype-over-option
//! idiom used elsewhere in this codebase.

use glade_crypto::signing::event_id_digest;
use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// A 32-byte event id, the SHA-256 hash of an event's canonical serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub [u8; 32]);

/// A 32-byte Nostr public key (x-only secp256k1 point).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PubKey(pub [u8; 32]);

/// A 64-byte BIP-340 Schnorr signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; 64]);

macro_rules! hex_newtype {
    ($ty:ident, $len:literal) => {
        impl $ty {
            /// Parse from lowercase hex.
            pub fn from_hex(s: &str) -> Result<Self, CodecError> {
                let mut buf = [0u8; $len];
                hex::decode_to_slice(s, &mut buf).map_err(|_| CodecError::InvalidPubkey)?;
                Ok(Self(buf))
            }

            /// Render as lowercase hex.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl Serialize for $ty {
            fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
                s.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                let s = String::deserialize(d)?;
                $ty::from_hex(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_newtype!(EventId, 32);
hex_newtype!(PubKey, 32);

impl Signature {
    /// Parse from lowercase hex.
    pub fn from_hex(s: &str) -> Result<Self, CodecError> {
        let mut buf = [0u8; 64];
        hex::decode_to_slice(s, &mut buf).map_err(|_| CodecError::InvalidPubkey)?;
        Ok(Self(buf))
    }

    /// Render as lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// A single Nostr tag: `[name, value, ...]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag(pub Vec<String>);

impl Tag {
    /// Tag name (first element), if present.
    pub fn name(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// Tag values (everything after the name).
    pub fn values(&self) -> &[String] {
        self.0.get(1..).unwrap_or(&[])
    }

    /// Build the `h <nostr_group_id_hex>` routing tag (C3).
    pub fn routing(nostr_group_id: &[u8; 32]) -> Self {
        Tag(vec!["h".to_string(), hex::encode(nostr_group_id)])
    }

    /// Build an `e <event_id_hex>` reference tag (C5/C6).
    pub fn event_ref(id: EventId) -> Self {
        Tag(vec!["e".to_string(), id.to_hex()])
    }

    /// Build a `relays wss://… …` tag.
    pub fn relays(urls: impl IntoIterator<Item = String>) -> Self {
        let mut values = vec!["relays".to_string()];
        values.extend(urls);
        Tag(values)
    }

    /// Build an `encoding base64|hex` tag.
    pub fn encoding(scheme: &str) -> Self {
        Tag(vec!["encoding".to_string(), scheme.to_string()])
    }

    /// Find the first value following a tag named `name`.
    pub fn find<'a>(tags: &'a [Tag], name: &str) -> Option<&'a str> {
        tags.iter()
            .find(|t| t.name() == Some(name))
            .and_then(|t| t.values().first())
            .map(String::as_str)
    }

    /// Find all values of the first tag named `name` (e.g. multi-value `relays`/`extensions`).
    pub fn find_values(tags: &[Tag], name: &str) -> Vec<String> {
        tags.iter()
            .find(|t| t.name() == Some(name))
            .map(|t| t.values().to_vec())
            .unwrap_or_default()
    }
}

/// An unsigned event: identical shape to [`Event`] minus the signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rumor {
    /// Hash of the canonical serialization below.
    pub id: EventId,
    /// Author's public key.
    pub pubkey: PubKey,
    /// Unix timestamp, seconds.
    pub created_at: i64,
    /// Event kind.
    pub kind: u16,
    /// Tags.
    pub tags: Vec<Tag>,
    /// Free-form content (often itself an encoded payload).
    pub content: String,
}

/// A signed event: a [`Rumor`] plus a Schnorr signature over its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// The signed rumor.
    pub rumor: Rumor,
    /// Schnorr signature by `rumor.pubkey` over `rumor.id`.
    pub sig: Signature,
}

impl std::ops::Deref for Event {
    type Target = Rumor;
    fn deref(&self) -> &Rumor {
        &self.rumor
    }
}

/// NIP-01 canonical array form used only to compute/verify the event id:
/// `[0, pubkey, created_at, kind, tags, content]`.
fn canonical_id_bytes(pubkey: &PubKey, created_at: i64, kind: u16, tags: &[Tag], content: &str) -> Vec<u8> {
    let value = serde_json::json!([0, pubkey.to_hex(), created_at, kind, tags, content]);
    serde_json::to_vec(&value).expect("json serialization of plain value cannot fail")
}

impl Rumor {
    /// Construct a rumor, computing its `id` from the other fields.
    pub fn new(pubkey: PubKey, created_at: i64, kind: u16, tags: Vec<Tag>, content: String) -> Self {
        let digest = event_id_digest(&canonical_id_bytes(&pubkey, created_at, kind, &tags, &content));
        Rumor {
            id: EventId(digest),
            pubkey,
            created_at,
            kind,
            tags,
            content,
        }
    }

    /// Recompute the id from this rumor's fields and check it matches `self.id`.
    pub fn verify_id(&self) -> Result<(), CodecError> {
        let digest = event_id_digest(&canonical_id_bytes(
            &self.pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        ));
        if digest == self.id.0 {
            Ok(())
        } else {
            Err(CodecError::RumorIdMismatch)
        }
    }
}

/// Wire shape for a rumor (C4): an object with no `sig` key at all.
#[derive(Serialize, Deserialize)]
struct RumorWire {
    id: String,
    pubkey: String,
    created_at: i64,
    kind: u16,
    tags: Vec<Tag>,
    content: String,
}

/// Serialize a rumor to the canonical JSON object carried as an MLS
/// application payload. Fails if the caller's rumor id does not match its
/// own fields (the type has no `sig` field, so "caller set a signature"
/// cannot happen at this layer).
pub fn serialize_rumor(rumor: &Rumor) -> Result<Vec<u8>, CodecError> {
    rumor.verify_id()?;
    let wire = RumorWire {
        id: rumor.id.to_hex(),
        pubkey: rumor.pubkey.to_hex(),
        created_at: rumor.created_at,
        kind: rumor.kind,
        tags: rumor.tags.clone(),
        content: rumor.content.clone(),
    };
    serde_json::to_vec(&wire).map_err(|e| CodecError::DecodeFailed(e.to_string()))
}

/// Deserialize a rumor from JSON, rejecting it if a `sig` key is present and
/// rejecting it if the embedded `id` does not match the hash of the
/// canonical form (§8 property 5, rumor round-trip).
pub fn deserialize_rumor(bytes: &[u8]) -> Result<Rumor, CodecError> {
    let raw: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| CodecError::DecodeFailed(e.to_string()))?;
    if raw.get("sig").is_some() {
        return Err(CodecError::UnexpectedSignature);
    }
    let wire: RumorWire =
        serde_json::from_value(raw).map_err(|e| CodecError::DecodeFailed(e.to_string()))?;
    let rumor = Rumor {
        id: EventId::from_hex(&wire.id)?,
        pubkey: PubKey::from_hex(&wire.pubkey)?,
        created_at: wire.created_at,
        kind: wire.kind,
        tags: wire.tags,
        content: wire.content,
    };
    rumor.verify_id()?;
    Ok(rumor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rumor() -> Rumor {
        Rumor::new(
            PubKey([0x42; 32]),
            1_700_000_000,
            9,
            vec![Tag(vec!["h".to_string(), hex::encode([1u8; 32])])],
            "hi".to_string(),
        )
    }

    #[test]
    fn rumor_round_trips() {
        let rumor = sample_rumor();
        let bytes = serialize_rumor(&rumor).expect("serialize");
        let recovered = deserialize_rumor(&bytes).expect("deserialize");
        assert_eq!(recovered, rumor);
    }

    #[test]
    fn rumor_with_sig_key_is_rejected() {
        let rumor = sample_rumor();
        let mut value: serde_json::Value =
            serde_json::from_slice(&serialize_rumor(&rumor).unwrap()).unwrap();
        value["sig"] = serde_json::Value::String("a".repeat(128));
        let bytes = serde_json::to_vec(&value).unwrap();
        assert!(matches!(
            deserialize_rumor(&bytes),
            Err(CodecError::UnexpectedSignature)
        ));
    }

    #[test]
    fn tampered_content_breaks_id_match() {
        let rumor = sample_rumor();
        let mut value: serde_json::Value =
            serde_json::from_slice(&serialize_rumor(&rumor).unwrap()).unwrap();
        value["content"] = serde_json::Value::String("tampered".to_string());
        let bytes = serde_json::to_vec(&value).unwrap();
        assert!(matches!(
            deserialize_rumor(&bytes),
            Err(CodecError::RumorIdMismatch)
        ));
    }

    #[test]
    fn tag_helpers_round_trip() {
        let group_id = [7u8; 32];
        let tag = Tag::routing(&group_id);
        assert_eq!(tag.name(), Some("h"));
        assert_eq!(tag.values(), [hex::encode(group_id)]);
    }
}
