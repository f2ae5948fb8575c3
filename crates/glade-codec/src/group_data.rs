//! Group-metadata extension codec (C2, E4).
//!
//! Encodes the `MarmotGroupData` structure embedded in the MLS group context
//! extensions: group id, name, description, admin set, relay hints, and an
//! optional image triple. The wire is a hand-rolled big-endian
//! length-prefixed binary form, not TLS presentation encoding, since this
//! extension is opaque bytes to MLS itself (read out of `UnknownExtension`).

use crate::event::PubKey;
use crate::error::CodecError;

/// MLS extension type id assigned to the group-metadata extension (§6 I5).
pub const EXTENSION_TYPE: u16 = 0xF2EE;

/// Current wire version. Future versions may change image-field framing;
/// readers gate that decision on this field (see SPEC_FULL.md §9(a)).
pub const CURRENT_VERSION: u16 = 1;

const IMAGE_HASH_LEN: usize = 32;
const IMAGE_KEY_LEN: usize = 32;
const IMAGE_NONCE_LEN: usize = 12;

/// The optional group image triple: either entirely absent or all three
/// fields present at their fixed lengths. §9(a) resolves the ambiguity
/// between "all-null" and "all fixed-length" by making each field's
/// presence explicit via its own 16-bit length prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupImage {
    /// SHA-256 of the plaintext image.
    pub hash: [u8; IMAGE_HASH_LEN],
    /// Symmetric key used to encrypt the image blob.
    pub key: [u8; IMAGE_KEY_LEN],
    /// AEAD nonce used to encrypt the image blob.
    pub nonce: [u8; IMAGE_NONCE_LEN],
}

/// The group-scoped metadata extension (E4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarmotGroupData {
    /// Wire version; must be [`CURRENT_VERSION`] for this codec to apply.
    pub version: u16,
    /// Routing id used on the transport layer (`h` tag), distinct from the MLS group id.
    pub nostr_group_id: [u8; 32],
    /// Human-readable group name.
    pub name: String,
    /// Human-readable group description.
    pub description: String,
    /// Nostr pubkeys permitted to author commits (C9). Always includes the creator.
    pub admin_pubkeys: Vec<PubKey>,
    /// Relay hints for this group.
    pub relays: Vec<String>,
    /// Optional image triple.
    pub image: Option<GroupImage>,
}

fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn put_len_prefixed(out: &mut Vec<u8>, bytes: &[u8]) {
    put_u16(out, bytes.len() as u16);
    out.extend_from_slice(bytes);
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, pos: 0 }
    }

    fn take_u16(&mut self) -> Result<u16, CodecError> {
        let slice = self
            .bytes
            .get(self.pos..self.pos + 2)
            .ok_or(CodecError::MalformedExtension("truncated u16"))?;
        self.pos += 2;
        Ok(u16::from_be_bytes([slice[0], slice[1]]))
    }

    fn take_bytes(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        let slice = self
            .bytes
            .get(self.pos..self.pos + len)
            .ok_or(CodecError::MalformedExtension("truncated field"))?;
        self.pos += len;
        Ok(slice)
    }

    fn take_len_prefixed(&mut self) -> Result<&'a [u8], CodecError> {
        let len = self.take_u16()? as usize;
        self.take_bytes(len)
    }

    fn take_string(&mut self) -> Result<String, CodecError> {
        let bytes = self.take_len_prefixed()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::MalformedExtension("invalid utf8"))
    }
}

impl MarmotGroupData {
    /// Encode to the extension's binary wire form.
    ///
    /// Robust against being re-hydrated from a slice of a parent binary
    /// envelope at a nonzero offset: this function only ever writes to a
    /// freshly allocated `Vec`, and [`MarmotGroupData::decode`] only ever
    /// reads relative to the start of the slice it is given, never assuming
    /// anything about the byte offset of that slice within a larger buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_u16(&mut out, self.version);
        out.extend_from_slice(&self.nostr_group_id);
        put_len_prefixed(&mut out, self.name.as_bytes());
        put_len_prefixed(&mut out, self.description.as_bytes());

        put_u16(&mut out, self.admin_pubkeys.len() as u16);
        for admin in &self.admin_pubkeys {
            out.extend_from_slice(admin.to_hex().as_bytes());
        }

        put_u16(&mut out, self.relays.len() as u16);
        for relay in &self.relays {
            put_len_prefixed(&mut out, relay.as_bytes());
        }

        match &self.image {
            None => {
                put_u16(&mut out, 0);
                put_u16(&mut out, 0);
                put_u16(&mut out, 0);
            }
            Some(image) => {
                put_len_prefixed(&mut out, &image.hash);
                put_len_prefixed(&mut out, &image.key);
                put_len_prefixed(&mut out, &image.nonce);
            }
        }

        out
    }

    /// Decode from the extension's binary wire form. Rejects wrong lengths,
    /// invalid hex in the admin list, non-`ws(s)://` relay URLs, and
    /// truncated input.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut reader = Reader::new(bytes);

        let version = reader.take_u16()?;
        let nostr_group_id: [u8; 32] = reader
            .take_bytes(32)?
            .try_into()
            .map_err(|_| CodecError::MalformedExtension("group id"))?;
        let name = reader.take_string()?;
        let description = reader.take_string()?;

        let admin_count = reader.take_u16()? as usize;
        let mut admin_pubkeys = Vec::with_capacity(admin_count);
        for _ in 0..admin_count {
            let hex_bytes = reader.take_bytes(64)?;
            let hex_str =
                std::str::from_utf8(hex_bytes).map_err(|_| CodecError::InvalidPubkey)?;
            admin_pubkeys.push(PubKey::from_hex(hex_str)?);
        }

        let relay_count = reader.take_u16()? as usize;
        let mut relays = Vec::with_capacity(relay_count);
        for _ in 0..relay_count {
            let relay = reader.take_string()?;
            if !(relay.starts_with("ws://") || relay.starts_with("wss://")) {
                return Err(CodecError::InvalidRelayUrl(relay));
            }
            relays.push(relay);
        }

        let hash_field = reader.take_len_prefixed()?;
        let key_field = reader.take_len_prefixed()?;
        let nonce_field = reader.take_len_prefixed()?;

        let image = match (hash_field.len(), key_field.len(), nonce_field.len()) {
            (0, 0, 0) => None,
            (IMAGE_HASH_LEN, IMAGE_KEY_LEN, IMAGE_NONCE_LEN) => Some(GroupImage {
                hash: hash_field.try_into().expect("length checked above"),
                key: key_field.try_into().expect("length checked above"),
                nonce: nonce_field.try_into().expect("length checked above"),
            }),
            _ => return Err(CodecError::MalformedExtension("image field length")),
        };

        Ok(MarmotGroupData {
            version,
            nostr_group_id,
            name,
            description,
            admin_pubkeys,
            relays,
            image,
        })
    }
}
