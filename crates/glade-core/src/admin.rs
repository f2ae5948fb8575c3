//! Admin policy callback (C9).
//!
//! Invoked by the group runtime while processing a staged commit: maps the
//! sender's MLS basic-credential identity to a Nostr pubkey and checks it
//! against the group's admin set (§4.8). Rejecting a commit here must leave
//! group state untouched — the runtime enforces that by checking this
//! *before* calling `merge_staged_commit`.

use glade_codec::event::PubKey;
use glade_codec::group_data::MarmotGroupData;

/// Outcome of checking a commit's author against the group's admin set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// The sender is an admin; the commit may proceed.
    Accept,
    /// The sender is not an admin, or its credential could not be mapped to
    /// a Nostr pubkey at all. The commit must not advance group state.
    Reject {
        /// Human-readable reason, carried into `IngestOutcome::CommitRejected`.
        reason: String,
    },
}

/// Extract the 32-byte Nostr pubkey from an MLS basic credential's identity
/// bytes. Tolerates the legacy convention of storing 64 ASCII hex characters
/// instead of 32 raw bytes (§4.8 step 2).
pub fn extract_pubkey(credential_identity: &[u8]) -> Option<PubKey> {
    if credential_identity.len() == 32 {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(credential_identity);
        return Some(PubKey(bytes));
    }
    if credential_identity.len() == 64 {
        let hex_str = std::str::from_utf8(credential_identity).ok()?;
        return PubKey::from_hex(hex_str).ok();
    }
    None
}

/// Check whether `credential_identity` names an admin of `group_data`.
pub fn check_commit_author(credential_identity: &[u8], group_data: &MarmotGroupData) -> ValidationResult {
    let Some(pubkey) = extract_pubkey(credential_identity) else {
        return ValidationResult::Reject {
            reason: "commit author credential is not a recognized basic credential identity".to_string(),
        };
    };
    if group_data.admin_pubkeys.contains(&pubkey) {
        ValidationResult::Accept
    } else {
        ValidationResult::Reject {
            reason: format!("{pubkey} is not an admin of this group"),
        }
    }
}
