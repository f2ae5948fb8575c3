//! Network interface (§6 I2).
//!
//! Subscription management against external relay pools and key-package
//! discovery are explicitly out of scope (non-goals); what remains in scope
//! is the thin surface the runtime itself calls directly: historical query,
//! publish-with-receipts, and inbox-relay lookup for gift-wrap delivery.

use async_trait::async_trait;

use glade_codec::event::{Event, PubKey};

use crate::error::RuntimeError;

/// A relay query filter (kind/author/tag/time-range constraints).
#[derive(Debug, Clone, Default)]
pub struct Filter {
    /// Event kinds to match.
    pub kinds: Vec<u16>,
    /// Author pubkeys to match.
    pub authors: Vec<PubKey>,
    /// `#h` tag values to match.
    pub tag_h: Vec<String>,
    /// `#e` tag values to match.
    pub tag_e: Vec<String>,
    /// `#p` tag values to match.
    pub tag_p: Vec<String>,
    /// Lower timestamp bound, inclusive.
    pub since: Option<i64>,
    /// Upper timestamp bound, inclusive.
    pub until: Option<i64>,
    /// Maximum events to return.
    pub limit: Option<usize>,
}

/// Per-relay result of a publish attempt.
#[derive(Debug, Clone)]
pub struct PublishReceipt {
    /// The relay URL this receipt is from.
    pub relay_url: String,
    /// Whether the relay accepted the event.
    pub ok: bool,
    /// An optional human-readable message from the relay (commonly sent on rejection).
    pub message: Option<String>,
}

/// External relay collaborator. A conforming implementation talks to actual
/// relay connections; the runtime only ever sees this trait.
#[async_trait]
pub trait Network: Send + Sync + 'static {
    /// Historical query against a set of relays.
    async fn request(&self, relays: &[String], filter: Filter) -> Result<Vec<Event>, RuntimeError>;
    /// Publish an event to a set of relays, returning one receipt per relay.
    async fn publish(&self, relays: &[String], event: Event) -> Result<Vec<PublishReceipt>, RuntimeError>;
    /// Resolve a pubkey's advertised inbox relays (for gift-wrap delivery).
    async fn get_user_inbox_relays(&self, pubkey: PubKey) -> Result<Vec<String>, RuntimeError>;
}

/// True if at least one relay acknowledged the publish.
pub fn any_acked(receipts: &[PublishReceipt]) -> bool {
    receipts.iter().any(|r| r.ok)
}
