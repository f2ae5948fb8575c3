//! Wire codecs for the group-event transport: Nostr-style events and rumors
//! (E1), the group-metadata extension (C2), outer group envelopes (C3),
//! application rumors (C4), key packages (C5), and Welcomes + gift-wrap (C6).
//!
//! This crate has no knowledge of MLS state machinery; it only builds and
//! parses the byte shapes that carry MLS's own outputs across the wire. The
//! group runtime (`glade-core`) owns deriving exporter secrets and invoking
//! the MLS provider; this crate owns everything downstream of "here are some
//! bytes to seal" and upstream of "here are some bytes to hand to MLS".

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod cursor;
pub mod envelope;
pub mod error;
pub mod event;
pub mod group_data;
pub mod key_package;
pub mod welcome;

pub use cursor::OuterCursor;
pub use error::CodecError;
pub use event::{Event, EventId, PubKey, Rumor, Signature, Tag};
pub use group_data::{EXTENSION_TYPE, GroupImage, MarmotGroupData};
