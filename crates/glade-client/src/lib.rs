//! Client façade (C11).
//!
//! Owns one identity's signer, MLS credential key, and storage/network
//! collaborators, and exposes group lifecycle operations (`createGroup`,
//! `getGroup`, `joinGroupFromWelcome`, `loadAllGroups`, `destroyGroup`).
//! Per-group state-advancing operations (ingest, send, propose, commit) are
//! reached through the `Arc<tokio::sync::Mutex<GroupRuntime<E>>>` handle
//! [`Client::get_group`] returns, which is the per-group logical lock §5
//! requires.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod client;
mod error;
mod signer;

pub use client::Client;
pub use error::ClientError;
pub use signer::{LocalSigner, Signer};
