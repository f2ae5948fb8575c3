//! Group runtime: ingest pipeline, admin policy, and the MLS-backed state
//! machine for one group (C7, C9, C10).
//!
//! This crate has no transport or storage opinions of its own beyond the
//! trait boundaries it defines (`network`, and the `GroupStateStore`/
//! `HistoryStore` traits it consumes from `glade-store`); wiring concrete
//! relay connections and backends together is the client façade's job.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod admin;
pub mod env;
pub mod error;
pub mod network;
pub mod provider;
pub mod runtime;
pub mod snapshot;

pub use admin::ValidationResult;
pub use env::Environment;
pub use error::RuntimeError;
pub use network::{Filter, Network, PublishReceipt};
pub use provider::{EnvironmentRng, GroupsProvider};
pub use runtime::{CommitOutcome, GroupRuntime, GroupRuntimeConfig, IngestOutcome, generate_key_package};
