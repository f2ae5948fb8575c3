//! Storage interfaces (§6 I1): group-state snapshots (C7), history (C8),
//! and locally generated key packages. Backends are opaque-bytes key/value
//! stores; the library owns all encoding.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod error;
pub mod group_state;
pub mod history;
pub mod key_package;

pub use error::StoreError;
pub use group_state::{GroupStateStore, InMemoryGroupStateStore};
pub use history::{HistoryEntry, HistoryStore, InMemoryHistoryStore, SubscriptionId};
pub use key_package::{InMemoryKeyPackageStore, KeyPackageRecord, KeyPackageStore, KeyPackageSummary};
