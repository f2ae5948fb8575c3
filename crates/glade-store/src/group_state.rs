//! Group-state store (C7): opaque-bytes persistence of per-group MLS state.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;

/// Opaque bytes in, opaque bytes out, keyed by MLS group id. The library
/// owns the encode/decode of the bytes (see `glade-core::snapshot`);
/// backends only need to be portable key/value stores with per-key
/// atomicity (§4.6, §6 I1).
#[async_trait]
pub trait GroupStateStore: Send + Sync + 'static {
    /// Load the snapshot for `group_id`, or `None` if no group exists with that id.
    async fn get(&self, group_id: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;
    /// Atomically replace the snapshot for `group_id`.
    async fn set(&self, group_id: &[u8], state_bytes: Vec<u8>) -> Result<(), StoreError>;
    /// Delete the snapshot for `group_id`, if any.
    async fn remove(&self, group_id: &[u8]) -> Result<(), StoreError>;
    /// List the ids of every group with a persisted snapshot.
    async fn list(&self) -> Result<Vec<Vec<u8>>, StoreError>;
}

/// In-memory reference implementation, for tests and single-process use.
#[derive(Debug, Default)]
pub struct InMemoryGroupStateStore {
    inner: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl InMemoryGroupStateStore {
    /// Construct an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GroupStateStore for InMemoryGroupStateStore {
    async fn get(&self, group_id: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.inner.read().await.get(group_id).cloned())
    }

    async fn set(&self, group_id: &[u8], state_bytes: Vec<u8>) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .insert(group_id.to_vec(), state_bytes);
        Ok(())
    }

    async fn remove(&self, group_id: &[u8]) -> Result<(), StoreError> {
        self.inner.write().await.remove(group_id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Vec<u8>>, StoreError> {
        Ok(self.inner.read().await.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let store = InMemoryGroupStateStore::new();
        store.set(b"group-1", vec![1, 2, 3]).await.expect("set");
        let loaded = store.get(b"group-1").await.expect("get");
        assert_eq!(loaded, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn missing_group_returns_none() {
        let store = InMemoryGroupStateStore::new();
        assert_eq!(store.get(b"missing").await.expect("get"), None);
    }

    #[tokio::test]
    async fn remove_clears_snapshot() {
        let store = InMemoryGroupStateStore::new();
        store.set(b"group-1", vec![1]).await.expect("set");
        store.remove(b"group-1").await.expect("remove");
        assert_eq!(store.get(b"group-1").await.expect("get"), None);
    }

    #[tokio::test]
    async fn list_enumerates_groups() {
        let store = InMemoryGroupStateStore::new();
        store.set(b"a", vec![1]).await.expect("set");
        store.set(b"b", vec![2]).await.expect("set");
        let mut ids = store.list().await.expect("list");
        ids.sort();
        assert_eq!(ids, vec![b"a".to_vec(), b"b".to_vec()]);
    }
}
