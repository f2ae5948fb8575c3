//! Key-package store (§6 I1): key/value of `(ref: 32 bytes) -> {public, private}`.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;

/// A stored key package's two halves: the TLS-encoded public key package
/// served to others, and the private material needed to join a group that
/// Welcomes this key package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPackageRecord {
    /// TLS-encoded key package bytes, as published in a `kind=443` event.
    pub public_tls_bytes: Vec<u8>,
    /// Private init/leaf material needed to process a Welcome for this key package.
    pub private_bytes: Vec<u8>,
    /// If true, this key package is never removed after being consumed (E5).
    pub last_resort: bool,
}

/// Summary returned by [`KeyPackageStore::list`]: refs plus public halves only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPackageSummary {
    /// The key package's hash reference.
    pub reference: [u8; 32],
    /// TLS-encoded public key package bytes.
    pub public_tls_bytes: Vec<u8>,
}

/// Storage for locally generated key packages, keyed by hash reference.
#[async_trait]
pub trait KeyPackageStore: Send + Sync + 'static {
    /// Store a newly generated key package.
    async fn put(&self, reference: [u8; 32], record: KeyPackageRecord) -> Result<(), StoreError>;
    /// Load a key package by reference.
    async fn get(&self, reference: &[u8; 32]) -> Result<Option<KeyPackageRecord>, StoreError>;
    /// Remove a key package (called on first successful consumption unless `last_resort`).
    async fn remove(&self, reference: &[u8; 32]) -> Result<(), StoreError>;
    /// List every stored key package's reference and public half.
    async fn list(&self) -> Result<Vec<KeyPackageSummary>, StoreError>;
}

/// In-memory reference implementation.
#[derive(Debug, Default)]
pub struct InMemoryKeyPackageStore {
    inner: RwLock<HashMap<[u8; 32], KeyPackageRecord>>,
}

impl InMemoryKeyPackageStore {
    /// Construct an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyPackageStore for InMemoryKeyPackageStore {
    async fn put(&self, reference: [u8; 32], record: KeyPackageRecord) -> Result<(), StoreError> {
        self.inner.write().await.insert(reference, record);
        Ok(())
    }

    async fn get(&self, reference: &[u8; 32]) -> Result<Option<KeyPackageRecord>, StoreError> {
        Ok(self.inner.read().await.get(reference).cloned())
    }

    async fn remove(&self, reference: &[u8; 32]) -> Result<(), StoreError> {
        self.inner.write().await.remove(reference);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<KeyPackageSummary>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .iter()
            .map(|(reference, record)| KeyPackageSummary {
                reference: *reference,
                public_tls_bytes: record.public_tls_bytes.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> KeyPackageRecord {
        KeyPackageRecord {
            public_tls_bytes: vec![1, 2, 3],
            private_bytes: vec![4, 5, 6],
            last_resort: false,
        }
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = InMemoryKeyPackageStore::new();
        store.put([1u8; 32], sample()).await.expect("put");
        let loaded = store.get(&[1u8; 32]).await.expect("get");
        assert_eq!(loaded, Some(sample()));
    }

    #[tokio::test]
    async fn remove_consumes_key_package() {
        let store = InMemoryKeyPackageStore::new();
        store.put([1u8; 32], sample()).await.expect("put");
        store.remove(&[1u8; 32]).await.expect("remove");
        assert_eq!(store.get(&[1u8; 32]).await.expect("get"), None);
    }

    #[tokio::test]
    async fn list_exposes_only_public_halves() {
        let store = InMemoryKeyPackageStore::new();
        store.put([1u8; 32], sample()).await.expect("put");
        let summaries = store.list().await.expect("list");
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].public_tls_bytes, vec![1, 2, 3]);
    }
}
