//! MLS crypto provider wiring.
//!
//! Binds the environment's RNG into openmls's provider trait so MLS's own
//! randomness (key generation, nonce generation) is replayable in tests the
//! same way everything else the runtime draws entropy for is. Storage is
//! in-memory; the runtime owns durable persistence itself by snapshotting
//! this storage through [`crate::snapshot`] after every state-advancing
//! operation.

use openmls_memory_storage::MemoryStorage;
use openmls_rust_crypto::RustCrypto;
use openmls_traits::OpenMlsProvider;
use openmls_traits::random::OpenMlsRand;

use crate::env::Environment;

/// [`OpenMlsRand`] backed by an [`Environment`].
pub struct EnvironmentRng<E> {
    env: E,
}

impl<E: Environment> EnvironmentRng<E> {
    /// Wrap an environment as an MLS randomness source.
    pub fn new(env: E) -> Self {
        EnvironmentRng { env }
    }
}

impl<E: Environment> OpenMlsRand for EnvironmentRng<E> {
    type Error = std::convert::Infallible;

    fn random_array<const N: usize>(&self) -> Result<[u8; N], Self::Error> {
        let mut bytes = [0u8; N];
        self.env.random_bytes(&mut bytes);
        Ok(bytes)
    }

    fn random_vec(&self, len: usize) -> Result<Vec<u8>, Self::Error> {
        let mut bytes = vec![0u8; len];
        self.env.random_bytes(&mut bytes);
        Ok(bytes)
    }
}

/// The MLS provider used by the group runtime: RustCrypto for AEAD/KEM/
/// signature primitives, in-memory storage for the ratchet tree and secret
/// tree, and an environment-sourced RNG.
pub struct GroupsProvider<E> {
    crypto: RustCrypto,
    storage: MemoryStorage,
    rand: EnvironmentRng<E>,
}

impl<E: Environment> GroupsProvider<E> {
    /// Construct a fresh provider with empty in-memory storage.
    pub fn new(env: E) -> Self {
        GroupsProvider {
            crypto: RustCrypto::default(),
            storage: MemoryStorage::default(),
            rand: EnvironmentRng::new(env),
        }
    }

    /// Rehydrate a provider from a previously snapshotted storage.
    pub fn from_storage(env: E, storage: MemoryStorage) -> Self {
        GroupsProvider {
            crypto: RustCrypto::default(),
            storage,
            rand: EnvironmentRng::new(env),
        }
    }

    /// Borrow the underlying storage, for snapshotting (see `snapshot.rs`).
    pub fn storage_ref(&self) -> &MemoryStorage {
        &self.storage
    }
}

impl<E: Environment> OpenMlsProvider for GroupsProvider<E> {
    type CryptoProvider = RustCrypto;
    type RandProvider = EnvironmentRng<E>;
    type StorageProvider = MemoryStorage;

    fn crypto(&self) -> &Self::CryptoProvider {
        &self.crypto
    }

    fn rand(&self) -> &Self::RandProvider {
        &self.rand
    }

    fn storage(&self) -> &Self::StorageProvider {
        &self.storage
    }
}
