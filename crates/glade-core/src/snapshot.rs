//! Group-state snapshotting (C7).
//!
//! The group-state store persists opaque bytes; this module owns turning
//! the MLS provider's in-memory storage into those bytes and back. CBOR
//! (via `ciborium`) rather than JSON, since the ratchet tree and secret
//! tree are binary and JSON would pay a needless base64 tax on every leaf.

use openmls_memory_storage::MemoryStorage;

use crate::error::RuntimeError;

/// Serialize a provider's in-memory MLS storage to an opaque byte snapshot.
pub fn serialize_snapshot(storage: &MemoryStorage) -> Result<Vec<u8>, RuntimeError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(storage, &mut bytes)
        .map_err(|e| RuntimeError::StoreFailure(e.to_string()))?;
    Ok(bytes)
}

/// Deserialize a byte snapshot produced by [`serialize_snapshot`].
pub fn deserialize_snapshot(bytes: &[u8]) -> Result<MemoryStorage, RuntimeError> {
    ciborium::from_reader(bytes).map_err(|e| RuntimeError::StoreFailure(e.to_string()))
}
