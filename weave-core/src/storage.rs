//! Synchronous key/value persistence contract.
//!
//! Credential issuance reads and writes small blobs (serialized keypairs,
//! DER certificates) during initialization; the message hot path never
//! touches storage. Keys are plain strings for on-disk compatibility with
//! existing deployments.

use crate::error::Result;
use std::collections::HashMap;

/// Synchronous key/value store.
pub trait Storage {
    /// Fetch the blob stored under `key`, or `None` when absent.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous blob.
    fn set(&mut self, key: &str, value: &[u8]) -> Result<()>;

    /// Remove the blob under `key`. Removing an absent key is not an error.
    fn delete(&mut self, key: &str) -> Result<()>;
}

/// In-memory store for tests and ephemeral deployments.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: HashMap<String, Vec<u8>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &[u8]) -> Result<()> {
        self.entries.insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_and_overwrite() {
        let mut store = MemoryStorage::new();
        assert!(store.get("k").unwrap().is_none());
        store.set("k", b"v1").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some(&b"v1"[..]));
        store.set("k", b"v2").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some(&b"v2"[..]));
        store.delete("k").unwrap();
        assert!(store.get("k").unwrap().is_none());
        // deleting again stays quiet
        store.delete("k").unwrap();
    }
}
