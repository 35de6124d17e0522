//! Staged multi-key writes
//!
//! A `WriteSet` buffers every write of one ledger operation. Reads through the
//! set see its own staged values first, so later steps observe earlier ones.
//! `commit` hands all staged keys to the store in a single `write_batch`;
//! dropping the set without committing discards everything.

use crate::{storage::StateStore, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;

/// Buffered writes against a state store
pub struct WriteSet<'a> {
    store: &'a dyn StateStore,
    staged: BTreeMap<String, Vec<u8>>,
}

impl<'a> WriteSet<'a> {
    /// Start an empty write set
    pub fn new(store: &'a dyn StateStore) -> Self {
        Self {
            store,
            staged: BTreeMap::new(),
        }
    }

    /// Read a key, preferring the staged value
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.staged.get(key) {
            Some(bytes) => Ok(Some(bytes.clone())),
            None => self.store.get(key),
        }
    }

    /// Read and decode a JSON record
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Stage raw bytes
    pub fn put(&mut self, key: impl Into<String>, value: Vec<u8>) {
        self.staged.insert(key.into(), value);
    }

    /// Encode and stage a JSON record
    pub fn put_json<T: Serialize>(&mut self, key: impl Into<String>, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.put(key, bytes);
        Ok(())
    }

    /// Number of staged keys
    pub fn len(&self) -> usize {
        self.staged.len()
    }

    /// True when nothing is staged
    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Staged keys, sorted
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.staged.keys().map(String::as_str)
    }

    /// Write every staged key atomically; returns the number of keys written
    pub fn commit(self) -> Result<usize> {
        let count = self.staged.len();
        if count == 0 {
            return Ok(0);
        }

        self.store.write_batch(self.staged.into_iter().collect())?;
        Ok(count)
    }
}

impl std::fmt::Debug for WriteSet<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteSet")
            .field("staged", &self.staged.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_reads_see_staged_values() {
        let store = MemoryStore::new();
        store.put("a", b"1").unwrap();

        let mut ws = WriteSet::new(&store);
        assert_eq!(ws.get("a").unwrap(), Some(b"1".to_vec()));

        ws.put("a", b"2".to_vec());
        assert_eq!(ws.get("a").unwrap(), Some(b"2".to_vec()));
        // Not visible in the store until commit
        assert_eq!(store.get("a").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn test_commit_writes_everything() {
        let store = MemoryStore::new();
        let mut ws = WriteSet::new(&store);
        ws.put_json("n", &7u64).unwrap();
        ws.put_json("list", &vec!["x"]).unwrap();

        assert_eq!(ws.keys().collect::<Vec<_>>(), vec!["list", "n"]);
        assert_eq!(ws.commit().unwrap(), 2);

        let n: u64 = serde_json::from_slice(&store.get("n").unwrap().unwrap()).unwrap();
        assert_eq!(n, 7);
    }

    #[test]
    fn test_drop_discards() {
        let store = MemoryStore::new();
        {
            let mut ws = WriteSet::new(&store);
            ws.put("a", b"1".to_vec());
            assert_eq!(ws.len(), 1);
        }
        assert!(store.is_empty());
    }

    #[test]
    fn test_empty_commit_is_noop() {
        let store = MemoryStore::new();
        let ws = WriteSet::new(&store);
        assert!(ws.is_empty());
        assert_eq!(ws.commit().unwrap(), 0);
    }
}
