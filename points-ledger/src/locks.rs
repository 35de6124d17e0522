//! Named mutual exclusion over store keys
//!
//! Every ledger mutation locks the keys it reads and writes. Keys are always
//! acquired in sorted order, so two operations can never wait on each other
//! in a cycle. Operations on disjoint keys do not contend.
//!
//! A key's mutex lives only while some operation holds or waits on it, so the
//! table stays as small as the set of keys currently in use.

use dashmap::DashMap;
use parking_lot::{lock_api::ArcMutexGuard, Mutex, RawMutex};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Table of per-key mutexes, created on first use and dropped when idle
#[derive(Debug, Default)]
pub struct LockTable {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl LockTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until every key is held; duplicates are locked once
    pub fn acquire<I, S>(&self, keys: I) -> LockSet<'_>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ordered: BTreeSet<String> = keys.into_iter().map(Into::into).collect();

        let mut guards = Vec::with_capacity(ordered.len());
        for key in &ordered {
            // Clone the Arc out so the shard lock is released before blocking
            let mutex = self
                .locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value()
                .clone();
            guards.push(mutex.lock_arc());
        }

        LockSet {
            table: &self.locks,
            keys: ordered.into_iter().collect(),
            guards,
        }
    }

    /// Number of keys held or waited on right now
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// True when no key is held or waited on
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Held locks; released on drop
pub struct LockSet<'a> {
    table: &'a DashMap<String, Arc<Mutex<()>>>,
    keys: Vec<String>,
    guards: Vec<ArcMutexGuard<RawMutex, ()>>,
}

impl LockSet<'_> {
    /// Locked keys in acquisition order
    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

impl Drop for LockSet<'_> {
    fn drop(&mut self) {
        self.guards.clear();
        // Entry clones happen under the shard lock, so a count of one means
        // nobody else holds or waits on this key
        for key in &self.keys {
            self.table.remove_if(key, |_, mutex| Arc::strong_count(mutex) == 1);
        }
    }
}

impl std::fmt::Debug for LockSet<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockSet").field("keys", &self.keys).finish()
    }
}
