//! Transfer reference numbers
//!
//! A single integer counter under `refNumber`. Each allocation returns the
//! stored value and writes back its successor before the caller continues,
//! so a number is consumed even when the transfer that drew it fails later.
//! Numbers are never handed out twice.

use crate::{
    locks::LockTable,
    storage::{read_json, StateStore},
    types::ReferenceNumber,
    Error, Result,
};
use std::sync::Arc;

/// Store key of the counter
pub const REF_NUMBER_KEY: &str = "refNumber";

/// Counter value written by bootstrap
pub const INITIAL_REFERENCE: u64 = 2_985_674_978;

/// Allocates monotonically increasing reference numbers
pub struct ReferenceAllocator {
    store: Arc<dyn StateStore>,
    locks: Arc<LockTable>,
}

impl ReferenceAllocator {
    /// Create an allocator sharing the ledger's lock table
    pub fn new(store: Arc<dyn StateStore>, locks: Arc<LockTable>) -> Self {
        Self { store, locks }
    }

    /// The number the next allocation will return
    pub fn peek(&self) -> Result<ReferenceNumber> {
        read_json::<u64>(self.store.as_ref(), REF_NUMBER_KEY)?
            .map(ReferenceNumber::new)
            .ok_or_else(|| Error::NotFound("reference counter (ledger not bootstrapped)".to_string()))
    }

    /// Take the current number and advance the counter
    pub fn next(&self) -> Result<ReferenceNumber> {
        let _guard = self.locks.acquire([REF_NUMBER_KEY]);

        let current = self.peek()?;
        let advanced = serde_json::to_vec(&current.next().value())?;
        self.store.put(REF_NUMBER_KEY, &advanced)?;

        tracing::debug!(reference = %current, "Reference number allocated");

        Ok(current)
    }
}

impl std::fmt::Debug for ReferenceAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceAllocator").field("key", &REF_NUMBER_KEY).finish()
    }
}
