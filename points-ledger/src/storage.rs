//! State store abstraction and backends
//!
//! The ledger only needs single-key reads and writes plus one atomic
//! multi-key commit. Everything list-shaped lives under a single key.
//!
//! # Backends
//!
//! - `MemoryStore` - process-local map, used by tests and embedded hosts
//! - `RocksStore` - RocksDB default column family, `WriteBatch` commits
//! - `RetryingStore` - bounded backoff around another store's I/O

use crate::{
    config::{Config, RetryConfig, StoreBackend},
    error::Result,
};
use parking_lot::RwLock;
use rocksdb::{Options, WriteBatch, WriteOptions, DB};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Key-value persistence the ledger runs on
pub trait StateStore: Send + Sync {
    /// Read a key; `None` when absent
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write a single key
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Write every pair or none of them
    fn write_batch(&self, writes: Vec<(String, Vec<u8>)>) -> Result<()>;
}

/// Read and decode a JSON record; `None` when the key is absent
pub fn read_json<T: DeserializeOwned>(store: &dyn StateStore, key: &str) -> Result<Option<T>> {
    match store.get(key)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Open the backend selected by the configuration, wrapped in the retry policy
pub fn open_store(config: &Config) -> Result<Arc<dyn StateStore>> {
    let inner: Arc<dyn StateStore> = match config.store_backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::RocksDb => Arc::new(RocksStore::open(config)?),
    };

    if config.retry.max_retries == 0 {
        return Ok(inner);
    }

    Ok(Arc::new(RetryingStore::new(inner, config.retry.clone())))
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys held
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True when no key has been written
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl StateStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn write_batch(&self, writes: Vec<(String, Vec<u8>)>) -> Result<()> {
        let mut entries = self.entries.write();
        for (key, value) in writes {
            entries.insert(key, value);
        }
        Ok(())
    }
}

/// RocksDB-backed store
pub struct RocksStore {
    db: Arc<DB>,
    sync_writes: bool,
}

impl std::fmt::Debug for RocksStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksStore")
            .field("path", &self.db.path())
            .field("sync_writes", &self.sync_writes)
            .finish()
    }
}

impl RocksStore {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);
        // Point lookups only, no scans
        db_opts.optimize_for_point_lookup(64);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let db = DB::open(&db_opts, path)?;

        tracing::info!(path = ?path, "Opened RocksDB state store");

        Ok(Self {
            db: Arc::new(db),
            sync_writes: config.rocksdb.sync_writes,
        })
    }

    fn write_options(&self) -> WriteOptions {
        let mut opts = WriteOptions::default();
        opts.set_sync(self.sync_writes);
        opts
    }
}

impl StateStore for RocksStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key.as_bytes())?)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.db.put_opt(key.as_bytes(), value, &self.write_options())?;
        Ok(())
    }

    fn write_batch(&self, writes: Vec<(String, Vec<u8>)>) -> Result<()> {
        let mut batch = WriteBatch::default();
        for (key, value) in &writes {
            batch.put(key.as_bytes(), value);
        }

        self.db.write_opt(batch, &self.write_options())?;

        tracing::debug!(keys = writes.len(), "Write batch committed");

        Ok(())
    }
}

/// Store wrapper retrying persistence failures with exponential backoff
pub struct RetryingStore {
    inner: Arc<dyn StateStore>,
    config: RetryConfig,
}

impl std::fmt::Debug for RetryingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingStore").field("config", &self.config).finish()
    }
}

impl RetryingStore {
    /// Wrap a store
    pub fn new(inner: Arc<dyn StateStore>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    /// Delay before retry number `attempt` (0-based), with jitter
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay =
            self.config.initial_delay_ms as f64 * self.config.backoff_multiplier.powi(attempt as i32);

        let capped_delay = base_delay.min(self.config.max_delay_ms as f64);

        let jitter_range = capped_delay * self.config.jitter_factor;
        let jitter = (rand::random::<f64>() - 0.5) * jitter_range * 2.0;
        let final_delay = (capped_delay + jitter).max(0.0);

        Duration::from_millis(final_delay as u64)
    }

    fn execute_with_retry<T>(&self, operation_name: &str, operation: impl Fn() -> Result<T>) -> Result<T> {
        let mut attempt = 0;
        loop {
            match operation() {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::info!(
                            operation = operation_name,
                            attempt,
                            "Store operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = self.calculate_delay(attempt);
                    attempt += 1;
                    tracing::warn!(
                        operation = operation_name,
                        attempt,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Store operation failed, retrying"
                    );
                    std::thread::sleep(delay);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl StateStore for RetryingStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.execute_with_retry("get", || self.inner.get(key))
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.execute_with_retry("put", || self.inner.put(key, value))
    }

    fn write_batch(&self, writes: Vec<(String, Vec<u8>)>) -> Result<()> {
        self.execute_with_retry("write_batch", || self.inner.write_batch(writes.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    fn test_config() -> (Config, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        config.rocksdb.sync_writes = false;
        (config, temp_dir)
    }

    /// Fails the first `failures` calls with a persistence error
    struct FlakyStore {
        inner: MemoryStore,
        failures: u32,
        calls: AtomicU32,
    }

    impl FlakyStore {
        fn check(&self) -> Result<()> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(Error::Persistence("transient".to_string()));
            }
            Ok(())
        }
    }

    impl StateStore for FlakyStore {
        fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            self.check()?;
            self.inner.get(key)
        }

        fn put(&self, key: &str, value: &[u8]) -> Result<()> {
            self.check()?;
            self.inner.put(key, value)
        }

        fn write_batch(&self, writes: Vec<(String, Vec<u8>)>) -> Result<()> {
            self.check()?;
            self.inner.write_batch(writes)
        }
    }

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_delay_ms: 1,
            max_delay_ms: 2,
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }

    #[test]
    fn test_memory_store_get_put() {
        let store = MemoryStore::new();
        assert!(store.get("missing").unwrap().is_none());

        store.put("k", b"v").unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_memory_store_batch() {
        let store = MemoryStore::new();
        store
            .write_batch(vec![("a".into(), b"1".to_vec()), ("b".into(), b"2".to_vec())])
            .unwrap();
        assert_eq!(store.get("a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get("b").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn test_rocks_store_roundtrip_and_reopen() {
        let (config, _temp) = test_config();
        {
            let store = RocksStore::open(&config).unwrap();
            store.put("refNumber", b"2985674978").unwrap();
            store
                .write_batch(vec![("U1".into(), b"{}".to_vec()), ("U2".into(), b"[]".to_vec())])
                .unwrap();
        }

        let store = RocksStore::open(&config).unwrap();
        assert_eq!(store.get("refNumber").unwrap(), Some(b"2985674978".to_vec()));
        assert_eq!(store.get("U2").unwrap(), Some(b"[]".to_vec()));
        assert!(store.get("U3").unwrap().is_none());
    }

    #[test]
    fn test_read_json() {
        let store = MemoryStore::new();
        store.put("ids", br#"["C1","C2"]"#).unwrap();

        let ids: Option<Vec<String>> = read_json(&store, "ids").unwrap();
        assert_eq!(ids, Some(vec!["C1".to_string(), "C2".to_string()]));

        let none: Option<Vec<String>> = read_json(&store, "nothing").unwrap();
        assert!(none.is_none());

        store.put("bad", b"not json").unwrap();
        assert!(matches!(
            read_json::<Vec<String>>(&store, "bad"),
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn test_retry_recovers_from_transient_failures() {
        let flaky = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            failures: 2,
            calls: AtomicU32::new(0),
        });
        let store = RetryingStore::new(flaky.clone(), fast_retry(3));

        store.put("k", b"v").unwrap();
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.get("k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_retry_gives_up() {
        let flaky = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            failures: 10,
            calls: AtomicU32::new(0),
        });
        let store = RetryingStore::new(flaky.clone(), fast_retry(2));

        let err = store.write_batch(vec![("k".into(), b"v".to_vec())]).unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_open_store_memory_backend() {
        let store = open_store(&Config::in_memory()).unwrap();
        store.put("x", b"1").unwrap();
        assert_eq!(store.get("x").unwrap(), Some(b"1".to_vec()));
    }
}
