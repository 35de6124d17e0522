//! Configuration for the points ledger

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Which state store backs the ledger
    pub store_backend: StoreBackend,

    /// How transaction history is laid out in the store
    pub history_layout: HistoryLayout,

    /// What to do with an unparseable amount, money or activities field
    pub invalid_amount: InvalidAmountPolicy,

    /// Seed accounts and contracts when the store is empty
    pub bootstrap_on_open: bool,

    /// Actor mailbox capacity
    pub mailbox_size: usize,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Store retry configuration
    pub retry: RetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/points"),
            service_name: "points-ledger".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            store_backend: StoreBackend::RocksDb,
            history_layout: HistoryLayout::Indexed,
            invalid_amount: InvalidAmountPolicy::Reject,
            bootstrap_on_open: true,
            mailbox_size: 1000,
            rocksdb: RocksDBConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

/// State store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local map, nothing survives a restart
    Memory,
    /// RocksDB under `data_dir`
    RocksDb,
}

impl StoreBackend {
    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Some(StoreBackend::Memory),
            "rocksdb" => Some(StoreBackend::RocksDb),
            _ => None,
        }
    }
}

/// Transaction history layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryLayout {
    /// Whole history as one collection under `allTx`
    Legacy,
    /// One key per transaction plus a per-participant index
    Indexed,
}

impl HistoryLayout {
    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "legacy" => Some(HistoryLayout::Legacy),
            "indexed" => Some(HistoryLayout::Indexed),
            _ => None,
        }
    }
}

/// Handling of malformed numeric transfer fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidAmountPolicy {
    /// Fail the transfer before any state is touched
    Reject,
    /// Coerce the field to zero and record the transfer with status 0
    Record,
}

impl InvalidAmountPolicy {
    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "reject" => Some(InvalidAmountPolicy::Reject),
            "record" => Some(InvalidAmountPolicy::Record),
            _ => None,
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// fsync every committed write batch
    pub sync_writes: bool,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            max_background_jobs: 2,
            sync_writes: true,
            enable_statistics: false,
        }
    }
}

/// Retry policy for store I/O
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 disables retrying)
    pub max_retries: u32,

    /// Delay before the first retry (milliseconds)
    pub initial_delay_ms: u64,

    /// Upper bound for any single delay (milliseconds)
    pub max_delay_ms: u64,

    /// Delay growth per attempt
    pub backoff_multiplier: f64,

    /// Fraction of the delay randomised either way
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 10,
            max_delay_ms: 500,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse from a TOML document; missing keys keep their defaults
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        toml::from_str(content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Override fields from `POINTS_*` environment variables
    pub fn apply_env(&mut self) -> crate::Result<()> {
        if let Ok(data_dir) = std::env::var("POINTS_DATA_DIR") {
            self.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(backend) = std::env::var("POINTS_STORE_BACKEND") {
            self.store_backend = StoreBackend::parse(&backend).ok_or_else(|| {
                crate::Error::Config(format!("Unknown store backend: {}", backend))
            })?;
        }

        if let Ok(layout) = std::env::var("POINTS_HISTORY_LAYOUT") {
            self.history_layout = HistoryLayout::parse(&layout).ok_or_else(|| {
                crate::Error::Config(format!("Unknown history layout: {}", layout))
            })?;
        }

        if let Ok(policy) = std::env::var("POINTS_INVALID_AMOUNT") {
            self.invalid_amount = InvalidAmountPolicy::parse(&policy).ok_or_else(|| {
                crate::Error::Config(format!("Unknown invalid amount policy: {}", policy))
            })?;
        }

        Ok(())
    }

    /// In-memory configuration, used by tests and embedded hosts
    pub fn in_memory() -> Self {
        Self {
            store_backend: StoreBackend::Memory,
            ..Self::default()
        }
    }
}
