//! Error types for the points ledger

use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or undecodable account, contract or transaction record
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed request field (amount, money, activities)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Store read or write failure
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Record encoding error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Concurrency error (actor mailbox closed, worker task panicked, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether a store retry may clear this error.
    ///
    /// Only persistence failures qualify; business failures are terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Persistence(_))
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Persistence(err.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}
