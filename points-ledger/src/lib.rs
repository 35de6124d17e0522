//! Open Points Ledger
//!
//! Loyalty-points ledger over a key-value state store. Members hold point
//! balances; contracts are date-bounded rules that change how many points a
//! transfer moves; every transfer leaves one immutable transaction entry.
//!
//! # Architecture
//!
//! - **Staged writes**: balance and history changes of one transfer commit as a single batch
//! - **Key locks**: transfers lock their participants in sorted order, disjoint transfers run in parallel
//! - **Burned references**: a reference number is consumed by every attempt that passes validation
//! - **Closed rules, open registry**: contract ids bind to a fixed set of evaluation rules
//!
//! # Invariants
//!
//! - Point conservation: receiver credit == sender debit for every transfer
//! - Reference numbers strictly increase and are never reused
//! - Append-only history: entries are never modified or deleted

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod account;
pub mod actor;
pub mod bootstrap;
pub mod clock;
pub mod config;
pub mod contract;
pub mod error;
pub mod history;
pub mod ledger;
pub mod locks;
pub mod metrics;
pub mod reference;
pub mod staging;
pub mod storage;
pub mod transfer;
pub mod types;

// Re-exports
pub use actor::{spawn_ledger_actor, LedgerCommand, LedgerHandle};
pub use config::{Config, HistoryLayout, InvalidAmountPolicy, StoreBackend};
pub use error::{Error, Result};
pub use ledger::PointsLedger;
pub use types::{
    Account, AccountId, Contract, ContractId, ReferenceNumber, Transaction, TransferRequest,
};
