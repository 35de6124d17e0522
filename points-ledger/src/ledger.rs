//! Main ledger orchestration layer
//!
//! This module ties together storage, locking, contracts and the transfer
//! engine into the operations a host invokes.
//!
//! # Example
//!
//! ```no_run
//! use points_ledger::{Config, PointsLedger, TransferRequest};
//!
//! fn main() -> points_ledger::Result<()> {
//!     let ledger = PointsLedger::open(Config::from_env()?)?;
//!
//!     let request = TransferRequest::new("U2974034", "B1928564", "100")
//!         .with_contract("C289416");
//!     let reference = ledger.submit_transfer(&request)?;
//!
//!     let natalie = ledger.query_user_account("U2974034")?;
//!     println!("{} -> {}", reference, natalie.balance);
//!     Ok(())
//! }
//! ```

use crate::{
    account::AccountLedger,
    bootstrap::Genesis,
    clock::{Clock, SystemClock},
    contract::{load_contract, ContractEvaluator, CONTRACT_IDS_KEY},
    locks::LockTable,
    metrics::Metrics,
    reference::REF_NUMBER_KEY,
    staging::WriteSet,
    storage::{open_store, read_json, StateStore},
    transfer::{parse_amount, TransferEngine},
    types::{Account, AccountId, Contract, ContractId, ReferenceNumber, Transaction, TransferRequest},
    Config, Error, Result,
};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Main ledger interface
pub struct PointsLedger {
    /// Backing store
    store: Arc<dyn StateStore>,

    /// Per-key locks shared with the engine
    locks: Arc<LockTable>,

    /// Contract id to rule table
    evaluator: Arc<ContractEvaluator>,

    /// Transfer state machine
    engine: TransferEngine,

    /// Time source
    clock: Arc<dyn Clock>,

    /// Configuration
    config: Config,
}

impl PointsLedger {
    /// Open the configured store, bootstrapping it if enabled
    pub fn open(config: Config) -> Result<Self> {
        let store = open_store(&config)?;
        Self::with_store(config, store)
    }

    /// Open a ledger over an existing store, using the wall clock
    pub fn with_store(config: Config, store: Arc<dyn StateStore>) -> Result<Self> {
        Self::with_clock(config, store, Arc::new(SystemClock))
    }

    /// Open a ledger over an existing store and time source
    pub fn with_clock(config: Config, store: Arc<dyn StateStore>, clock: Arc<dyn Clock>) -> Result<Self> {
        let locks = Arc::new(LockTable::new());
        let evaluator = Arc::new(ContractEvaluator::with_defaults());
        let metrics = Metrics::new().map_err(|e| Error::Other(format!("metrics: {}", e)))?;

        let engine = TransferEngine::new(
            store.clone(),
            locks.clone(),
            evaluator.clone(),
            &config,
            clock.clone(),
            metrics,
        );

        let ledger = Self {
            store,
            locks,
            evaluator,
            engine,
            clock,
            config,
        };

        if ledger.config.bootstrap_on_open {
            ledger.bootstrap()?;
        }
        ledger.load_registered_contracts()?;

        tracing::info!(
            service = %ledger.config.service_name,
            backend = ?ledger.config.store_backend,
            history = ?ledger.config.history_layout,
            invalid_amount = ?ledger.config.invalid_amount,
            "Points ledger opened"
        );

        Ok(ledger)
    }

    /// Seed a fresh store; returns false when it already holds a ledger
    pub fn bootstrap(&self) -> Result<bool> {
        self.bootstrap_with(&Genesis::default())
    }

    /// Seed a fresh store with custom contents
    pub fn bootstrap_with(&self, genesis: &Genesis) -> Result<bool> {
        let history = self.engine.history();
        let mut keys: Vec<String> = vec![REF_NUMBER_KEY.to_string()];
        keys.extend(history.lock_keys().into_iter().map(String::from));
        let _locks = self.locks.acquire(keys);

        let applied = genesis.apply(self.store.as_ref(), &history)?;
        if applied {
            for contract in &genesis.contracts {
                self.evaluator.register_contract(contract);
            }
        }
        Ok(applied)
    }

    // Stored contracts with a known method bind their rule on open
    fn load_registered_contracts(&self) -> Result<()> {
        for contract in self.query_all_contracts()? {
            self.evaluator.register_contract(&contract);
        }
        Ok(())
    }

    /// Run a transfer; returns the reference number it was recorded under
    pub fn submit_transfer(&self, request: &TransferRequest) -> Result<ReferenceNumber> {
        self.engine.submit(request).map(|tx| tx.reference)
    }

    /// Run a transfer; returns the full committed entry
    pub fn execute_transfer(&self, request: &TransferRequest) -> Result<Transaction> {
        self.engine.submit(request)
    }

    /// Account by id
    pub fn query_user_account(&self, user_id: &str) -> Result<Account> {
        AccountLedger.load(self.store.as_ref(), &AccountId::new(user_id))
    }

    /// Every transaction naming `user_id` as sender or receiver, oldest first
    pub fn query_transactions_for_user(&self, user_id: &str) -> Result<Vec<Transaction>> {
        self.engine
            .history()
            .for_participant(self.store.as_ref(), &AccountId::new(user_id))
    }

    /// Full history in reference order
    pub fn query_all_transactions(&self) -> Result<Vec<Transaction>> {
        self.engine.history().all(self.store.as_ref())
    }

    /// Transaction by reference number
    pub fn query_transaction(&self, reference: ReferenceNumber) -> Result<Transaction> {
        self.engine.history().get(self.store.as_ref(), reference)
    }

    /// Contract by id
    pub fn query_contract(&self, contract_id: &str) -> Result<Contract> {
        load_contract(self.store.as_ref(), &ContractId::new(contract_id))
    }

    /// Every registered contract, in registration order
    pub fn query_all_contracts(&self) -> Result<Vec<Contract>> {
        let ids: Vec<ContractId> = read_json(self.store.as_ref(), CONTRACT_IDS_KEY)?.unwrap_or_default();
        ids.iter()
            .map(|id| load_contract(self.store.as_ref(), id))
            .collect()
    }

    /// Store a contract, list its id, and bind its rule by `Method`
    ///
    /// Re-registering an id replaces the stored record without duplicating
    /// the id. A contract whose method is unknown is stored but evaluates as
    /// identity.
    pub fn register_contract(&self, contract: Contract) -> Result<()> {
        if contract.id.is_empty() {
            return Err(Error::InvalidArgument("contract id is empty".to_string()));
        }

        let _locks = self.locks.acquire([CONTRACT_IDS_KEY, contract.id.as_str()]);

        let mut ws = WriteSet::new(self.store.as_ref());
        let mut ids: Vec<ContractId> = ws.get_json(CONTRACT_IDS_KEY)?.unwrap_or_default();
        if !ids.contains(&contract.id) {
            ids.push(contract.id.clone());
        }
        ws.put_json(CONTRACT_IDS_KEY, &ids)?;
        ws.put_json(contract.id.as_str(), &contract)?;
        ws.commit()?;

        if !self.evaluator.register_contract(&contract) {
            self.evaluator.unregister(&contract.id);
            tracing::warn!(
                contract_id = %contract.id,
                method = %contract.method,
                "Contract method has no rule, amounts pass through"
            );
        }
        tracing::info!(contract_id = %contract.id, contracts = ids.len(), "Contract registered");

        Ok(())
    }

    /// Apply a signed delta to one account without recording a transaction
    pub fn adjust_balance(&self, user_id: &str, amount: &str) -> Result<Account> {
        let delta: Decimal = parse_amount(amount)
            .ok_or_else(|| Error::InvalidArgument(format!("malformed amount {:?}", amount)))?;
        let id = AccountId::new(user_id);

        let _locks = self.locks.acquire([id.as_str()]);

        let mut ws = WriteSet::new(self.store.as_ref());
        let account = AccountLedger.apply_delta(&mut ws, &id, delta, self.clock.now())?;
        ws.commit()?;

        tracing::info!(account = %id, delta = %delta, balance = %account.balance, "Balance adjusted");

        Ok(account)
    }

    /// Reference number the next transfer will draw
    pub fn next_reference(&self) -> Result<ReferenceNumber> {
        self.engine.references().peek()
    }

    /// Contract rule table
    pub fn evaluator(&self) -> &ContractEvaluator {
        &self.evaluator
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        self.engine.metrics()
    }

    /// Configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl std::fmt::Debug for PointsLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PointsLedger")
            .field("engine", &self.engine)
            .field("config", &self.config)
            .finish()
    }
}
