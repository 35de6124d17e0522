//! Transfer state transition
//!
//! One transfer runs in a fixed order:
//!
//! 1. parse the numeric fields
//! 2. lock both participants (and the legacy history key)
//! 3. allocate a reference number
//! 4. evaluate the contract
//! 5. credit the receiver, debit the sender
//! 6. append the transaction entry
//! 7. commit
//!
//! Steps 4-6 are staged in a [`WriteSet`] and committed with one
//! `write_batch`, so a failure anywhere in them leaves balances and history
//! untouched. The reference number drawn in step 3 stays consumed.

use crate::{
    account::AccountLedger,
    clock::Clock,
    config::{Config, InvalidAmountPolicy},
    contract::{fetch_contract, ContractEvaluator, EvaluationInput},
    history::TransactionLog,
    locks::LockTable,
    metrics::Metrics,
    reference::ReferenceAllocator,
    staging::WriteSet,
    storage::StateStore,
    types::{
        Transaction, TransferRequest, STATUS_COMPLETED, STATUS_COMPLETED_MSG, STATUS_INVALID,
        STATUS_INVALID_MSG,
    },
    Error, Result,
};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

/// Parse a point or money amount in plain or scientific notation
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}

/// Parse an activity count; empty means zero
pub fn parse_activities(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Some(0);
    }
    raw.parse().ok()
}

/// Numeric fields of a request after parsing
#[derive(Debug, Clone, PartialEq)]
struct ParsedFields {
    amount: Decimal,
    money: Decimal,
    activities: u32,
    invalid: Vec<&'static str>,
}

impl ParsedFields {
    /// Malformed fields are coerced to zero and listed in `invalid`
    fn from_request(request: &TransferRequest) -> Self {
        let mut invalid = Vec::new();

        let amount = parse_amount(&request.amount).unwrap_or_else(|| {
            invalid.push("amount");
            Decimal::ZERO
        });
        let money = parse_amount(&request.money).unwrap_or_else(|| {
            invalid.push("money");
            Decimal::ZERO
        });
        let activities = parse_activities(&request.activities).unwrap_or_else(|| {
            invalid.push("activities");
            0
        });

        Self {
            amount,
            money,
            activities,
            invalid,
        }
    }

    fn is_valid(&self) -> bool {
        self.invalid.is_empty()
    }
}

/// Runs transfers against a state store
pub struct TransferEngine {
    store: Arc<dyn StateStore>,
    locks: Arc<LockTable>,
    references: ReferenceAllocator,
    evaluator: Arc<ContractEvaluator>,
    accounts: AccountLedger,
    history: TransactionLog,
    invalid_amount: InvalidAmountPolicy,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
}

impl TransferEngine {
    /// Create an engine sharing the ledger's store, locks and contract table
    pub fn new(
        store: Arc<dyn StateStore>,
        locks: Arc<LockTable>,
        evaluator: Arc<ContractEvaluator>,
        config: &Config,
        clock: Arc<dyn Clock>,
        metrics: Metrics,
    ) -> Self {
        Self {
            references: ReferenceAllocator::new(store.clone(), locks.clone()),
            store,
            locks,
            evaluator,
            accounts: AccountLedger,
            history: TransactionLog::new(config.history_layout),
            invalid_amount: config.invalid_amount,
            clock,
            metrics,
        }
    }

    /// History in the layout this engine writes
    pub fn history(&self) -> TransactionLog {
        self.history
    }

    /// Reference allocator
    pub fn references(&self) -> &ReferenceAllocator {
        &self.references
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Execute one transfer and return its committed transaction entry
    pub fn submit(&self, request: &TransferRequest) -> Result<Transaction> {
        let started = Instant::now();

        let fields = ParsedFields::from_request(request);
        if !fields.is_valid() && self.invalid_amount == InvalidAmountPolicy::Reject {
            self.metrics.record_rejection();
            tracing::warn!(
                from = %request.from,
                to = %request.to,
                fields = ?fields.invalid,
                "Transfer rejected: malformed numeric field"
            );
            return Err(Error::InvalidArgument(format!(
                "malformed {} in transfer request",
                fields.invalid.join(", ")
            )));
        }

        let mut lock_keys = vec![request.to.to_string(), request.from.to_string()];
        lock_keys.extend(self.history.lock_keys().into_iter().map(String::from));
        let _locks = self.locks.acquire(lock_keys);

        let reference = self.references.next()?;
        self.metrics.record_reference(reference.value());

        let (status_code, status_msg) = if fields.is_valid() {
            (STATUS_COMPLETED, STATUS_COMPLETED_MSG)
        } else {
            (STATUS_INVALID, STATUS_INVALID_MSG)
        };

        let mut tx = Transaction {
            reference,
            date: self.clock.now(),
            description: request.description.clone(),
            tx_type: request.tx_type.clone(),
            amount: fields.amount,
            money: fields.money,
            activities: fields.activities,
            to: request.to.clone(),
            from: request.from.clone(),
            to_name: String::new(),
            from_name: String::new(),
            contract_id: request.contract_id.clone(),
            status_code,
            status_msg: status_msg.to_string(),
        };

        match self.stage_and_commit(&mut tx) {
            Ok(keys) => {
                self.metrics.record_transfer(started.elapsed().as_secs_f64());
                if tx.status_code == STATUS_INVALID {
                    self.metrics.record_invalid_recorded();
                    tracing::warn!(
                        reference = %tx.reference,
                        fields = ?fields.invalid,
                        "Transfer recorded with invalid amount"
                    );
                }
                tracing::info!(
                    reference = %tx.reference,
                    from = %tx.from,
                    to = %tx.to,
                    amount = %tx.amount,
                    contract_id = %tx.contract_id,
                    keys,
                    "Transfer committed"
                );
                Ok(tx)
            }
            Err(e) => {
                self.metrics.record_failure();
                tracing::warn!(
                    reference = %tx.reference,
                    from = %tx.from,
                    to = %tx.to,
                    error = %e,
                    "Transfer aborted, reference number consumed"
                );
                Err(e)
            }
        }
    }

    fn stage_and_commit(&self, tx: &mut Transaction) -> Result<usize> {
        let mut ws = WriteSet::new(self.store.as_ref());

        if let Some(rule) = self.evaluator.rule_for(&tx.contract_id) {
            let contract = fetch_contract(&ws, &tx.contract_id)?;
            let input = EvaluationInput {
                base_amount: tx.amount,
                date: tx.date,
                activities: tx.activities,
            };
            let evaluated = rule.evaluate(&input, &contract)?;
            tracing::debug!(
                reference = %tx.reference,
                contract_id = %tx.contract_id,
                method = rule.method(),
                base = %tx.amount,
                evaluated = %evaluated,
                "Contract evaluated"
            );
            tx.amount = evaluated;
        }

        // Sender is debited the evaluated amount as well
        let receiver = self.accounts.apply_delta(&mut ws, &tx.to, tx.amount, tx.date)?;
        tx.to_name = receiver.name;

        let sender = self.accounts.apply_delta(&mut ws, &tx.from, -tx.amount, tx.date)?;
        tx.from_name = sender.name;

        self.history.append(&mut ws, tx)?;

        ws.commit()
    }
}

impl std::fmt::Debug for TransferEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferEngine")
            .field("history", &self.history.layout())
            .field("invalid_amount", &self.invalid_amount)
            .finish()
    }
}
