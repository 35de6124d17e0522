//! Contract evaluation
//!
//! A contract turns the base amount of a transfer into the amount actually
//! moved. The set of rules is closed (`ContractRule`); which contract id uses
//! which rule is an open table that new contracts register into. A contract
//! id with no registered rule leaves the amount untouched.

use crate::{
    staging::WriteSet,
    storage::StateStore,
    types::{Contract, ContractId},
    Error, Result,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Ordered list of every registered contract id
pub const CONTRACT_IDS_KEY: &str = "contractIds";

/// Seeded double-points contract
pub const DOUBLE_CONTRACT: &str = "C289416";
/// Seeded feedback-points contract
pub const FEEDBACK_CONTRACT: &str = "C791594";

/// `Method` value selecting `ContractRule::FlatMultiplier`
pub const DOUBLE_METHOD: &str = "doubleContract";
/// `Method` value selecting `ContractRule::ActivityBonus`
pub const FEEDBACK_METHOD: &str = "feedbackContract";

const FLAT_MULTIPLIER: i64 = 2;
const FEEDBACK_BASE_POINTS: i64 = 1000;
const FEEDBACK_POINTS_PER_ACTIVITY: i64 = 100;

/// Transfer facts a rule evaluates
#[derive(Debug, Clone, Copy)]
pub struct EvaluationInput {
    /// Amount as submitted
    pub base_amount: Decimal,
    /// Transfer timestamp
    pub date: DateTime<Utc>,
    /// Feedback activities completed
    pub activities: u32,
}

/// Built-in contract rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractRule {
    /// Twice the base amount inside the window, the base amount outside
    FlatMultiplier,
    /// 1000 plus 100 per activity inside the window, zero outside.
    /// The base amount is ignored.
    ActivityBonus,
}

impl ContractRule {
    /// Rule named by a contract's `Method` field
    pub fn from_method(method: &str) -> Option<Self> {
        match method {
            DOUBLE_METHOD => Some(ContractRule::FlatMultiplier),
            FEEDBACK_METHOD => Some(ContractRule::ActivityBonus),
            _ => None,
        }
    }

    /// `Method` name of this rule
    pub fn method(&self) -> &'static str {
        match self {
            ContractRule::FlatMultiplier => DOUBLE_METHOD,
            ContractRule::ActivityBonus => FEEDBACK_METHOD,
        }
    }

    /// Points to move under `contract`.
    ///
    /// Fails with `InvalidArgument` when the result does not fit a `Decimal`.
    pub fn evaluate(&self, input: &EvaluationInput, contract: &Contract) -> Result<Decimal> {
        let active = contract.is_active_at(input.date);

        match self {
            ContractRule::FlatMultiplier => {
                if !active {
                    return Ok(input.base_amount);
                }
                input
                    .base_amount
                    .checked_mul(Decimal::from(FLAT_MULTIPLIER))
                    .ok_or_else(|| overflow(contract, input))
            }
            ContractRule::ActivityBonus => {
                if !active {
                    return Ok(Decimal::ZERO);
                }
                let bonus = Decimal::from(input.activities) * Decimal::from(FEEDBACK_POINTS_PER_ACTIVITY);
                Ok(Decimal::from(FEEDBACK_BASE_POINTS) + bonus)
            }
        }
    }
}

fn overflow(contract: &Contract, input: &EvaluationInput) -> Error {
    Error::InvalidArgument(format!(
        "amount {} overflows under contract {}",
        input.base_amount, contract.id
    ))
}

/// Read a contract record through a write set
pub fn fetch_contract(ws: &WriteSet<'_>, id: &ContractId) -> Result<Contract> {
    decode_contract(id, ws.get(id.as_str())?)
}

/// Read a contract record straight from the store
pub fn load_contract(store: &dyn StateStore, id: &ContractId) -> Result<Contract> {
    decode_contract(id, store.get(id.as_str())?)
}

fn decode_contract(id: &ContractId, bytes: Option<Vec<u8>>) -> Result<Contract> {
    let bytes = bytes.ok_or_else(|| Error::NotFound(format!("contract {}", id)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| Error::NotFound(format!("contract {} is unreadable: {}", id, e)))
}

/// Contract id to rule table
#[derive(Debug, Default)]
pub struct ContractEvaluator {
    rules: RwLock<HashMap<ContractId, ContractRule>>,
}

impl ContractEvaluator {
    /// Empty table: every contract id passes amounts through
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with the two seeded contracts registered
    pub fn with_defaults() -> Self {
        let evaluator = Self::new();
        evaluator.register(ContractId::new(DOUBLE_CONTRACT), ContractRule::FlatMultiplier);
        evaluator.register(ContractId::new(FEEDBACK_CONTRACT), ContractRule::ActivityBonus);
        evaluator
    }

    /// Bind a contract id to a rule, replacing any earlier binding
    pub fn register(&self, id: ContractId, rule: ContractRule) {
        tracing::debug!(contract_id = %id, method = rule.method(), "Contract rule registered");
        self.rules.write().insert(id, rule);
    }

    /// Bind a contract by its `Method` field; false when the method is unknown
    pub fn register_contract(&self, contract: &Contract) -> bool {
        match ContractRule::from_method(&contract.method) {
            Some(rule) => {
                self.register(contract.id.clone(), rule);
                true
            }
            None => false,
        }
    }

    /// Drop a binding so `id` evaluates as identity
    pub fn unregister(&self, id: &ContractId) -> Option<ContractRule> {
        self.rules.write().remove(id)
    }

    /// Rule bound to `id`, if any
    pub fn rule_for(&self, id: &ContractId) -> Option<ContractRule> {
        self.rules.read().get(id).copied()
    }

    /// Evaluate `input` under `contract`; identity when no rule is bound
    pub fn evaluate(&self, contract: &Contract, input: &EvaluationInput) -> Result<Decimal> {
        match self.rule_for(&contract.id) {
            Some(rule) => rule.evaluate(input, contract),
            None => Ok(input.base_amount),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AccountId;
    use chrono::TimeZone;

    fn window_contract(id: &str, method: &str) -> Contract {
        Contract {
            id: ContractId::new(id),
            business_id: AccountId::new("B1928564"),
            business_name: "Open Financial Network".to_string(),
            title: String::new(),
            description: String::new(),
            conditions: vec![],
            icon: String::new(),
            start_date: Utc.with_ymd_and_hms(2016, 5, 11, 12, 0, 0).unwrap(),
            end_date: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            method: method.to_string(),
        }
    }

    fn input(amount: i64, date: DateTime<Utc>, activities: u32) -> EvaluationInput {
        EvaluationInput {
            base_amount: Decimal::from(amount),
            date,
            activities,
        }
    }

    fn inside() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 6, 1, 0, 0, 0).unwrap()
    }

    fn before() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2015, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_flat_multiplier_doubles_inside_window() {
        let c = window_contract(DOUBLE_CONTRACT, DOUBLE_METHOD);
        let rule = ContractRule::FlatMultiplier;
        assert_eq!(rule.evaluate(&input(100, inside(), 0), &c).unwrap(), Decimal::from(200));
        assert_eq!(rule.evaluate(&input(100, c.start_date, 0), &c).unwrap(), Decimal::from(200));
    }

    #[test]
    fn test_flat_multiplier_passes_through_outside_window() {
        let c = window_contract(DOUBLE_CONTRACT, DOUBLE_METHOD);
        let rule = ContractRule::FlatMultiplier;
        assert_eq!(rule.evaluate(&input(100, before(), 0), &c).unwrap(), Decimal::from(100));
        assert_eq!(rule.evaluate(&input(100, c.end_date, 0), &c).unwrap(), Decimal::from(100));
    }

    #[test]
    fn test_activity_bonus_ignores_base_amount() {
        let c = window_contract(FEEDBACK_CONTRACT, FEEDBACK_METHOD);
        let rule = ContractRule::ActivityBonus;
        assert_eq!(rule.evaluate(&input(5, inside(), 0), &c).unwrap(), Decimal::from(1000));
        assert_eq!(rule.evaluate(&input(999_999, inside(), 3), &c).unwrap(), Decimal::from(1300));
    }

    #[test]
    fn test_activity_bonus_outside_window_is_zero() {
        // Replicated behaviour: an expired feedback contract turns the
        // transfer into a zero-point transfer, whatever the activities.
        let c = window_contract(FEEDBACK_CONTRACT, FEEDBACK_METHOD);
        let rule = ContractRule::ActivityBonus;
        assert_eq!(rule.evaluate(&input(500, before(), 7), &c).unwrap(), Decimal::ZERO);
        assert_eq!(rule.evaluate(&input(500, c.end_date, 7), &c).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_flat_multiplier_overflow_is_an_error() {
        let c = window_contract(DOUBLE_CONTRACT, DOUBLE_METHOD);
        let huge = EvaluationInput {
            base_amount: Decimal::MAX,
            date: inside(),
            activities: 0,
        };
        let err = ContractRule::FlatMultiplier.evaluate(&huge, &c).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        // Outside the window the amount passes through unchanged
        let outside = EvaluationInput { date: before(), ..huge };
        assert_eq!(ContractRule::FlatMultiplier.evaluate(&outside, &c).unwrap(), Decimal::MAX);
    }

    #[test]
    fn test_method_names() {
        assert_eq!(ContractRule::from_method("doubleContract"), Some(ContractRule::FlatMultiplier));
        assert_eq!(ContractRule::from_method("feedbackContract"), Some(ContractRule::ActivityBonus));
        assert_eq!(ContractRule::from_method("tripleContract"), None);
        assert_eq!(ContractRule::ActivityBonus.method(), FEEDBACK_METHOD);
    }

    #[test]
    fn test_unregistered_contract_is_identity() {
        let evaluator = ContractEvaluator::with_defaults();
        let c = window_contract("C000000", DOUBLE_METHOD);
        assert!(evaluator.rule_for(&c.id).is_none());
        assert_eq!(evaluator.evaluate(&c, &input(50, inside(), 0)).unwrap(), Decimal::from(50));
    }

    #[test]
    fn test_register_contract_by_method() {
        let evaluator = ContractEvaluator::new();
        let c = window_contract("C123456", FEEDBACK_METHOD);
        assert!(evaluator.register_contract(&c));
        assert_eq!(evaluator.rule_for(&c.id), Some(ContractRule::ActivityBonus));
        assert_eq!(evaluator.evaluate(&c, &input(1, inside(), 2)).unwrap(), Decimal::from(1200));

        let unknown = window_contract("C999999", "mysteryContract");
        assert!(!evaluator.register_contract(&unknown));
        assert!(evaluator.rule_for(&unknown.id).is_none());
    }

    #[test]
    fn test_load_contract() {
        use crate::storage::MemoryStore;

        let store = MemoryStore::new();
        let c = window_contract(DOUBLE_CONTRACT, DOUBLE_METHOD);
        store.put(DOUBLE_CONTRACT, &serde_json::to_vec(&c).unwrap()).unwrap();

        assert_eq!(load_contract(&store, &c.id).unwrap(), c);
        assert!(matches!(
            load_contract(&store, &ContractId::new(FEEDBACK_CONTRACT)),
            Err(Error::NotFound(_))
        ));

        let ws = WriteSet::new(&store);
        assert_eq!(fetch_contract(&ws, &c.id).unwrap().method, DOUBLE_METHOD);
    }
}
