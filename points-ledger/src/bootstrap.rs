//! Seed state for a fresh ledger
//!
//! `Genesis` describes the accounts, contracts and counter a new ledger starts
//! with. Applying it is idempotent: once `refNumber` exists nothing is written.

use crate::{
    account::AccountLedger,
    contract::{CONTRACT_IDS_KEY, DOUBLE_CONTRACT, DOUBLE_METHOD, FEEDBACK_CONTRACT, FEEDBACK_METHOD},
    history::TransactionLog,
    reference::{INITIAL_REFERENCE, REF_NUMBER_KEY},
    staging::WriteSet,
    storage::StateStore,
    types::{Account, AccountId, Contract, ContractId, ReferenceNumber},
    Result,
};
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;

/// Initial ledger contents
#[derive(Debug, Clone)]
pub struct Genesis {
    /// Seed accounts
    pub accounts: Vec<Account>,
    /// Seed contracts, in `contractIds` order
    pub contracts: Vec<Contract>,
    /// First reference number handed out
    pub first_reference: ReferenceNumber,
}

impl Default for Genesis {
    fn default() -> Self {
        Self {
            accounts: vec![
                seed_account("B1928564", "Open Financial Network", 1_000_000, "Originator", ["2099-12-31", "2015-01-01", "2016-05-06"]),
                seed_account("T5940872", "Open Travel Network", 500_000, "Member", ["2099-12-31", "2015-01-01", "2016-05-06"]),
                seed_account("U2974034", "Natalie", 1000, "Platinum", ["2017-06-01", "2015-05-31", "2016-05-06"]),
                seed_account("U3151672", "Anthony", 500, "Silver", ["2017-03-15", "2015-08-15", "2016-04-17"]),
            ],
            contracts: vec![double_points(), feedback_points()],
            first_reference: ReferenceNumber::new(INITIAL_REFERENCE),
        }
    }
}

impl Genesis {
    /// Whether the store already holds a ledger
    pub fn is_applied(store: &dyn StateStore) -> Result<bool> {
        Ok(store.get(REF_NUMBER_KEY)?.is_some())
    }

    /// Write the seed state in one batch; returns false when already applied
    pub fn apply(&self, store: &dyn StateStore, history: &TransactionLog) -> Result<bool> {
        if Self::is_applied(store)? {
            tracing::debug!("Ledger already bootstrapped");
            return Ok(false);
        }

        let mut ws = WriteSet::new(store);
        for account in &self.accounts {
            AccountLedger.stage(&mut ws, account)?;
        }
        for contract in &self.contracts {
            ws.put_json(contract.id.as_str(), contract)?;
        }
        let ids: Vec<&ContractId> = self.contracts.iter().map(|c| &c.id).collect();
        ws.put_json(CONTRACT_IDS_KEY, &ids)?;
        history.stage_empty(&mut ws, self.first_reference)?;
        ws.put_json(REF_NUMBER_KEY, &self.first_reference.value())?;

        let keys = ws.commit()?;

        tracing::info!(
            accounts = self.accounts.len(),
            contracts = self.contracts.len(),
            reference = %self.first_reference,
            keys,
            "Ledger bootstrapped"
        );

        Ok(true)
    }
}

/// `dates` is `[expiration, join, modified]`
fn seed_account(id: &str, name: &str, balance: i64, status: &str, dates: [&str; 3]) -> Account {
    let [expiration, join, modified] = dates;
    Account {
        user_id: AccountId::new(id),
        name: name.to_string(),
        balance: Decimal::from(balance),
        status: status.to_string(),
        expiration: expiration.to_string(),
        join: join.to_string(),
        modified: modified.to_string(),
    }
}

fn seed_window() -> (DateTime<Utc>, DateTime<Utc>) {
    (
        Utc.with_ymd_and_hms(2016, 5, 11, 12, 0, 0).single().unwrap_or_default(),
        Utc.with_ymd_and_hms(2099, 12, 31, 11, 59, 0).single().unwrap_or_default(),
    )
}

fn double_points() -> Contract {
    let (start_date, end_date) = seed_window();
    Contract {
        id: ContractId::new(DOUBLE_CONTRACT),
        business_id: AccountId::new("B1928564"),
        business_name: "Open Financial Network".to_string(),
        title: "Double Points using OpenFN Credit Card".to_string(),
        description: "Earn double points on dining and selected travel activities using registered OpenFN credit card".to_string(),
        conditions: vec![
            "2x points for dinning and activities".to_string(),
            "Valid from May 11, 2016".to_string(),
        ],
        icon: String::new(),
        start_date,
        end_date,
        method: DOUBLE_METHOD.to_string(),
    }
}

fn feedback_points() -> Contract {
    let (start_date, end_date) = seed_window();
    Contract {
        id: ContractId::new(FEEDBACK_CONTRACT),
        business_id: AccountId::new("T5940872"),
        business_name: "Open Travel Network".to_string(),
        title: "Points for Feedback by Travel App".to_string(),
        description: "Earn points by telling your thoughts on travel package and activities".to_string(),
        conditions: vec![
            "1,000 points for feedback on travel package ".to_string(),
            "100 points for feedback on each travel activity".to_string(),
            "Valid from May 11, 2016".to_string(),
        ],
        icon: String::new(),
        start_date,
        end_date,
        method: FEEDBACK_METHOD.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HistoryLayout;
    use crate::storage::{read_json, MemoryStore};

    #[test]
    fn test_apply_seeds_everything() {
        let store = MemoryStore::new();
        let history = TransactionLog::new(HistoryLayout::Indexed);
        assert!(Genesis::default().apply(&store, &history).unwrap());

        let natalie: Account = read_json(&store, "U2974034").unwrap().unwrap();
        assert_eq!(natalie.balance, Decimal::from(1000));
        assert_eq!(natalie.status, "Platinum");
        assert_eq!(natalie.modified, "2016-05-06");

        let anthony: Account = read_json(&store, "U3151672").unwrap().unwrap();
        assert_eq!(anthony.modified, "2016-04-17");
        assert_eq!(anthony.join, "2015-08-15");

        let ids: Vec<String> = read_json(&store, CONTRACT_IDS_KEY).unwrap().unwrap();
        assert_eq!(ids, vec![DOUBLE_CONTRACT, FEEDBACK_CONTRACT]);

        let counter: u64 = read_json(&store, REF_NUMBER_KEY).unwrap().unwrap();
        assert_eq!(counter, INITIAL_REFERENCE);
        assert!(history.all(&store).unwrap().is_empty());
    }

    #[test]
    fn test_apply_is_idempotent() {
        let store = MemoryStore::new();
        let history = TransactionLog::new(HistoryLayout::Legacy);
        let genesis = Genesis::default();
        assert!(genesis.apply(&store, &history).unwrap());

        store.put("U3151672", b"{}").unwrap();
        let before = store.len();
        assert!(!genesis.apply(&store, &history).unwrap());
        assert_eq!(store.len(), before);
        // Existing state left alone
        assert_eq!(store.get("U3151672").unwrap(), Some(b"{}".to_vec()));
    }

    #[test]
    fn test_seed_contracts_are_active_today() {
        let genesis = Genesis::default();
        let at = Utc.with_ymd_and_hms(2026, 10, 18, 0, 0, 0).unwrap();
        assert!(genesis.contracts.iter().all(|c| c.is_active_at(at)));
    }
}
