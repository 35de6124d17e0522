//! Member accounts
//!
//! Accounts live under their own id. Balances change only through
//! `apply_delta`, which also stamps the modification date. Nothing stops a
//! balance from going negative, but a balance that leaves the `Decimal` range
//! is refused.

use crate::{
    staging::WriteSet,
    storage::StateStore,
    types::{format_modified, Account, AccountId},
    Error, Result,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Account reads and balance updates
#[derive(Debug, Clone, Copy, Default)]
pub struct AccountLedger;

impl AccountLedger {
    /// Read an account through a write set
    pub fn fetch(&self, ws: &WriteSet<'_>, id: &AccountId) -> Result<Account> {
        decode(id, ws.get(id.as_str())?)
    }

    /// Read an account straight from the store
    pub fn load(&self, store: &dyn StateStore, id: &AccountId) -> Result<Account> {
        decode(id, store.get(id.as_str())?)
    }

    /// Stage `balance + delta` and a new modification date; returns the updated record
    pub fn apply_delta(
        &self,
        ws: &mut WriteSet<'_>,
        id: &AccountId,
        delta: Decimal,
        at: DateTime<Utc>,
    ) -> Result<Account> {
        let mut account = self.fetch(ws, id)?;
        account.balance = account.balance.checked_add(delta).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "balance of {} overflows: {} + {}",
                id, account.balance, delta
            ))
        })?;
        account.modified = format_modified(at);

        ws.put_json(id.as_str(), &account)?;

        tracing::debug!(
            account = %id,
            delta = %delta,
            balance = %account.balance,
            "Balance delta staged"
        );

        Ok(account)
    }

    /// Stage a whole account record
    pub fn stage(&self, ws: &mut WriteSet<'_>, account: &Account) -> Result<()> {
        ws.put_json(account.user_id.as_str(), account)
    }
}

fn decode(id: &AccountId, bytes: Option<Vec<u8>>) -> Result<Account> {
    let bytes = bytes.ok_or_else(|| Error::NotFound(format!("account {}", id)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| Error::NotFound(format!("account {} is unreadable: {}", id, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use chrono::TimeZone;

    fn natalie() -> Account {
        Account {
            user_id: AccountId::new("U2974034"),
            name: "Natalie".to_string(),
            balance: Decimal::from(1000),
            status: "Platinum".to_string(),
            expiration: "2017-06-01".to_string(),
            join: "2015-05-31".to_string(),
            modified: "2016-05-06".to_string(),
        }
    }

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .put("U2974034", &serde_json::to_vec(&natalie()).unwrap())
            .unwrap();
        store
    }

    #[test]
    fn test_fetch_missing_is_not_found() {
        let store = MemoryStore::new();
        let ws = WriteSet::new(&store);
        let err = AccountLedger.fetch(&ws, &AccountId::new("U0")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_fetch_undecodable_is_not_found() {
        let store = MemoryStore::new();
        store.put("U1", b"{\"broken\":").unwrap();
        let err = AccountLedger.load(&store, &AccountId::new("U1")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_apply_delta_credit_and_debit() {
        let store = seeded();
        let at = Utc.with_ymd_and_hms(2016, 6, 1, 8, 15, 0).unwrap();
        let id = AccountId::new("U2974034");

        let mut ws = WriteSet::new(&store);
        let credited = AccountLedger
            .apply_delta(&mut ws, &id, Decimal::from(300), at)
            .unwrap();
        assert_eq!(credited.balance, Decimal::from(1300));
        assert_eq!(credited.modified, "01 Jun 16 08:15 UTC");

        // Second delta sees the first through the write set
        let debited = AccountLedger
            .apply_delta(&mut ws, &id, Decimal::from(-1500), at)
            .unwrap();
        assert_eq!(debited.balance, Decimal::from(-200));

        // Store untouched until commit
        assert_eq!(AccountLedger.load(&store, &id).unwrap().balance, Decimal::from(1000));
        ws.commit().unwrap();
        assert_eq!(AccountLedger.load(&store, &id).unwrap().balance, Decimal::from(-200));
    }

    #[test]
    fn test_apply_delta_overflow_stages_nothing() {
        let store = seeded();
        let at = Utc.with_ymd_and_hms(2016, 6, 1, 8, 15, 0).unwrap();
        let id = AccountId::new("U2974034");

        let mut ws = WriteSet::new(&store);
        let err = AccountLedger
            .apply_delta(&mut ws, &id, Decimal::MAX, at)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(AccountLedger.fetch(&ws, &id).unwrap().balance, Decimal::from(1000));
    }

    #[test]
    fn test_stage_whole_record() {
        let store = MemoryStore::new();
        let mut ws = WriteSet::new(&store);
        AccountLedger.stage(&mut ws, &natalie()).unwrap();
        ws.commit().unwrap();
        assert_eq!(AccountLedger.load(&store, &natalie().user_id).unwrap(), natalie());
    }
}
