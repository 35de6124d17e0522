//! Transaction history
//!
//! Two layouts share one observable contract: every committed transfer
//! yields exactly one immutable entry, the full history comes back in
//! reference order, and a participant lookup returns every entry naming
//! that account as sender or receiver, oldest first.
//!
//! # Layouts
//!
//! - `Legacy` - the whole history is one `{"transactions": [...]}` record
//!   under `allTx`, rewritten on every append. Readable by older deployments.
//!   Appends serialize on the `allTx` key.
//! - `Indexed` - one record per transfer under `tx:<ref>`, plus a
//!   `txUser:<account>` list of references per participant. Appends only
//!   touch keys owned by the two participants.

use crate::{
    config::HistoryLayout,
    reference::{INITIAL_REFERENCE, REF_NUMBER_KEY},
    staging::WriteSet,
    storage::{read_json, StateStore},
    types::{AccountId, ReferenceNumber, Transaction},
    Error, Result,
};
use serde::{Deserialize, Deserializer, Serialize};

/// Legacy history key
pub const ALL_TX_KEY: &str = "allTx";

/// First reference number the indexed layout scans from
pub const TX_START_KEY: &str = "txStart";

const TX_KEY_PREFIX: &str = "tx:";
const TX_USER_KEY_PREFIX: &str = "txUser:";

fn tx_key(reference: ReferenceNumber) -> String {
    format!("{}{}", TX_KEY_PREFIX, reference)
}

fn tx_user_key(user: &AccountId) -> String {
    format!("{}{}", TX_USER_KEY_PREFIX, user)
}

/// Legacy history record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct AllTransactions {
    #[serde(default, deserialize_with = "null_as_empty")]
    transactions: Vec<Transaction>,
}

// Older writers stored an empty history as `null`
fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Append-only transaction history
#[derive(Debug, Clone, Copy)]
pub struct TransactionLog {
    layout: HistoryLayout,
}

impl TransactionLog {
    /// History in the given layout
    pub fn new(layout: HistoryLayout) -> Self {
        Self { layout }
    }

    /// Layout in use
    pub fn layout(&self) -> HistoryLayout {
        self.layout
    }

    /// Keys an append must hold besides the participants' own
    pub fn lock_keys(&self) -> Vec<&'static str> {
        match self.layout {
            HistoryLayout::Legacy => vec![ALL_TX_KEY],
            HistoryLayout::Indexed => vec![],
        }
    }

    /// Stage an empty history starting at `first_reference`
    pub fn stage_empty(&self, ws: &mut WriteSet<'_>, first_reference: ReferenceNumber) -> Result<()> {
        ws.put_json(ALL_TX_KEY, &AllTransactions::default())?;
        ws.put_json(TX_START_KEY, &first_reference.value())
    }

    /// Stage one new entry
    pub fn append(&self, ws: &mut WriteSet<'_>, tx: &Transaction) -> Result<()> {
        match self.layout {
            HistoryLayout::Legacy => {
                let mut all: AllTransactions = ws.get_json(ALL_TX_KEY)?.unwrap_or_default();
                all.transactions.push(tx.clone());
                ws.put_json(ALL_TX_KEY, &all)?;
            }
            HistoryLayout::Indexed => {
                let key = tx_key(tx.reference);
                if ws.get(&key)?.is_some() {
                    return Err(Error::Other(format!(
                        "transaction {} already recorded",
                        tx.reference
                    )));
                }
                ws.put_json(key, tx)?;

                self.index_participant(ws, &tx.to, tx.reference)?;
                if tx.from != tx.to {
                    self.index_participant(ws, &tx.from, tx.reference)?;
                }
            }
        }

        tracing::debug!(reference = %tx.reference, layout = ?self.layout, "Transaction staged");
        Ok(())
    }

    fn index_participant(
        &self,
        ws: &mut WriteSet<'_>,
        user: &AccountId,
        reference: ReferenceNumber,
    ) -> Result<()> {
        let key = tx_user_key(user);
        let mut refs: Vec<ReferenceNumber> = ws.get_json(&key)?.unwrap_or_default();
        refs.push(reference);
        ws.put_json(key, &refs)
    }

    /// Entry with the given reference number
    pub fn get(&self, store: &dyn StateStore, reference: ReferenceNumber) -> Result<Transaction> {
        let found = match self.layout {
            HistoryLayout::Legacy => self
                .load_all(store)?
                .into_iter()
                .find(|tx| tx.reference == reference),
            HistoryLayout::Indexed => read_json(store, &tx_key(reference))?,
        };

        found.ok_or_else(|| Error::NotFound(format!("transaction {}", reference)))
    }

    /// Full history in reference order
    pub fn all(&self, store: &dyn StateStore) -> Result<Vec<Transaction>> {
        match self.layout {
            HistoryLayout::Legacy => self.load_all(store),
            HistoryLayout::Indexed => {
                let start = read_json::<u64>(store, TX_START_KEY)?.unwrap_or(INITIAL_REFERENCE);
                let end = read_json::<u64>(store, REF_NUMBER_KEY)?.unwrap_or(start);

                let mut entries = Vec::new();
                // Gaps are references consumed by failed attempts
                for value in start..end {
                    if let Some(tx) = read_json(store, &tx_key(ReferenceNumber::new(value)))? {
                        entries.push(tx);
                    }
                }
                Ok(entries)
            }
        }
    }

    /// Entries where `user` is sender or receiver, oldest first
    pub fn for_participant(&self, store: &dyn StateStore, user: &AccountId) -> Result<Vec<Transaction>> {
        match self.layout {
            HistoryLayout::Legacy => Ok(self
                .load_all(store)?
                .into_iter()
                .filter(|tx| tx.involves(user))
                .collect()),
            HistoryLayout::Indexed => {
                let refs: Vec<ReferenceNumber> =
                    read_json(store, &tx_user_key(user))?.unwrap_or_default();
                refs.into_iter()
                    .map(|reference| self.get(store, reference))
                    .collect()
            }
        }
    }

    fn load_all(&self, store: &dyn StateStore) -> Result<Vec<Transaction>> {
        let all: AllTransactions = read_json(store, ALL_TX_KEY)?.unwrap_or_default();
        Ok(all.transactions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::types::{ContractId, STATUS_COMPLETED, STATUS_COMPLETED_MSG};
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn tx(reference: u64, from: &str, to: &str) -> Transaction {
        Transaction {
            reference: ReferenceNumber::new(reference),
            date: Utc::now(),
            description: String::new(),
            tx_type: "transfer".to_string(),
            amount: Decimal::from(10),
            money: Decimal::ZERO,
            activities: 0,
            to: AccountId::new(to),
            from: AccountId::new(from),
            to_name: to.to_lowercase(),
            from_name: from.to_lowercase(),
            contract_id: ContractId::new(""),
            status_code: STATUS_COMPLETED,
            status_msg: STATUS_COMPLETED_MSG.to_string(),
        }
    }

    /// Empty history at 100, counter already past the given entries
    fn seeded(log: &TransactionLog, entries: &[Transaction]) -> MemoryStore {
        let store = MemoryStore::new();
        let mut ws = WriteSet::new(&store);
        log.stage_empty(&mut ws, ReferenceNumber::new(100)).unwrap();
        ws.commit().unwrap();

        for entry in entries {
            let mut ws = WriteSet::new(&store);
            log.append(&mut ws, entry).unwrap();
            ws.commit().unwrap();
        }

        let next = entries.iter().map(|t| t.reference.value() + 1).max().unwrap_or(100);
        store.put(REF_NUMBER_KEY, &serde_json::to_vec(&next).unwrap()).unwrap();
        store
    }

    fn refs(entries: &[Transaction]) -> Vec<u64> {
        entries.iter().map(|t| t.reference.value()).collect()
    }

    fn both_layouts() -> [TransactionLog; 2] {
        [
            TransactionLog::new(HistoryLayout::Legacy),
            TransactionLog::new(HistoryLayout::Indexed),
        ]
    }

    #[test]
    fn test_participant_lookup_matches_sender_or_receiver() {
        for log in both_layouts() {
            let store = seeded(
                &log,
                &[tx(100, "A", "B"), tx(101, "C", "D"), tx(102, "B", "C"), tx(104, "D", "A")],
            );

            assert_eq!(refs(&log.all(&store).unwrap()), vec![100, 101, 102, 104]);
            assert_eq!(refs(&log.for_participant(&store, &AccountId::new("A")).unwrap()), vec![100, 104]);
            assert_eq!(refs(&log.for_participant(&store, &AccountId::new("C")).unwrap()), vec![101, 102]);
            assert!(log.for_participant(&store, &AccountId::new("Z")).unwrap().is_empty());
        }
    }

    #[test]
    fn test_self_transfer_listed_once() {
        for log in both_layouts() {
            let store = seeded(&log, &[tx(100, "A", "A")]);
            assert_eq!(log.for_participant(&store, &AccountId::new("A")).unwrap().len(), 1);
        }
    }

    #[test]
    fn test_get_by_reference() {
        for log in both_layouts() {
            let store = seeded(&log, &[tx(100, "A", "B"), tx(101, "B", "A")]);
            assert_eq!(log.get(&store, ReferenceNumber::new(101)).unwrap().from.as_str(), "B");
            assert!(matches!(
                log.get(&store, ReferenceNumber::new(103)),
                Err(Error::NotFound(_))
            ));
        }
    }

    #[test]
    fn test_legacy_reads_null_history() {
        let store = MemoryStore::new();
        store.put(ALL_TX_KEY, br#"{"transactions":null}"#).unwrap();
        let log = TransactionLog::new(HistoryLayout::Legacy);
        assert!(log.all(&store).unwrap().is_empty());
    }

    #[test]
    fn test_indexed_rejects_duplicate_reference() {
        let log = TransactionLog::new(HistoryLayout::Indexed);
        let store = seeded(&log, &[tx(100, "A", "B")]);
        let mut ws = WriteSet::new(&store);
        assert!(log.append(&mut ws, &tx(100, "C", "D")).is_err());
    }

    #[test]
    fn test_lock_keys() {
        assert_eq!(TransactionLog::new(HistoryLayout::Legacy).lock_keys(), vec![ALL_TX_KEY]);
        assert!(TransactionLog::new(HistoryLayout::Indexed).lock_keys().is_empty());
    }
}
