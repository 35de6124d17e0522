//! Command interface for host integrations
//!
//! A host talks to the ledger through a cloneable [`LedgerHandle`]. Each call
//! becomes a [`LedgerCommand`] in a bounded mailbox; the [`LedgerActor`] takes
//! commands off the mailbox and runs each one on the blocking pool, so
//! transfers over disjoint accounts run in parallel while the ledger's key
//! locks serialize the rest.
//!
//! ```text
//!   LedgerHandle (Clone) ──mpsc (bounded)──▶ LedgerActor
//!                                              │
//!                                              ├─ spawn_blocking ─▶ PointsLedger::submit_transfer
//!                                              ├─ spawn_blocking ─▶ PointsLedger::query_*
//!                                              └─ ...
//!   oneshot ◀──────────── result ──────────────┘
//! ```

use crate::{
    types::{Account, Contract, ReferenceNumber, Transaction, TransferRequest},
    Error, PointsLedger, Result,
};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;

/// Message sent to the ledger actor
#[derive(Debug)]
pub enum LedgerCommand {
    /// Run a transfer
    SubmitTransfer {
        request: TransferRequest,
        response: oneshot::Sender<Result<ReferenceNumber>>,
    },

    /// Read an account
    QueryUserAccount {
        user_id: String,
        response: oneshot::Sender<Result<Account>>,
    },

    /// Read a member's transactions
    QueryTransactionsForUser {
        user_id: String,
        response: oneshot::Sender<Result<Vec<Transaction>>>,
    },

    /// Read the full history
    QueryAllTransactions {
        response: oneshot::Sender<Result<Vec<Transaction>>>,
    },

    /// Read a contract
    QueryContract {
        contract_id: String,
        response: oneshot::Sender<Result<Contract>>,
    },

    /// Read every registered contract
    QueryAllContracts {
        response: oneshot::Sender<Result<Vec<Contract>>>,
    },

    /// Store and bind a contract
    RegisterContract {
        contract: Contract,
        response: oneshot::Sender<Result<()>>,
    },

    /// Apply a signed delta to one account
    AdjustBalance {
        user_id: String,
        amount: String,
        response: oneshot::Sender<Result<Account>>,
    },

    /// Stop accepting commands; in-flight ones finish first
    Shutdown,
}

impl LedgerCommand {
    fn name(&self) -> &'static str {
        match self {
            LedgerCommand::SubmitTransfer { .. } => "submit_transfer",
            LedgerCommand::QueryUserAccount { .. } => "query_user_account",
            LedgerCommand::QueryTransactionsForUser { .. } => "query_transactions_for_user",
            LedgerCommand::QueryAllTransactions { .. } => "query_all_transactions",
            LedgerCommand::QueryContract { .. } => "query_contract",
            LedgerCommand::QueryAllContracts { .. } => "query_all_contracts",
            LedgerCommand::RegisterContract { .. } => "register_contract",
            LedgerCommand::AdjustBalance { .. } => "adjust_balance",
            LedgerCommand::Shutdown => "shutdown",
        }
    }

    /// Run against the ledger and answer the caller
    fn execute(self, ledger: &PointsLedger) {
        // A dropped receiver means the caller gave up; nothing to report
        match self {
            LedgerCommand::SubmitTransfer { request, response } => {
                let _ = response.send(ledger.submit_transfer(&request));
            }
            LedgerCommand::QueryUserAccount { user_id, response } => {
                let _ = response.send(ledger.query_user_account(&user_id));
            }
            LedgerCommand::QueryTransactionsForUser { user_id, response } => {
                let _ = response.send(ledger.query_transactions_for_user(&user_id));
            }
            LedgerCommand::QueryAllTransactions { response } => {
                let _ = response.send(ledger.query_all_transactions());
            }
            LedgerCommand::QueryContract { contract_id, response } => {
                let _ = response.send(ledger.query_contract(&contract_id));
            }
            LedgerCommand::QueryAllContracts { response } => {
                let _ = response.send(ledger.query_all_contracts());
            }
            LedgerCommand::RegisterContract { contract, response } => {
                let _ = response.send(ledger.register_contract(contract));
            }
            LedgerCommand::AdjustBalance {
                user_id,
                amount,
                response,
            } => {
                let _ = response.send(ledger.adjust_balance(&user_id, &amount));
            }
            LedgerCommand::Shutdown => {}
        }
    }
}

/// Actor that processes ledger commands
pub struct LedgerActor {
    /// Ledger the commands run against
    ledger: Arc<PointsLedger>,

    /// Mailbox for incoming commands
    mailbox: mpsc::Receiver<LedgerCommand>,

    /// Commands running on the blocking pool
    in_flight: JoinSet<()>,
}

impl LedgerActor {
    /// Create new actor
    pub fn new(ledger: Arc<PointsLedger>, mailbox: mpsc::Receiver<LedgerCommand>) -> Self {
        Self {
            ledger,
            mailbox,
            in_flight: JoinSet::new(),
        }
    }

    /// Run the actor event loop until shutdown or until every handle is dropped
    pub async fn run(mut self) {
        loop {
            let command = tokio::select! {
                command = self.mailbox.recv() => command,

                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!("Ledger command task failed: {}", e);
                    }
                    continue;
                }
            };

            match command {
                None | Some(LedgerCommand::Shutdown) => break,
                Some(command) => {
                    tracing::trace!(command = command.name(), "Dispatching ledger command");
                    let ledger = self.ledger.clone();
                    self.in_flight.spawn_blocking(move || command.execute(&ledger));
                }
            }
        }

        self.mailbox.close();
        while let Some(joined) = self.in_flight.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Ledger command task failed: {}", e);
            }
        }

        tracing::info!("Ledger actor stopped");
    }
}

impl std::fmt::Debug for LedgerActor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerActor")
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}

/// Handle for sending commands to the actor
#[derive(Debug, Clone)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerCommand>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerCommand>) -> Self {
        Self { sender }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<T>>) -> LedgerCommand,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(command(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Run a transfer
    pub async fn submit_transfer(&self, request: TransferRequest) -> Result<ReferenceNumber> {
        self.request(|response| LedgerCommand::SubmitTransfer { request, response })
            .await
    }

    /// Read an account
    pub async fn query_user_account(&self, user_id: impl Into<String>) -> Result<Account> {
        let user_id = user_id.into();
        self.request(|response| LedgerCommand::QueryUserAccount { user_id, response })
            .await
    }

    /// Read a member's transactions, oldest first
    pub async fn query_transactions_for_user(&self, user_id: impl Into<String>) -> Result<Vec<Transaction>> {
        let user_id = user_id.into();
        self.request(|response| LedgerCommand::QueryTransactionsForUser { user_id, response })
            .await
    }

    /// Read the full history
    pub async fn query_all_transactions(&self) -> Result<Vec<Transaction>> {
        self.request(|response| LedgerCommand::QueryAllTransactions { response })
            .await
    }

    /// Read a contract
    pub async fn query_contract(&self, contract_id: impl Into<String>) -> Result<Contract> {
        let contract_id = contract_id.into();
        self.request(|response| LedgerCommand::QueryContract { contract_id, response })
            .await
    }

    /// Read every registered contract
    pub async fn query_all_contracts(&self) -> Result<Vec<Contract>> {
        self.request(|response| LedgerCommand::QueryAllContracts { response })
            .await
    }

    /// Store and bind a contract
    pub async fn register_contract(&self, contract: Contract) -> Result<()> {
        self.request(|response| LedgerCommand::RegisterContract { contract, response })
            .await
    }

    /// Apply a signed delta to one account
    pub async fn adjust_balance(&self, user_id: impl Into<String>, amount: impl Into<String>) -> Result<Account> {
        let user_id = user_id.into();
        let amount = amount.into();
        self.request(|response| LedgerCommand::AdjustBalance {
            user_id,
            amount,
            response,
        })
        .await
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(LedgerCommand::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the ledger actor on the current runtime
pub fn spawn_ledger_actor(ledger: Arc<PointsLedger>) -> LedgerHandle {
    let (tx, rx) = mpsc::channel(ledger.config().mailbox_size.max(1));
    let actor = LedgerActor::new(ledger, rx);

    tokio::spawn(async move {
        actor.run().await;
    });

    LedgerHandle::new(tx)
}
