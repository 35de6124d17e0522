//! Core types for the points ledger
//!
//! Records are stored as JSON under the field names existing ledger state
//! already uses, so a store written by an earlier deployment stays readable.
//! Point amounts are exact decimals serialized as JSON numbers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Status code of a completed transfer
pub const STATUS_COMPLETED: i32 = 1;
/// Status message of a completed transfer
pub const STATUS_COMPLETED_MSG: &str = "Transaction Completed";
/// Status code of a transfer recorded with a malformed numeric field
pub const STATUS_INVALID: i32 = 0;
/// Status message of a transfer recorded with a malformed numeric field
pub const STATUS_INVALID_MSG: &str = "Invalid Amount";

/// Format of `Account::modified`
pub const MODIFIED_DATE_FORMAT: &str = "%d %b %y %H:%M UTC";

/// Render a timestamp the way account modification dates are stored
pub fn format_modified(at: DateTime<Utc>) -> String {
    at.format(MODIFIED_DATE_FORMAT).to_string()
}

/// Member (user) identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Create new account ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Contract identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContractId(String);

impl ContractId {
    /// Create new contract ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the empty id a transfer without a contract carries
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transfer reference number
///
/// Stored as a bare integer under the counter key and as a decimal string
/// inside transaction records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReferenceNumber(u64);

impl ReferenceNumber {
    /// Wrap a raw counter value
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw counter value
    pub fn value(&self) -> u64 {
        self.0
    }

    /// The number allocated after this one
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for ReferenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for ReferenceNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ReferenceNumber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<u64>()
            .map(ReferenceNumber)
            .map_err(serde::de::Error::custom)
    }
}

/// Member account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Account ID
    #[serde(rename = "UserId")]
    pub user_id: AccountId,

    /// Display name
    #[serde(rename = "Name")]
    pub name: String,

    /// Point balance (may go negative)
    #[serde(rename = "Balance", with = "rust_decimal::serde::float")]
    pub balance: Decimal,

    /// Membership tier or role
    #[serde(rename = "Status")]
    pub status: String,

    /// Membership expiration date
    #[serde(rename = "ExpirationDate")]
    pub expiration: String,

    /// Join date
    #[serde(rename = "JoinDate")]
    pub join: String,

    /// Last balance change
    #[serde(rename = "LastModifiedDate")]
    pub modified: String,
}

/// Business rule attached to transfers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    /// Contract ID
    #[serde(rename = "ID")]
    pub id: ContractId,

    /// Owning business account
    #[serde(rename = "BusinessId")]
    pub business_id: AccountId,

    /// Owning business name
    #[serde(rename = "BusinessName")]
    pub business_name: String,

    /// Title
    #[serde(rename = "Title")]
    pub title: String,

    /// Description
    #[serde(rename = "Description")]
    pub description: String,

    /// Human readable conditions, display only
    #[serde(rename = "Conditions", default)]
    pub conditions: Vec<String>,

    /// Icon reference
    #[serde(rename = "Icon", default)]
    pub icon: String,

    /// First instant the contract applies
    #[serde(rename = "StartDate")]
    pub start_date: DateTime<Utc>,

    /// First instant the contract no longer applies
    #[serde(rename = "EndDate")]
    pub end_date: DateTime<Utc>,

    /// Symbolic evaluator name
    #[serde(rename = "Method")]
    pub method: String,
}

impl Contract {
    /// Whether `at` falls inside `[start_date, end_date)`
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.start_date <= at && at < self.end_date
    }
}

/// Immutable record of one transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Reference number
    #[serde(rename = "RefNumber")]
    pub reference: ReferenceNumber,

    /// Transfer timestamp
    #[serde(rename = "Date")]
    pub date: DateTime<Utc>,

    /// Free text description
    #[serde(rename = "description")]
    pub description: String,

    /// Transfer type tag
    #[serde(rename = "Type")]
    pub tx_type: String,

    /// Points moved, after contract evaluation
    #[serde(rename = "Amount", with = "rust_decimal::serde::float")]
    pub amount: Decimal,

    /// Money paid alongside the transfer, audit only
    #[serde(rename = "Money", with = "rust_decimal::serde::float")]
    pub money: Decimal,

    /// Feedback activities completed
    #[serde(rename = "FeedbackActivitiesDone")]
    pub activities: u32,

    /// Receiver
    #[serde(rename = "ToUserid")]
    pub to: AccountId,

    /// Sender
    #[serde(rename = "FromUserid")]
    pub from: AccountId,

    /// Receiver display name
    #[serde(rename = "ToName")]
    pub to_name: String,

    /// Sender display name
    #[serde(rename = "FromName")]
    pub from_name: String,

    /// Contract the amount was evaluated under (may be empty)
    #[serde(rename = "ContractId")]
    pub contract_id: ContractId,

    /// 1 = completed, 0 = recorded with an invalid numeric field
    #[serde(rename = "StatusCode")]
    pub status_code: i32,

    /// Status message
    #[serde(rename = "StatusMsg")]
    pub status_msg: String,
}

impl Transaction {
    /// Whether `user` is the sender or the receiver
    pub fn involves(&self, user: &AccountId) -> bool {
        &self.to == user || &self.from == user
    }
}

/// Transfer request as submitted by the host, numeric fields still raw
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Receiver
    pub to: AccountId,
    /// Sender
    pub from: AccountId,
    /// Transfer type tag
    pub tx_type: String,
    /// Free text description
    pub description: String,
    /// Contract to evaluate (empty for none)
    pub contract_id: ContractId,
    /// Feedback activities completed
    pub activities: String,
    /// Base point amount
    pub amount: String,
    /// Money paid alongside the transfer
    pub money: String,
}

impl TransferRequest {
    /// Request with no contract, zero activities and zero money
    pub fn new(to: impl Into<String>, from: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            to: AccountId::new(to),
            from: AccountId::new(from),
            tx_type: "transfer".to_string(),
            description: String::new(),
            contract_id: ContractId::new(""),
            activities: "0".to_string(),
            amount: amount.into(),
            money: "0".to_string(),
        }
    }

    /// Attach a contract
    pub fn with_contract(mut self, contract_id: impl Into<String>) -> Self {
        self.contract_id = ContractId::new(contract_id);
        self
    }

    /// Set the completed activity count
    pub fn with_activities(mut self, activities: impl Into<String>) -> Self {
        self.activities = activities.into();
        self
    }

    /// Set the money field
    pub fn with_money(mut self, money: impl Into<String>) -> Self {
        self.money = money.into();
        self
    }

    /// Set type and description
    pub fn with_details(mut self, tx_type: impl Into<String>, description: impl Into<String>) -> Self {
        self.tx_type = tx_type.into();
        self.description = description.into();
        self
    }
}
