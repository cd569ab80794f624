use super::account::AccountId;
use super::money::{Amount, Balance};
use super::time::Timestamp;
use crate::error::TransferError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque transaction identifier, assigned by the transaction store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(u32);

impl TransactionId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a transfer is in its lifecycle.
///
/// Variants are declared in lifecycle order; [`TransactionStatus::rank`] exposes
/// that order so transitions can be checked for monotonicity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Submitted,
    Processing,
    Converting,
    InTransit,
    FlaggedAwaitingClearance,
    Cleared,
    FundsArrived,
}

impl TransactionStatus {
    pub fn rank(self) -> u8 {
        match self {
            Self::Submitted => 0,
            Self::Processing => 1,
            Self::Converting => 2,
            Self::InTransit => 3,
            Self::FlaggedAwaitingClearance => 4,
            Self::Cleared => 5,
            Self::FundsArrived => 6,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Self::FundsArrived
    }

    /// The cosmetic "in progress" stages shown before settlement or review.
    pub fn is_in_progress(self) -> bool {
        matches!(
            self,
            Self::Submitted | Self::Processing | Self::Converting | Self::InTransit
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "SUBMITTED",
            Self::Processing => "PROCESSING",
            Self::Converting => "CONVERTING",
            Self::InTransit => "IN_TRANSIT",
            Self::FlaggedAwaitingClearance => "FLAGGED_AWAITING_CLEARANCE",
            Self::Cleared => "CLEARED",
            Self::FundsArrived => "FUNDS_ARRIVED",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusEntry {
    pub status: TransactionStatus,
    pub at: Timestamp,
}

/// Append-only, ordered record of when each status was first entered.
///
/// Always starts with `SUBMITTED`. A status appears at most once and entries
/// are never rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StatusLog(Vec<StatusEntry>);

impl StatusLog {
    fn starting_at(at: Timestamp) -> Self {
        Self(vec![StatusEntry {
            status: TransactionStatus::Submitted,
            at,
        }])
    }

    fn record(&mut self, status: TransactionStatus, at: Timestamp) -> bool {
        if self.contains(status) {
            return false;
        }
        self.0.push(StatusEntry { status, at });
        true
    }

    pub fn contains(&self, status: TransactionStatus) -> bool {
        self.0.iter().any(|e| e.status == status)
    }

    pub fn entered_at(&self, status: TransactionStatus) -> Option<Timestamp> {
        self.0.iter().find(|e| e.status == status).map(|e| e.at)
    }

    pub fn entries(&self) -> &[StatusEntry] {
        &self.0
    }

    pub fn statuses(&self) -> Vec<TransactionStatus> {
        self.0.iter().map(|e| e.status).collect()
    }

    pub fn started_at(&self) -> Timestamp {
        self.0[0].at
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Debit,
    Credit,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debit => f.write_str("debit"),
            Self::Credit => f.write_str("credit"),
        }
    }
}

/// How a transfer is routed. Standard and wire transfers share the lifecycle
/// but are priced differently; internal movements (fee payments, deposits)
/// settle immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferRail {
    Standard,
    Wire,
    Internal,
}

impl fmt::Display for TransferRail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard => f.write_str("standard"),
            Self::Wire => f.write_str("wire"),
            Self::Internal => f.write_str("internal"),
        }
    }
}

/// ISO 3166 alpha-2 country code, upper-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CountryCode(String);

impl CountryCode {
    pub fn new(code: &str) -> Result<Self, TransferError> {
        let code = code.trim();
        if code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()) {
            Ok(Self(code.to_ascii_uppercase()))
        } else {
            Err(TransferError::ValidationError(format!(
                "Invalid country code: {code:?}"
            )))
        }
    }

    pub fn us() -> Self {
        Self("US".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CountryCode {
    type Error = TransferError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<CountryCode> for String {
    fn from(code: CountryCode) -> Self {
        code.0
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// ISO 4217 currency code, upper-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    pub fn new(code: &str) -> Result<Self, TransferError> {
        let code = code.trim();
        if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
            Ok(Self(code.to_ascii_uppercase()))
        } else {
            Err(TransferError::ValidationError(format!(
                "Invalid currency code: {code:?}"
            )))
        }
    }

    pub fn usd() -> Self {
        Self("USD".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Currency {
    type Error = TransferError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Snapshot of the payee at the time the transfer was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: String,
    pub name: String,
    pub country: CountryCode,
}

impl Recipient {
    pub fn new(id: impl Into<String>, name: impl Into<String>, country: CountryCode) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            country,
        }
    }
}

/// The monetary and routing terms of a transaction, fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferTerms {
    pub kind: TransactionKind,
    pub rail: TransferRail,
    pub source_account: AccountId,
    pub recipient: Recipient,
    pub send_amount: Amount,
    pub fee: Balance,
    pub exchange_rate: Decimal,
    pub receive_amount: Decimal,
    pub receive_currency: Currency,
    /// Whether the creator held this transfer for compliance clearance.
    pub flagged: bool,
    pub description: String,
    /// The transaction this one was made on behalf of (fee payments).
    pub related: Option<TransactionId>,
}

/// A transaction and its lifecycle state.
///
/// Terms are immutable once constructed; only the status and its timeline
/// move, and only along the edges allowed by [`Transaction::can_transition_to`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    id: TransactionId,
    status: TransactionStatus,
    #[serde(flatten)]
    terms: TransferTerms,
    timeline: StatusLog,
}

impl Transaction {
    /// A freshly created transaction in `SUBMITTED`.
    pub fn submitted(id: TransactionId, terms: TransferTerms, at: Timestamp) -> Self {
        Self {
            id,
            status: TransactionStatus::Submitted,
            terms,
            timeline: StatusLog::starting_at(at),
        }
    }

    /// A transaction that settles on creation, e.g. a fee payment or deposit.
    ///
    /// The timeline still opens with `SUBMITTED` at the same instant.
    pub fn settled(id: TransactionId, mut terms: TransferTerms, at: Timestamp) -> Self {
        terms.flagged = false;
        let mut timeline = StatusLog::starting_at(at);
        timeline.record(TransactionStatus::FundsArrived, at);
        Self {
            id,
            status: TransactionStatus::FundsArrived,
            terms,
            timeline,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn terms(&self) -> &TransferTerms {
        &self.terms
    }

    pub fn timeline(&self) -> &StatusLog {
        &self.timeline
    }

    pub fn is_flagged(&self) -> bool {
        self.terms.flagged
    }

    pub fn created_at(&self) -> Timestamp {
        self.timeline.started_at()
    }

    /// True when `other` is the same record as created, regardless of how far
    /// either copy has progressed.
    pub fn same_instance(&self, other: &Transaction) -> bool {
        self.id == other.id && self.created_at() == other.created_at() && self.terms == other.terms
    }

    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        let flagged = self.terms.flagged;
        match (self.status, next) {
            (Submitted, Processing) | (Processing, Converting) | (Converting, InTransit) => true,
            (InTransit, FundsArrived) => !flagged,
            (from, FlaggedAwaitingClearance) => flagged && from.is_in_progress(),
            (FlaggedAwaitingClearance, Cleared) => true,
            (Cleared, FundsArrived) => true,
            _ => false,
        }
    }

    /// Moves to `next` and stamps it, if the edge is legal.
    ///
    /// Returns `false` and leaves the transaction untouched otherwise.
    pub fn transition(&mut self, next: TransactionStatus, at: Timestamp) -> bool {
        if !self.can_transition_to(next) || !self.timeline.record(next, at) {
            return false;
        }
        self.status = next;
        true
    }
}
