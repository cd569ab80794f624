use super::money::{Amount, Balance};
use crate::error::TransferError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a customer account (e.g. `checking`, `savings`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A customer account that transfers and compliance fees are paid from.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Account {
    pub id: AccountId,
    /// Display name shown next to the balance.
    pub name: String,
    pub balance: Balance,
}

impl Account {
    pub fn new(id: impl Into<AccountId>, name: impl Into<String>, balance: Balance) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            balance,
        }
    }

    /// Credits funds to the balance.
    ///
    /// Fails without a change if the new balance would overflow.
    pub fn credit(&mut self, amount: Amount) -> Result<(), TransferError> {
        self.balance = self.balance.try_add(amount.into())?;
        Ok(())
    }

    /// Debits funds from the balance if sufficient.
    ///
    /// On failure the balance is left untouched.
    pub fn debit(&mut self, amount: Balance) -> Result<(), TransferError> {
        if self.balance >= amount {
            self.balance -= amount;
            Ok(())
        } else {
            Err(TransferError::InsufficientFunds {
                account: self.id.clone(),
                available: self.balance,
                required: amount,
            })
        }
    }
}
