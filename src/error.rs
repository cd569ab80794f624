use crate::domain::account::AccountId;
use crate::domain::money::Balance;
use crate::domain::transaction::{TransactionId, TransactionStatus};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Config error: {0}")]
    ConfigError(#[from] toml::de::Error),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Insufficient funds in account {account}: available {available}, required {required}")]
    InsufficientFunds {
        account: AccountId,
        available: Balance,
        required: Balance,
    },
    #[error("Invalid clearance code")]
    InvalidClearanceCode,
    #[error("Transaction not found: {0}")]
    NotFound(TransactionId),
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),
    #[error("Cannot {action} transaction {id} while it is {status}")]
    InvalidState {
        id: TransactionId,
        status: TransactionStatus,
        action: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, TransferError>;
