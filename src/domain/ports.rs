use super::account::{Account, AccountId};
use super::money::{Amount, Balance};
use super::transaction::{Transaction, TransactionId};
use crate::error::Result;
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn store(&self, account: Account) -> Result<()>;
    async fn get(&self, id: &AccountId) -> Result<Option<Account>>;
    async fn get_all(&self) -> Result<Vec<Account>>;
    /// Debits `amount` atomically. Leaves the account untouched on failure.
    async fn debit(&self, id: &AccountId, amount: Balance) -> Result<Account>;
    async fn credit(&self, id: &AccountId, amount: Amount) -> Result<Account>;
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Allocates a fresh, never reused transaction id.
    async fn next_id(&self) -> Result<TransactionId>;
    async fn store(&self, tx: Transaction) -> Result<()>;
    async fn get(&self, id: TransactionId) -> Result<Option<Transaction>>;
    async fn get_all(&self) -> Result<Vec<Transaction>>;
}

pub type AccountStoreRef = Arc<dyn AccountStore>;
pub type TransactionStoreRef = Arc<dyn TransactionStore>;

/// Deferred work handed to a [`Scheduler`].
pub type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

impl TimerHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// "Delay and invoke": runs `task` once after `delay` unless cancelled first.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle;
    /// Cancelling a handle that already fired or was cancelled is a no-op.
    fn cancel(&self, handle: TimerHandle);
}
