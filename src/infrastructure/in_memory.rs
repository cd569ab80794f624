use crate::domain::account::{Account, AccountId};
use crate::domain::money::{Amount, Balance};
use crate::domain::ports::{AccountStore, TransactionStore};
use crate::domain::transaction::{Transaction, TransactionId};
use crate::error::{Result, TransferError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::RwLock;

/// A thread-safe in-memory store for customer accounts.
///
/// Uses `Arc<RwLock<HashMap<AccountId, Account>>>` to allow shared concurrent access.
/// Debits and credits run under the write lock so a balance check and the
/// matching mutation can never interleave with another writer.
#[derive(Default, Clone)]
pub struct InMemoryAccountStore {
    accounts: Arc<RwLock<HashMap<AccountId, Account>>>,
}

impl InMemoryAccountStore {
    /// Creates a new, empty in-memory account store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `accounts`.
    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        let map = accounts.into_iter().map(|a| (a.id.clone(), a)).collect();
        Self {
            accounts: Arc::new(RwLock::new(map)),
        }
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn store(&self, account: Account) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        accounts.insert(account.id.clone(), account);
        Ok(())
    }

    async fn get(&self, id: &AccountId) -> Result<Option<Account>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<Account>> {
        let accounts = self.accounts.read().await;
        let mut all: Vec<Account> = accounts.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }

    async fn debit(&self, id: &AccountId, amount: Balance) -> Result<Account> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .get_mut(id)
            .ok_or_else(|| TransferError::AccountNotFound(id.clone()))?;
        account.debit(amount)?;
        Ok(account.clone())
    }

    async fn credit(&self, id: &AccountId, amount: Amount) -> Result<Account> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .get_mut(id)
            .ok_or_else(|| TransferError::AccountNotFound(id.clone()))?;
        account.credit(amount)?;
        Ok(account.clone())
    }
}

/// A thread-safe in-memory store for transactions.
///
/// Uses `Arc<RwLock<HashMap<TransactionId, Transaction>>>` for shared concurrent access
/// and an atomic counter for id allocation.
#[derive(Clone)]
pub struct InMemoryTransactionStore {
    transactions: Arc<RwLock<HashMap<TransactionId, Transaction>>>,
    next_id: Arc<AtomicU32>,
}

impl Default for InMemoryTransactionStore {
    fn default() -> Self {
        Self {
            transactions: Arc::default(),
            next_id: Arc::new(AtomicU32::new(1)),
        }
    }
}

impl InMemoryTransactionStore {
    /// Creates a new, empty in-memory transaction store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn next_id(&self) -> Result<TransactionId> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if id == u32::MAX {
            return Err(TransferError::ValidationError(
                "Transaction id space exhausted".to_string(),
            ));
        }
        Ok(TransactionId::new(id))
    }

    async fn store(&self, tx: Transaction) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        transactions.insert(tx.id(), tx);
        Ok(())
    }

    async fn get(&self, id: TransactionId) -> Result<Option<Transaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions.get(&id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<Transaction>> {
        let transactions = self.transactions.read().await;
        let mut all: Vec<Transaction> = transactions.values().cloned().collect();
        all.sort_by_key(|tx| tx.id());
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::AccountId;
    use crate::domain::money::Amount;
    use crate::domain::time::Timestamp;
    use crate::domain::transaction::{
        CountryCode, Currency, Recipient, TransactionKind, TransferRail, TransferTerms,
    };
    use rust_decimal_macros::dec;

    fn checking(balance: rust_decimal::Decimal) -> Account {
        Account::new("checking", "Everyday Checking", Balance::new(balance))
    }

    #[tokio::test]
    async fn test_in_memory_account_store() {
        let store = InMemoryAccountStore::new();
        let account = checking(dec!(100.0));

        store.store(account.clone()).await.unwrap();
        let retrieved = store.get(&AccountId::new("checking")).await.unwrap().unwrap();
        assert_eq!(retrieved, account);

        assert!(store.get(&AccountId::new("savings")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_in_memory_account_store_get_all_sorted() {
        let store = InMemoryAccountStore::with_accounts([
            Account::new("savings", "Savings", Balance::ZERO),
            checking(dec!(1)),
        ]);

        let all = store.get_all().await.unwrap();
        let ids: Vec<&str> = all.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["checking", "savings"]);
    }

    #[tokio::test]
    async fn test_debit_is_all_or_nothing() {
        let store = InMemoryAccountStore::with_accounts([checking(dec!(10))]);
        let id = AccountId::new("checking");

        let result = store.debit(&id, Balance::new(dec!(150))).await;
        assert!(matches!(result, Err(TransferError::InsufficientFunds { .. })));
        assert_eq!(store.get(&id).await.unwrap().unwrap().balance, Balance::new(dec!(10)));

        let after = store.debit(&id, Balance::new(dec!(4))).await.unwrap();
        assert_eq!(after.balance, Balance::new(dec!(6)));
    }

    #[tokio::test]
    async fn test_debit_unknown_account() {
        let store = InMemoryAccountStore::new();
        let result = store.debit(&AccountId::new("ghost"), Balance::new(dec!(1))).await;
        assert!(matches!(result, Err(TransferError::AccountNotFound(_))));
    }

    #[tokio::test]
    async fn test_credit() {
        let store = InMemoryAccountStore::with_accounts([checking(dec!(10))]);
        let after = store
            .credit(&AccountId::new("checking"), Amount::new(dec!(2.5)).unwrap())
            .await
            .unwrap();
        assert_eq!(after.balance, Balance::new(dec!(12.5)));
    }

    #[tokio::test]
    async fn test_in_memory_transaction_store() {
        let store = InMemoryTransactionStore::new();
        let id = store.next_id().await.unwrap();
        assert_eq!(id, TransactionId::new(1));
        assert_eq!(store.next_id().await.unwrap(), TransactionId::new(2));

        let terms = TransferTerms {
            kind: TransactionKind::Credit,
            rail: TransferRail::Internal,
            source_account: AccountId::new("checking"),
            recipient: Recipient::new("self", "Me", CountryCode::us()),
            send_amount: Amount::new(dec!(100.0)).unwrap(),
            fee: Balance::ZERO,
            exchange_rate: dec!(1),
            receive_amount: dec!(100.0),
            receive_currency: Currency::usd(),
            flagged: false,
            description: "payroll".to_string(),
            related: None,
        };
        let tx = Transaction::settled(id, terms, Timestamp::EPOCH);

        store.store(tx.clone()).await.unwrap();
        let retrieved = store.get(id).await.unwrap().unwrap();
        assert_eq!(retrieved, tx);
        assert_eq!(store.get_all().await.unwrap().len(), 1);
    }
}
