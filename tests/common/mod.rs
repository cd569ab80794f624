#![allow(dead_code)]

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use transfer_sim::application::lifecycle::{EngineSettings, LifecycleEngine, LifecycleStart};
use transfer_sim::application::transfer::{TransferRequest, TransferService};
use transfer_sim::domain::account::{Account, AccountId};
use transfer_sim::domain::money::{Amount, Balance};
use transfer_sim::domain::ports::{AccountStore, TransactionStore};
use transfer_sim::domain::transaction::{
    CountryCode, Currency, Recipient, Transaction, TransactionId, TransactionStatus, TransferRail,
};
use transfer_sim::infrastructure::in_memory::{InMemoryAccountStore, InMemoryTransactionStore};
use transfer_sim::infrastructure::virtual_clock::VirtualClock;

pub const CHECKING: &str = "checking";
pub const SAVINGS: &str = "savings";

/// Engine, service and stores wired to one virtual clock.
pub struct Harness {
    pub clock: Arc<VirtualClock>,
    pub accounts: InMemoryAccountStore,
    pub transactions: InMemoryTransactionStore,
    pub engine: LifecycleEngine,
    pub service: TransferService,
}

impl Harness {
    /// Checking with 25,000 and savings with 10.
    pub fn new() -> Self {
        Self::with_balances(dec!(25000), dec!(10))
    }

    pub fn with_balances(checking: Decimal, savings: Decimal) -> Self {
        let clock = Arc::new(VirtualClock::new());
        let accounts = InMemoryAccountStore::with_accounts([
            Account::new(CHECKING, "Everyday Checking", Balance::new(checking)),
            Account::new(SAVINGS, "High-Yield Savings", Balance::new(savings)),
        ]);
        let transactions = InMemoryTransactionStore::new();
        let engine = LifecycleEngine::new(
            Arc::new(transactions.clone()),
            Arc::new(accounts.clone()),
            clock.clone(),
            clock.clone(),
            EngineSettings::default(),
        );
        let service = TransferService::new(
            Arc::new(accounts.clone()),
            Arc::new(transactions.clone()),
            clock.clone(),
        );
        Self {
            clock,
            accounts,
            transactions,
            engine,
            service,
        }
    }

    /// Creates a transfer from checking and starts its lifecycle.
    pub async fn send(&self, amount: Decimal, country: &str, currency: &str) -> Transaction {
        let tx = self
            .service
            .create_transfer(request(CHECKING, amount, country, currency))
            .await
            .unwrap();
        assert_eq!(
            self.engine.start_lifecycle(tx.clone()).await.unwrap(),
            LifecycleStart::Scheduled
        );
        tx
    }

    pub async fn advance_secs(&self, secs: u64) {
        self.clock.advance(Duration::from_secs(secs)).await;
    }

    pub async fn stored(&self, id: TransactionId) -> Transaction {
        self.transactions.get(id).await.unwrap().unwrap()
    }

    pub async fn balance(&self, account: &str) -> Balance {
        self.accounts
            .get(&AccountId::new(account))
            .await
            .unwrap()
            .unwrap()
            .balance
    }

    pub async fn transaction_count(&self) -> usize {
        self.transactions.get_all().await.unwrap().len()
    }
}

pub fn request(account: &str, amount: Decimal, country: &str, currency: &str) -> TransferRequest {
    TransferRequest {
        source_account: AccountId::new(account),
        recipient: Recipient::new("r-1", "Ada Lovelace", CountryCode::new(country).unwrap()),
        amount: Amount::new(amount).unwrap(),
        currency: Currency::new(currency).unwrap(),
        rail: TransferRail::Standard,
        description: String::new(),
    }
}

/// Milliseconds at which `status` was entered, if ever.
pub fn entered_ms(tx: &Transaction, status: TransactionStatus) -> Option<u64> {
    tx.timeline().entered_at(status).map(|at| at.as_millis())
}
