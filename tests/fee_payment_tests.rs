mod common;

use async_trait::async_trait;
use common::{CHECKING, Harness, SAVINGS, entered_ms};
use rust_decimal_macros::dec;
use std::sync::Arc;
use transfer_sim::application::lifecycle::{EngineSettings, LifecycleEngine};
use transfer_sim::application::transfer::TransferService;
use transfer_sim::domain::account::{Account, AccountId};
use transfer_sim::domain::money::{Amount, Balance};
use transfer_sim::domain::ports::{AccountStore, TransactionStore};
use transfer_sim::domain::transaction::{
    Transaction, TransactionId, TransactionKind, TransactionStatus::*, TransferRail,
};
use transfer_sim::error::TransferError;
use transfer_sim::infrastructure::in_memory::{InMemoryAccountStore, InMemoryTransactionStore};
use transfer_sim::infrastructure::virtual_clock::VirtualClock;

fn amount(value: rust_decimal::Decimal) -> Amount {
    Amount::new(value).unwrap()
}

#[tokio::test]
async fn test_fee_is_ten_percent_of_send_amount() {
    let h = Harness::new();
    let tx = h.send(dec!(1500), "GB", "GBP").await;
    assert_eq!(
        h.engine.quote_compliance_fee(tx.id()).await.unwrap(),
        amount(dec!(150))
    );
}

#[tokio::test]
async fn test_insufficient_funds_changes_nothing() {
    let h = Harness::new();
    let tx = h.send(dec!(1500), "GB", "GBP").await;
    h.clock.run_until_idle().await;

    let before = h.stored(tx.id()).await;
    let count = h.transaction_count().await;
    assert_eq!(h.balance(SAVINGS).await, Balance::new(dec!(10)));

    let result = h
        .engine
        .pay_compliance_fee(tx.id(), &AccountId::new(SAVINGS), amount(dec!(150)))
        .await;

    match result {
        Err(TransferError::InsufficientFunds {
            account,
            available,
            required,
        }) => {
            assert_eq!(account, AccountId::new(SAVINGS));
            assert_eq!(available, Balance::new(dec!(10)));
            assert_eq!(required, Balance::new(dec!(150)));
        }
        other => panic!("expected insufficient funds, got {other:?}"),
    }
    assert_eq!(h.balance(SAVINGS).await, Balance::new(dec!(10)));
    assert_eq!(h.transaction_count().await, count);
    assert_eq!(h.stored(tx.id()).await, before);
    assert_eq!(h.engine.pending_timers().await, 0);
    assert_eq!(h.clock.pending(), 0);
}

#[tokio::test]
async fn test_fee_payment_debits_and_clears() {
    let h = Harness::new();
    let tx = h.send(dec!(1500), "GB", "GBP").await;
    h.clock.run_until_idle().await;

    // 25,000 - 1,500 - 4.99 international fee.
    assert_eq!(h.balance(CHECKING).await, Balance::new(dec!(23495.01)));

    let payment = h
        .engine
        .pay_compliance_fee(tx.id(), &AccountId::new(CHECKING), amount(dec!(150)))
        .await
        .unwrap();

    assert_eq!(payment.fee, amount(dec!(150)));
    assert_eq!(payment.remaining_balance, Balance::new(dec!(23345.01)));
    assert_eq!(h.balance(CHECKING).await, Balance::new(dec!(23345.01)));
    assert_eq!(h.transaction_count().await, 2);

    let receipt = h.stored(payment.fee_transaction).await;
    assert_eq!(receipt.status(), FundsArrived);
    assert_eq!(receipt.timeline().statuses(), vec![Submitted, FundsArrived]);
    assert_eq!(receipt.terms().kind, TransactionKind::Debit);
    assert_eq!(receipt.terms().rail, TransferRail::Internal);
    assert_eq!(receipt.terms().send_amount, amount(dec!(150)));
    assert_eq!(receipt.terms().related, Some(tx.id()));
    assert!(!receipt.is_flagged());

    assert_eq!(h.engine.get_status(tx.id()).await.unwrap(), Cleared);
    h.clock.run_until_idle().await;
    let done = h.stored(tx.id()).await;
    assert_eq!(entered_ms(&done, Cleared), Some(15_000));
    assert_eq!(entered_ms(&done, FundsArrived), Some(18_000));
}

#[tokio::test]
async fn test_second_payment_is_rejected() {
    let h = Harness::new();
    let tx = h.send(dec!(1500), "GB", "GBP").await;
    h.clock.run_until_idle().await;

    h.engine
        .pay_compliance_fee(tx.id(), &AccountId::new(CHECKING), amount(dec!(150)))
        .await
        .unwrap();
    let balance = h.balance(CHECKING).await;

    let again = h
        .engine
        .pay_compliance_fee(tx.id(), &AccountId::new(CHECKING), amount(dec!(150)))
        .await;
    assert!(matches!(
        again,
        Err(TransferError::InvalidState { status: Cleared, .. })
    ));
    assert_eq!(h.balance(CHECKING).await, balance);
    assert_eq!(h.transaction_count().await, 2);
}

#[tokio::test]
async fn test_unflagged_transfer_needs_no_fee() {
    let h = Harness::new();
    let tx = h.send(dec!(500), "US", "USD").await;
    let balance = h.balance(CHECKING).await;

    let result = h
        .engine
        .pay_compliance_fee(tx.id(), &AccountId::new(CHECKING), amount(dec!(50)))
        .await;
    assert!(matches!(result, Err(TransferError::InvalidState { .. })));
    assert_eq!(h.balance(CHECKING).await, balance);
    assert_eq!(h.transaction_count().await, 1);
}

#[tokio::test]
async fn test_underpayment_is_rejected() {
    let h = Harness::new();
    let tx = h.send(dec!(1500), "GB", "GBP").await;
    h.clock.run_until_idle().await;
    let balance = h.balance(CHECKING).await;

    let result = h
        .engine
        .pay_compliance_fee(tx.id(), &AccountId::new(CHECKING), amount(dec!(149.99)))
        .await;
    assert!(matches!(result, Err(TransferError::ValidationError(_))));
    assert_eq!(h.balance(CHECKING).await, balance);
    assert_eq!(
        h.engine.get_status(tx.id()).await.unwrap(),
        FlaggedAwaitingClearance
    );
}

#[tokio::test]
async fn test_unknown_payer_changes_nothing() {
    let h = Harness::new();
    let tx = h.send(dec!(1500), "GB", "GBP").await;
    h.clock.run_until_idle().await;

    let result = h
        .engine
        .pay_compliance_fee(tx.id(), &AccountId::new("brokerage"), amount(dec!(150)))
        .await;
    assert!(matches!(result, Err(TransferError::AccountNotFound(_))));
    assert_eq!(h.transaction_count().await, 1);
    assert_eq!(
        h.engine.get_status(tx.id()).await.unwrap(),
        FlaggedAwaitingClearance
    );
}

/// Transaction store that refuses to record internal movements.
struct NoInternalRecords(InMemoryTransactionStore);

#[async_trait]
impl TransactionStore for NoInternalRecords {
    async fn next_id(&self) -> transfer_sim::error::Result<TransactionId> {
        self.0.next_id().await
    }

    async fn store(&self, tx: Transaction) -> transfer_sim::error::Result<()> {
        if tx.terms().rail == TransferRail::Internal {
            return Err(std::io::Error::other("ledger is read-only").into());
        }
        self.0.store(tx).await
    }

    async fn get(&self, id: TransactionId) -> transfer_sim::error::Result<Option<Transaction>> {
        self.0.get(id).await
    }

    async fn get_all(&self) -> transfer_sim::error::Result<Vec<Transaction>> {
        self.0.get_all().await
    }
}

#[tokio::test]
async fn test_fee_refunded_when_receipt_cannot_be_stored() {
    let clock = Arc::new(VirtualClock::new());
    let accounts = InMemoryAccountStore::with_accounts([Account::new(
        CHECKING,
        "Everyday Checking",
        Balance::new(dec!(5000)),
    )]);
    let transactions = InMemoryTransactionStore::new();
    let engine = LifecycleEngine::new(
        Arc::new(NoInternalRecords(transactions.clone())),
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

    let tx = service
        .create_transfer(common::request(CHECKING, dec!(1500), "GB", "GBP"))
        .await
        .unwrap();
    engine.start_lifecycle(tx.clone()).await.unwrap();
    clock.run_until_idle().await;
    let held = engine.get_transaction(tx.id()).await.unwrap();
    assert_eq!(held.status(), FlaggedAwaitingClearance);

    let checking = AccountId::new(CHECKING);
    let before = accounts.get(&checking).await.unwrap().unwrap().balance;
    let result = engine
        .pay_compliance_fee(tx.id(), &checking, amount(dec!(150)))
        .await;

    assert!(matches!(result, Err(TransferError::IoError(_))));
    assert_eq!(accounts.get(&checking).await.unwrap().unwrap().balance, before);
    assert_eq!(engine.get_transaction(tx.id()).await.unwrap(), held);
    assert_eq!(transactions.get_all().await.unwrap().len(), 1);
    assert_eq!(engine.pending_timers().await, 0);
}
