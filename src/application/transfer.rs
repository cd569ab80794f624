use crate::domain::account::AccountId;
use crate::domain::money::{Amount, Balance};
use crate::domain::policy::{ExchangeRates, FeeSchedule, FlaggingPolicy, ThresholdPolicy};
use crate::domain::ports::{AccountStoreRef, TransactionStoreRef};
use crate::domain::time::Clock;
use crate::domain::transaction::{
    CountryCode, Currency, Recipient, Transaction, TransactionKind, TransferRail, TransferTerms,
};
use crate::error::{Result, TransferError};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument};

/// A customer's request to send money.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRequest {
    pub source_account: AccountId,
    pub recipient: Recipient,
    pub amount: Amount,
    /// Currency the recipient is paid in.
    pub currency: Currency,
    pub rail: TransferRail,
    pub description: String,
}

/// Creates transactions: prices them, decides whether they need clearance,
/// and takes the money from the source account.
///
/// The returned record is in `SUBMITTED`; handing it to the lifecycle engine
/// is the caller's job.
pub struct TransferService {
    accounts: AccountStoreRef,
    transactions: TransactionStoreRef,
    clock: Arc<dyn Clock>,
    policy: Arc<dyn FlaggingPolicy>,
    fees: FeeSchedule,
    rates: ExchangeRates,
}

impl TransferService {
    pub fn new(
        accounts: AccountStoreRef,
        transactions: TransactionStoreRef,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            accounts,
            transactions,
            clock,
            policy: Arc::new(ThresholdPolicy::default()),
            fees: FeeSchedule::default(),
            rates: ExchangeRates::default(),
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn FlaggingPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_fees(mut self, fees: FeeSchedule) -> Self {
        self.fees = fees;
        self
    }

    pub fn with_rates(mut self, rates: ExchangeRates) -> Self {
        self.rates = rates;
        self
    }

    /// Creates a transfer, debiting `amount + fee` from the source account.
    ///
    /// Nothing is debited or recorded if pricing fails or funds are short.
    #[instrument(skip_all, fields(account = %request.source_account, amount = %request.amount))]
    pub async fn create_transfer(&self, request: TransferRequest) -> Result<Transaction> {
        if request.rail == TransferRail::Internal {
            return Err(TransferError::ValidationError(
                "Internal rail is reserved for bank movements".to_string(),
            ));
        }

        let (exchange_rate, receive_amount) = self.rates.convert(request.amount, &request.currency)?;
        let fee = self.fees.fee_for(request.rail, &request.recipient);
        let flagged = self
            .policy
            .requires_clearance(request.amount, &request.recipient, request.rail);

        let total = Balance::from(request.amount).try_add(fee)?;
        self.accounts.debit(&request.source_account, total).await?;

        let id = self.transactions.next_id().await?;
        let terms = TransferTerms {
            kind: TransactionKind::Debit,
            rail: request.rail,
            source_account: request.source_account,
            recipient: request.recipient,
            send_amount: request.amount,
            fee,
            exchange_rate,
            receive_amount,
            receive_currency: request.currency,
            flagged,
            description: request.description,
            related: None,
        };
        let tx = Transaction::submitted(id, terms, self.clock.now());
        self.transactions.store(tx.clone()).await?;

        info!(tx = %id, fee = %fee, flagged, "transfer created");
        Ok(tx)
    }

    /// Credits `amount` to `account` and records it as an already-settled
    /// incoming transaction.
    #[instrument(skip(self, description))]
    pub async fn record_deposit(
        &self,
        account: &AccountId,
        amount: Amount,
        description: &str,
    ) -> Result<Transaction> {
        let credited = self.accounts.credit(account, amount).await?;

        let id = self.transactions.next_id().await?;
        let terms = TransferTerms {
            kind: TransactionKind::Credit,
            rail: TransferRail::Internal,
            source_account: account.clone(),
            recipient: Recipient::new(credited.id.as_str(), credited.name, CountryCode::us()),
            send_amount: amount,
            fee: Balance::ZERO,
            exchange_rate: Decimal::ONE,
            receive_amount: amount.value(),
            receive_currency: Currency::usd(),
            flagged: false,
            description: description.to_string(),
            related: None,
        };
        let tx = Transaction::settled(id, terms, self.clock.now());
        self.transactions.store(tx.clone()).await?;

        info!(tx = %id, "deposit recorded");
        Ok(tx)
    }
}
