use crate::domain::account::AccountId;
use crate::domain::clearance::ClearanceGate;
use crate::domain::money::{Amount, Balance};
use crate::domain::policy::ComplianceFeeRate;
use crate::domain::ports::{AccountStoreRef, Scheduler, TimerHandle, TransactionStoreRef};
use crate::domain::time::{Clock, Timestamp};
use crate::domain::transaction::{
    CountryCode, Currency, Recipient, Transaction, TransactionId, TransactionKind,
    TransactionStatus, TransferRail, TransferTerms,
};
use crate::error::{Result, TransferError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, error, info, instrument, warn};

const EVENT_CAPACITY: usize = 1024;

/// Offsets, from the moment a lifecycle starts, at which each stage is entered.
///
/// `release_after_ms` is measured from the moment a flagged transfer is cleared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleTimings {
    pub processing_after_ms: u64,
    pub converting_after_ms: u64,
    pub in_transit_after_ms: u64,
    pub arrival_after_ms: u64,
    pub flag_after_ms: u64,
    pub release_after_ms: u64,
}

impl Default for LifecycleTimings {
    fn default() -> Self {
        Self {
            processing_after_ms: 3_000,
            converting_after_ms: 6_000,
            in_transit_after_ms: 9_000,
            arrival_after_ms: 12_000,
            flag_after_ms: 15_000,
            release_after_ms: 3_000,
        }
    }
}

impl LifecycleTimings {
    /// Every stage must come strictly after the previous one on its path.
    pub fn validate(&self) -> Result<()> {
        let progress = [
            self.processing_after_ms,
            self.converting_after_ms,
            self.in_transit_after_ms,
        ];
        let increasing = progress.windows(2).all(|w| w[0] < w[1])
            && self.in_transit_after_ms < self.arrival_after_ms
            && self.in_transit_after_ms < self.flag_after_ms;
        if increasing {
            Ok(())
        } else {
            Err(TransferError::ValidationError(
                "Lifecycle stage offsets must be strictly increasing".to_string(),
            ))
        }
    }

    fn plan(&self, flagged: bool) -> [(TransactionStatus, Duration); 4] {
        let last = if flagged {
            (
                TransactionStatus::FlaggedAwaitingClearance,
                self.flag_after_ms,
            )
        } else {
            (TransactionStatus::FundsArrived, self.arrival_after_ms)
        };
        [
            (TransactionStatus::Processing, self.processing_after_ms),
            (TransactionStatus::Converting, self.converting_after_ms),
            (TransactionStatus::InTransit, self.in_transit_after_ms),
            last,
        ]
        .map(|(status, ms)| (status, Duration::from_millis(ms)))
    }

    pub fn release_delay(&self) -> Duration {
        Duration::from_millis(self.release_after_ms)
    }
}

/// Everything the engine needs besides its collaborators.
#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    pub timings: LifecycleTimings,
    pub clearance: ClearanceGate,
    pub compliance_fee: ComplianceFeeRate,
}

/// Outcome of [`LifecycleEngine::start_lifecycle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStart {
    /// Timers were set for the remaining stages.
    Scheduled,
    /// A different instance with the same id was running; its timers were replaced.
    Rescheduled,
    /// This instance is already being driven. Nothing changed.
    AlreadyRunning,
    /// Waiting for clearance; nothing to schedule until `authorize`.
    Suspended,
    /// Funds already arrived.
    AlreadySettled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    /// Moved to `CLEARED`; arrival is scheduled.
    Cleared,
    /// Already cleared or settled. Nothing changed.
    AlreadyCleared,
    /// The transfer was never flagged. Nothing changed.
    NotRequired,
}

/// Result of a successful compliance-fee payment.
#[derive(Debug, Clone, PartialEq)]
pub struct FeePayment {
    /// The settled record of the fee debit.
    pub fee_transaction: TransactionId,
    pub fee: Amount,
    pub remaining_balance: Balance,
}

/// Emitted every time a status is recorded, for whatever renders it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusChange {
    pub id: TransactionId,
    pub status: TransactionStatus,
    pub at: Timestamp,
}

/// Drives transactions from `SUBMITTED` to `FUNDS_ARRIVED` on a [`Scheduler`].
///
/// Flagged transactions stop at `FLAGGED_AWAITING_CLEARANCE` until
/// [`authorize`](Self::authorize) (directly, via a clearance code, or after a
/// compliance fee is paid) releases them.
///
/// Every mutation, including timer firings, runs under a single writer lock,
/// so two operations never race on the same transaction. The handle is cheap
/// to clone; pending timers are cancelled when the last clone is dropped.
#[derive(Clone)]
pub struct LifecycleEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    transactions: TransactionStoreRef,
    accounts: AccountStoreRef,
    scheduler: Arc<dyn Scheduler>,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
    timers: Mutex<Timers>,
    events: broadcast::Sender<StatusChange>,
}

#[derive(Default)]
struct Timers {
    next_generation: u64,
    active: HashMap<TransactionId, ActiveSchedule>,
}

/// Timers currently set for one transaction instance.
struct ActiveSchedule {
    generation: u64,
    instance: Transaction,
    pending: Vec<(TransactionStatus, TimerHandle)>,
}

impl Timers {
    fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// Cancels and forgets the schedule for `id`. Returns whether one existed.
    fn clear(&mut self, id: TransactionId, scheduler: &dyn Scheduler) -> bool {
        match self.active.remove(&id) {
            Some(schedule) => {
                for (_, handle) in schedule.pending {
                    scheduler.cancel(handle);
                }
                true
            }
            None => false,
        }
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        let timers = self.timers.get_mut();
        for (_, schedule) in timers.active.drain() {
            for (_, handle) in schedule.pending {
                self.scheduler.cancel(handle);
            }
        }
    }
}

impl LifecycleEngine {
    pub fn new(
        transactions: TransactionStoreRef,
        accounts: AccountStoreRef,
        scheduler: Arc<dyn Scheduler>,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(EngineInner {
                transactions,
                accounts,
                scheduler,
                clock,
                settings,
                timers: Mutex::new(Timers::default()),
                events,
            }),
        }
    }

    /// Receives a [`StatusChange`] for every status recorded from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.inner.events.subscribe()
    }

    /// Starts (or resumes) driving `tx` through its lifecycle.
    ///
    /// Calling this again with the same instance does nothing. Passing a
    /// replacement instance with the same id cancels the old timers and
    /// schedules the remaining stages afresh from now. A settled record is
    /// never replaced.
    #[instrument(skip_all, fields(tx = %tx.id()))]
    pub async fn start_lifecycle(&self, tx: Transaction) -> Result<LifecycleStart> {
        let mut timers = self.inner.timers.lock().await;
        let id = tx.id();

        let stored = self.inner.transactions.get(id).await?;
        if let Some(stored) = &stored
            && stored.status().is_terminal()
        {
            timers.clear(id, &*self.inner.scheduler);
            debug!(status = %stored.status(), "already settled");
            return Ok(LifecycleStart::AlreadySettled);
        }

        let current = match stored {
            Some(stored) if stored.same_instance(&tx) => stored,
            _ => anchored(tx, self.inner.clock.now())?,
        };

        if current.status().is_terminal() {
            timers.clear(id, &*self.inner.scheduler);
            self.inner.transactions.store(current).await?;
            return Ok(LifecycleStart::AlreadySettled);
        }

        if let Some(active) = timers.active.get(&id)
            && active.instance.same_instance(&current)
        {
            return Ok(
                if current.status() == TransactionStatus::FlaggedAwaitingClearance {
                    LifecycleStart::Suspended
                } else {
                    LifecycleStart::AlreadyRunning
                },
            );
        }

        let replaced = timers.clear(id, &*self.inner.scheduler);
        self.inner.transactions.store(current.clone()).await?;

        let generation = timers.next_generation();
        let pending = self.schedule_remaining(&current, generation);
        let status = current.status();
        let at = current
            .timeline()
            .entered_at(status)
            .unwrap_or_else(|| current.created_at());
        info!(status = %status, flagged = current.is_flagged(), timers = pending.len(), "lifecycle started");
        timers.active.insert(
            id,
            ActiveSchedule {
                generation,
                instance: current,
                pending,
            },
        );
        self.emit(StatusChange { id, status, at });

        Ok(match status {
            TransactionStatus::FlaggedAwaitingClearance => LifecycleStart::Suspended,
            _ if replaced => LifecycleStart::Rescheduled,
            _ => LifecycleStart::Scheduled,
        })
    }

    /// Releases a flagged transaction: `CLEARED` now, `FUNDS_ARRIVED` after
    /// the release delay. Idempotent.
    #[instrument(skip(self))]
    pub async fn authorize(&self, id: TransactionId) -> Result<Authorization> {
        let mut timers = self.inner.timers.lock().await;
        self.authorize_locked(&mut timers, id).await
    }

    /// [`authorize`](Self::authorize) gated on the configured clearance code.
    ///
    /// A wrong code changes nothing; the caller may retry.
    #[instrument(skip(self, code))]
    pub async fn authorize_with_code(&self, id: TransactionId, code: &str) -> Result<Authorization> {
        let mut timers = self.inner.timers.lock().await;
        self.load(id).await?;
        if let Err(e) = self.inner.settings.clearance.verify(code) {
            warn!("clearance code rejected");
            return Err(e);
        }
        self.authorize_locked(&mut timers, id).await
    }

    /// The fee that releases `id` without a clearance code.
    pub async fn quote_compliance_fee(&self, id: TransactionId) -> Result<Amount> {
        let tx = self.load(id).await?;
        self.inner
            .settings
            .compliance_fee
            .quote(tx.terms().send_amount)
    }

    /// Pays the compliance fee for a flagged transaction from `source`, then
    /// authorizes it.
    ///
    /// Either the fee is debited, exactly one settled fee record is created and
    /// the transaction is cleared, or an error is returned and the balance is
    /// left as it was. If recording fails after the debit, the fee is credited
    /// back.
    #[instrument(skip(self, fee), fields(fee = %fee))]
    pub async fn pay_compliance_fee(
        &self,
        id: TransactionId,
        source: &AccountId,
        fee: Amount,
    ) -> Result<FeePayment> {
        let mut timers = self.inner.timers.lock().await;
        let tx = self.load(id).await?;

        if !tx.is_flagged()
            || matches!(
                tx.status(),
                TransactionStatus::Cleared | TransactionStatus::FundsArrived
            )
        {
            return Err(TransferError::InvalidState {
                id,
                status: tx.status(),
                action: "pay a compliance fee for",
            });
        }

        let owed = self
            .inner
            .settings
            .compliance_fee
            .quote(tx.terms().send_amount)?;
        if fee < owed {
            return Err(TransferError::ValidationError(format!(
                "Compliance fee of {owed} required, {fee} offered"
            )));
        }

        let account = match self.inner.accounts.debit(source, fee.into()).await {
            Ok(account) => account,
            Err(e) => {
                warn!(account = %source, error = %e, "compliance fee payment failed");
                return Err(e);
            }
        };

        let fee_id = match self.settle_fee(&mut timers, id, source, fee).await {
            Ok(fee_id) => fee_id,
            Err(e) => {
                error!(account = %source, error = %e, "compliance fee not recorded, refunding");
                if let Err(refund) = self.inner.accounts.credit(source, fee).await {
                    error!(account = %source, error = %refund, "compliance fee refund failed");
                }
                return Err(e);
            }
        };

        Ok(FeePayment {
            fee_transaction: fee_id,
            fee,
            remaining_balance: account.balance,
        })
    }

    async fn settle_fee(
        &self,
        timers: &mut Timers,
        id: TransactionId,
        source: &AccountId,
        fee: Amount,
    ) -> Result<TransactionId> {
        let fee_id = self.inner.transactions.next_id().await?;
        let now = self.inner.clock.now();
        let receipt = Transaction::settled(fee_id, fee_terms(id, source, fee), now);
        self.inner.transactions.store(receipt).await?;
        self.emit(StatusChange {
            id: fee_id,
            status: TransactionStatus::Submitted,
            at: now,
        });
        self.emit(StatusChange {
            id: fee_id,
            status: TransactionStatus::FundsArrived,
            at: now,
        });
        info!(fee_tx = %fee_id, account = %source, "compliance fee paid");

        self.authorize_locked(timers, id).await?;
        Ok(fee_id)
    }

    pub async fn get_status(&self, id: TransactionId) -> Result<TransactionStatus> {
        Ok(self.load(id).await?.status())
    }

    pub async fn get_transaction(&self, id: TransactionId) -> Result<Transaction> {
        self.load(id).await
    }

    /// Timers set and not yet fired, across all transactions.
    pub async fn pending_timers(&self) -> usize {
        let timers = self.inner.timers.lock().await;
        timers.active.values().map(|s| s.pending.len()).sum()
    }

    /// Cancels every pending timer, e.g. when the owning list is discarded.
    ///
    /// Returns the number of transactions whose schedules were dropped.
    pub async fn cancel_all(&self) -> usize {
        let mut timers = self.inner.timers.lock().await;
        let ids: Vec<TransactionId> = timers.active.keys().copied().collect();
        for id in &ids {
            timers.clear(*id, &*self.inner.scheduler);
        }
        info!(cancelled = ids.len(), "all lifecycles cancelled");
        ids.len()
    }

    async fn authorize_locked(&self, timers: &mut Timers, id: TransactionId) -> Result<Authorization> {
        let mut tx = self.load(id).await?;

        if matches!(
            tx.status(),
            TransactionStatus::Cleared | TransactionStatus::FundsArrived
        ) {
            debug!(tx = %id, status = %tx.status(), "already cleared");
            return Ok(Authorization::AlreadyCleared);
        }
        if !tx.is_flagged() {
            debug!(tx = %id, "clearance not required");
            return Ok(Authorization::NotRequired);
        }

        // Pending cosmetic stages are moot once the transfer is released.
        timers.clear(id, &*self.inner.scheduler);

        if tx.status() != TransactionStatus::FlaggedAwaitingClearance {
            self.record(&mut tx, TransactionStatus::FlaggedAwaitingClearance)
                .await?;
        }
        self.record(&mut tx, TransactionStatus::Cleared).await?;

        let generation = timers.next_generation();
        let handle = self.schedule_step(
            id,
            generation,
            TransactionStatus::FundsArrived,
            self.inner.settings.timings.release_delay(),
        );
        timers.active.insert(
            id,
            ActiveSchedule {
                generation,
                instance: tx,
                pending: vec![(TransactionStatus::FundsArrived, handle)],
            },
        );
        info!(tx = %id, "transaction cleared");
        Ok(Authorization::Cleared)
    }

    fn schedule_remaining(
        &self,
        tx: &Transaction,
        generation: u64,
    ) -> Vec<(TransactionStatus, TimerHandle)> {
        let id = tx.id();
        let steps: Vec<(TransactionStatus, Duration)> = match tx.status() {
            TransactionStatus::Cleared => vec![(
                TransactionStatus::FundsArrived,
                self.inner.settings.timings.release_delay(),
            )],
            current if current.is_in_progress() => self
                .inner
                .settings
                .timings
                .plan(tx.is_flagged())
                .into_iter()
                .filter(|(status, _)| status.rank() > current.rank())
                .collect(),
            _ => Vec::new(),
        };

        steps
            .into_iter()
            .map(|(status, delay)| (status, self.schedule_step(id, generation, status, delay)))
            .collect()
    }

    fn schedule_step(
        &self,
        id: TransactionId,
        generation: u64,
        status: TransactionStatus,
        delay: Duration,
    ) -> TimerHandle {
        let engine: Weak<EngineInner> = Arc::downgrade(&self.inner);
        self.inner.scheduler.schedule(
            delay,
            Box::pin(async move {
                if let Some(inner) = engine.upgrade() {
                    LifecycleEngine { inner }
                        .on_timer(id, generation, status)
                        .await;
                }
            }),
        )
    }

    async fn on_timer(&self, id: TransactionId, generation: u64, status: TransactionStatus) {
        let mut timers = self.inner.timers.lock().await;

        let Some(active) = timers.active.get_mut(&id) else {
            debug!(tx = %id, status = %status, "timer for inactive transaction ignored");
            return;
        };
        if active.generation != generation {
            debug!(tx = %id, status = %status, "stale timer ignored");
            return;
        }
        active.pending.retain(|(pending, _)| *pending != status);

        let mut tx = match self.load(id).await {
            Ok(tx) => tx,
            Err(e) => {
                error!(tx = %id, error = %e, "timer fired for missing transaction");
                timers.clear(id, &*self.inner.scheduler);
                return;
            }
        };

        match self.record(&mut tx, status).await {
            Ok(true) if status.is_terminal() => {
                timers.clear(id, &*self.inner.scheduler);
            }
            Ok(true) if status == TransactionStatus::FlaggedAwaitingClearance => {
                warn!(tx = %id, "transaction held for compliance clearance");
            }
            Ok(true) => {}
            Ok(false) => {
                debug!(tx = %id, from = %tx.status(), to = %status, "transition not allowed, skipped");
            }
            Err(e) => error!(tx = %id, error = %e, "failed to record status"),
        }
    }

    /// Applies and persists one transition. Returns `false` if the edge is
    /// not legal from the current status.
    async fn record(&self, tx: &mut Transaction, status: TransactionStatus) -> Result<bool> {
        let at = self.inner.clock.now();
        if !tx.transition(status, at) {
            return Ok(false);
        }
        self.inner.transactions.store(tx.clone()).await?;
        info!(tx = %tx.id(), status = %status, at = %at, "status changed");
        self.emit(StatusChange {
            id: tx.id(),
            status,
            at,
        });
        Ok(true)
    }

    async fn load(&self, id: TransactionId) -> Result<Transaction> {
        match self.inner.transactions.get(id).await? {
            Some(tx) => Ok(tx),
            None => {
                error!(tx = %id, "unknown transaction");
                Err(TransferError::NotFound(id))
            }
        }
    }

    fn emit(&self, change: StatusChange) {
        // No subscribers is fine.
        let _ = self.inner.events.send(change);
    }
}

/// Pins an incoming record to the engine's clock. A fresh `SUBMITTED` record
/// stamped in the future is re-stamped at `now`; a progressed record with
/// future entries is rejected.
fn anchored(tx: Transaction, now: Timestamp) -> Result<Transaction> {
    let latest = tx
        .timeline()
        .entries()
        .last()
        .map_or(tx.created_at(), |entry| entry.at);
    if latest <= now {
        return Ok(tx);
    }
    if tx.status() == TransactionStatus::Submitted {
        debug!(tx = %tx.id(), submitted = %latest, now = %now, "re-stamping submission");
        return Ok(Transaction::submitted(tx.id(), tx.terms().clone(), now));
    }
    Err(TransferError::ValidationError(format!(
        "Transaction {} has a status stamped at {latest}, after {now}",
        tx.id()
    )))
}

fn fee_terms(for_tx: TransactionId, source: &AccountId, fee: Amount) -> TransferTerms {
    TransferTerms {
        kind: TransactionKind::Debit,
        rail: TransferRail::Internal,
        source_account: source.clone(),
        recipient: Recipient::new("compliance", "Compliance Department", CountryCode::us()),
        send_amount: fee,
        fee: Balance::ZERO,
        exchange_rate: Decimal::ONE,
        receive_amount: fee.value(),
        receive_currency: Currency::usd(),
        flagged: false,
        description: format!("Compliance fee for transaction {for_tx}"),
        related: Some(for_tx),
    }
}
