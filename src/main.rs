use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use transfer_sim::application::lifecycle::LifecycleEngine;
use transfer_sim::application::transfer::TransferService;
use transfer_sim::config::Config;
use transfer_sim::domain::account::AccountId;
use transfer_sim::domain::ports::{AccountStoreRef, Scheduler, TransactionStore, TransactionStoreRef};
use transfer_sim::domain::time::Clock;
use transfer_sim::domain::transaction::{Transaction, TransactionStatus};
use transfer_sim::infrastructure::in_memory::{InMemoryAccountStore, InMemoryTransactionStore};
use transfer_sim::infrastructure::tokio_scheduler::{TokioClock, TokioScheduler};
use transfer_sim::infrastructure::virtual_clock::VirtualClock;
use transfer_sim::interfaces::csv::request_reader::TransferRequestReader;
use transfer_sim::interfaces::csv::transaction_writer::{TransactionWriter, write_json_lines};
use transfer_sim::logging::{LogFormat, init_logging};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input transfer requests CSV file
    input: PathBuf,

    /// TOML configuration (timings, compliance rules, fees, rates, accounts)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Clearance code to enter for every transfer held for compliance
    #[arg(long)]
    clearance_code: Option<String>,

    /// Pay the compliance fee of held transfers from this account
    #[arg(long, conflicts_with = "clearance_code")]
    pay_fees_from: Option<String>,

    /// Print transactions as JSON lines instead of CSV
    #[arg(long)]
    json: bool,

    /// Wait on the wall clock instead of fast-forwarding virtual time
    #[arg(long)]
    realtime: bool,

    #[arg(long, value_enum, default_value_t = LogFormat::Human)]
    log_format: LogFormat,

    /// Log filter, e.g. "info" or "warn,transfer_sim=debug". RUST_LOG wins.
    #[arg(long, default_value = "warn")]
    log_level: String,
}

/// How pending lifecycle timers are brought to completion.
enum Driver {
    Virtual(Arc<VirtualClock>),
    Realtime,
}

impl Driver {
    async fn settle(&self, engine: &LifecycleEngine) {
        match self {
            Driver::Virtual(clock) => {
                clock.run_until_idle().await;
            }
            Driver::Realtime => {
                while engine.pending_timers().await > 0 {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format, &cli.log_level);

    let config = match &cli.config {
        Some(path) => Config::load(path).into_diagnostic()?,
        None => Config::from_env().into_diagnostic()?,
    };

    let accounts: AccountStoreRef =
        Arc::new(InMemoryAccountStore::with_accounts(config.opening_accounts()));
    let transactions: TransactionStoreRef = Arc::new(InMemoryTransactionStore::new());

    let (driver, scheduler, clock) = if cli.realtime {
        let scheduler: Arc<dyn Scheduler> = Arc::new(TokioScheduler::current());
        let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
        (Driver::Realtime, scheduler, clock)
    } else {
        let virtual_clock = Arc::new(VirtualClock::new());
        let scheduler: Arc<dyn Scheduler> = virtual_clock.clone();
        let clock: Arc<dyn Clock> = virtual_clock.clone();
        (Driver::Virtual(virtual_clock), scheduler, clock)
    };

    let engine = LifecycleEngine::new(
        Arc::clone(&transactions),
        Arc::clone(&accounts),
        scheduler,
        Arc::clone(&clock),
        config.engine_settings().into_diagnostic()?,
    );
    let service = TransferService::new(Arc::clone(&accounts), Arc::clone(&transactions), clock)
        .with_policy(Arc::new(config.compliance.policy()))
        .with_fees(config.fees.clone())
        .with_rates(config.exchange_rates.clone());

    let file = File::open(&cli.input).into_diagnostic()?;
    let reader = TransferRequestReader::new(file);
    for request in reader.requests() {
        match request {
            Ok(request) => match service.create_transfer(request).await {
                Ok(tx) => {
                    if let Err(e) = engine.start_lifecycle(tx).await {
                        eprintln!("Error starting transfer: {}", e);
                    }
                }
                Err(e) => eprintln!("Error creating transfer: {}", e),
            },
            Err(e) => eprintln!("Error reading transfer: {}", e),
        }
    }

    driver.settle(&engine).await;

    let held: Vec<Transaction> = transactions
        .get_all()
        .await
        .into_diagnostic()?
        .into_iter()
        .filter(|tx| tx.status() == TransactionStatus::FlaggedAwaitingClearance)
        .collect();
    if !held.is_empty() {
        release_held(&engine, &cli, &held).await;
        driver.settle(&engine).await;
    }

    let all = transactions.get_all().await.into_diagnostic()?;
    let stdout = io::stdout();
    if cli.json {
        write_json_lines(stdout.lock(), &all).into_diagnostic()?;
    } else {
        let mut writer = TransactionWriter::new(stdout.lock());
        writer.write_transactions(&all).into_diagnostic()?;
    }

    Ok(())
}

/// Lifts compliance holds using whichever method was requested on the
/// command line. Failures are reported and leave the transfer held.
async fn release_held(engine: &LifecycleEngine, cli: &Cli, held: &[Transaction]) {
    for tx in held {
        let id = tx.id();
        if let Some(code) = &cli.clearance_code {
            if let Err(e) = engine.authorize_with_code(id, code).await {
                eprintln!("Error clearing transfer {}: {}", id, e);
            }
        } else if let Some(account) = &cli.pay_fees_from {
            let paid = match engine.quote_compliance_fee(id).await {
                Ok(fee) => engine
                    .pay_compliance_fee(id, &AccountId::new(account.as_str()), fee)
                    .await
                    .map(|_| ()),
                Err(e) => Err(e),
            };
            if let Err(e) = paid {
                eprintln!("Error paying compliance fee for transfer {}: {}", id, e);
            }
        }
    }
}
