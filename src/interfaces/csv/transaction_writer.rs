use crate::domain::money::Balance;
use crate::domain::transaction::{Transaction, TransactionKind, TransactionStatus};
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

const HEADER: [&str; 13] = [
    "id",
    "kind",
    "account",
    "recipient",
    "country",
    "amount",
    "fee",
    "rate",
    "receive_amount",
    "currency",
    "flagged",
    "status",
    "timeline",
];

/// Flat CSV projection of a transaction. The timeline is rendered as
/// `STATUS@millis` pairs joined by `;`.
#[derive(Debug, Serialize)]
struct TransactionRow<'a> {
    id: u32,
    kind: TransactionKind,
    account: &'a str,
    recipient: &'a str,
    country: &'a str,
    amount: Decimal,
    fee: Balance,
    rate: Decimal,
    receive_amount: Decimal,
    currency: &'a str,
    flagged: bool,
    status: TransactionStatus,
    timeline: String,
}

impl<'a> From<&'a Transaction> for TransactionRow<'a> {
    fn from(tx: &'a Transaction) -> Self {
        let terms = tx.terms();
        let timeline = tx
            .timeline()
            .entries()
            .iter()
            .map(|entry| format!("{}@{}", entry.status, entry.at.as_millis()))
            .collect::<Vec<_>>()
            .join(";");
        Self {
            id: tx.id().value(),
            kind: terms.kind,
            account: terms.source_account.as_str(),
            recipient: &terms.recipient.name,
            country: terms.recipient.country.as_str(),
            amount: terms.send_amount.value(),
            fee: terms.fee,
            rate: terms.exchange_rate,
            receive_amount: terms.receive_amount,
            currency: terms.receive_currency.as_str(),
            flagged: terms.flagged,
            status: tx.status(),
            timeline,
        }
    }
}

/// Writes transactions as CSV with a header row.
///
/// The header is written even when there are no transactions.
pub struct TransactionWriter<W: Write> {
    writer: csv::Writer<W>,
    header_written: bool,
}

impl<W: Write> TransactionWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(sink),
            header_written: false,
        }
    }

    pub fn write_transactions<'a>(
        &mut self,
        transactions: impl IntoIterator<Item = &'a Transaction>,
    ) -> Result<()> {
        if !self.header_written {
            self.writer.write_record(HEADER)?;
            self.header_written = true;
        }
        for tx in transactions {
            self.writer.serialize(TransactionRow::from(tx))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

/// Writes one JSON object per transaction per line.
pub fn write_json_lines<'a, W: Write>(
    mut sink: W,
    transactions: impl IntoIterator<Item = &'a Transaction>,
) -> Result<()> {
    for tx in transactions {
        serde_json::to_writer(&mut sink, tx).map_err(std::io::Error::from)?;
        writeln!(sink)?;
    }
    sink.flush()?;
    Ok(())
}
