use crate::application::transfer::TransferRequest;
use crate::domain::account::AccountId;
use crate::domain::money::Amount;
use crate::domain::transaction::{CountryCode, Currency, Recipient, TransferRail};
use crate::error::{Result, TransferError};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;
use std::str::FromStr;

/// One row of the transfer request file.
///
/// `account, recipient, name, country, currency, amount, rail[, description]`
#[derive(Debug, Deserialize)]
struct TransferRow {
    account: AccountId,
    recipient: String,
    name: String,
    country: CountryCode,
    currency: Currency,
    // Parsed from text so the written scale ("500.00") survives.
    amount: String,
    rail: TransferRail,
    #[serde(default)]
    description: String,
}

impl TryFrom<TransferRow> for TransferRequest {
    type Error = TransferError;

    fn try_from(row: TransferRow) -> Result<Self> {
        let amount = Decimal::from_str(&row.amount).map_err(|e| {
            TransferError::ValidationError(format!("Invalid amount {:?}: {e}", row.amount))
        })?;
        Ok(Self {
            source_account: row.account,
            recipient: Recipient::new(row.recipient, row.name, row.country),
            amount: Amount::new(amount)?,
            currency: row.currency,
            rail: row.rail,
            description: row.description,
        })
    }
}

/// Reads transfer requests from a CSV source.
///
/// This reader wraps `csv::Reader` and provides an iterator over `Result<TransferRequest>`.
/// It handles whitespace trimming and flexible record lengths automatically.
pub struct TransferRequestReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> TransferRequestReader<R> {
    /// Creates a new `TransferRequestReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and deserializes requests.
    pub fn requests(self) -> impl Iterator<Item = Result<TransferRequest>> {
        self.reader
            .into_deserialize::<TransferRow>()
            .map(|result| result.map_err(TransferError::from).and_then(TransferRequest::try_from))
    }
}
