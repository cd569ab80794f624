//! Pricing and compliance policies applied when a transfer is created.
//!
//! None of this is real compliance logic. The flagging rule is a pluggable
//! predicate so both standard and wire transfers go through the same one.

use super::money::{Amount, Balance};
use super::transaction::{CountryCode, Currency, Recipient, TransferRail};
use crate::error::TransferError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Decides whether a new transfer must pause for compliance clearance.
pub trait FlaggingPolicy: Send + Sync {
    fn requires_clearance(&self, amount: Amount, recipient: &Recipient, rail: TransferRail) -> bool;
}

/// Flags transfers at or above `threshold` sent outside `home_country`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdPolicy {
    pub threshold: Decimal,
    pub home_country: CountryCode,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self {
            threshold: dec!(1000),
            home_country: CountryCode::us(),
        }
    }
}

impl FlaggingPolicy for ThresholdPolicy {
    fn requires_clearance(&self, amount: Amount, recipient: &Recipient, rail: TransferRail) -> bool {
        rail != TransferRail::Internal
            && amount.value() >= self.threshold
            && recipient.country != self.home_country
    }
}

/// Never flags anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFlagging;

impl FlaggingPolicy for NoFlagging {
    fn requires_clearance(&self, _: Amount, _: &Recipient, _: TransferRail) -> bool {
        false
    }
}

/// Flat transfer fees per rail, split by domestic and international.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeSchedule {
    pub home_country: CountryCode,
    pub standard_domestic: Decimal,
    pub standard_international: Decimal,
    pub wire_domestic: Decimal,
    pub wire_international: Decimal,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            home_country: CountryCode::us(),
            standard_domestic: Decimal::ZERO,
            standard_international: dec!(4.99),
            wire_domestic: dec!(25.00),
            wire_international: dec!(45.00),
        }
    }
}

impl FeeSchedule {
    pub fn fee_for(&self, rail: TransferRail, recipient: &Recipient) -> Balance {
        let domestic = recipient.country == self.home_country;
        let fee = match (rail, domestic) {
            (TransferRail::Standard, true) => self.standard_domestic,
            (TransferRail::Standard, false) => self.standard_international,
            (TransferRail::Wire, true) => self.wire_domestic,
            (TransferRail::Wire, false) => self.wire_international,
            (TransferRail::Internal, _) => Decimal::ZERO,
        };
        Balance::new(fee)
    }
}

/// Static conversion rates from the account currency (USD) to payout currencies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExchangeRates(BTreeMap<Currency, Decimal>);

impl Default for ExchangeRates {
    fn default() -> Self {
        let table = [
            ("USD", dec!(1)),
            ("EUR", dec!(0.92)),
            ("GBP", dec!(0.79)),
            ("CAD", dec!(1.36)),
            ("MXN", dec!(17.10)),
            ("INR", dec!(83.20)),
            ("JPY", dec!(149.50)),
        ];
        Self(
            table
                .into_iter()
                .filter_map(|(code, rate)| Currency::new(code).ok().map(|c| (c, rate)))
                .collect(),
        )
    }
}

impl ExchangeRates {
    pub fn rate(&self, currency: &Currency) -> Result<Decimal, TransferError> {
        self.0.get(currency).copied().ok_or_else(|| {
            TransferError::ValidationError(format!("No exchange rate for {currency}"))
        })
    }

    pub fn convert(&self, amount: Amount, currency: &Currency) -> Result<(Decimal, Decimal), TransferError> {
        let rate = self.rate(currency)?;
        let received = amount.value().checked_mul(rate).ok_or_else(|| {
            TransferError::ValidationError(format!("{amount} {currency} is out of range"))
        })?;
        Ok((rate, received.round_dp(2)))
    }

    pub fn insert(&mut self, currency: Currency, rate: Decimal) {
        self.0.insert(currency, rate);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn rates(&self) -> impl Iterator<Item = (&Currency, &Decimal)> {
        self.0.iter()
    }
}

const MINIMUM_COMPLIANCE_FEE: Decimal = dec!(0.01);

/// Percentage fee that substitutes for a clearance code.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComplianceFeeRate(Decimal);

impl Default for ComplianceFeeRate {
    fn default() -> Self {
        Self(dec!(0.10))
    }
}

impl ComplianceFeeRate {
    pub fn new(rate: Decimal) -> Result<Self, TransferError> {
        if rate > Decimal::ZERO && rate <= Decimal::ONE {
            Ok(Self(rate))
        } else {
            Err(TransferError::ValidationError(format!(
                "Compliance fee rate must be in (0, 1], got {rate}"
            )))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Fee owed to release a held transfer of `amount`, rounded to cents and
    /// never less than one cent.
    pub fn quote(&self, amount: Amount) -> Result<Amount, TransferError> {
        let fee = amount.value().checked_mul(self.0).ok_or_else(|| {
            TransferError::ValidationError(format!("Compliance fee on {amount} is out of range"))
        })?;
        Amount::new(fee.round_dp(2).max(MINIMUM_COMPLIANCE_FEE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipient(country: &str) -> Recipient {
        Recipient::new("r", "Someone", CountryCode::new(country).unwrap())
    }

    fn amount(v: Decimal) -> Amount {
        Amount::new(v).unwrap()
    }

    #[test]
    fn test_threshold_policy() {
        let policy = ThresholdPolicy::default();
        assert!(policy.requires_clearance(amount(dec!(1500)), &recipient("GB"), TransferRail::Standard));
        assert!(policy.requires_clearance(amount(dec!(1000)), &recipient("MX"), TransferRail::Wire));
        assert!(!policy.requires_clearance(amount(dec!(999.99)), &recipient("GB"), TransferRail::Standard));
        assert!(!policy.requires_clearance(amount(dec!(50000)), &recipient("US"), TransferRail::Wire));
        assert!(!policy.requires_clearance(amount(dec!(5000)), &recipient("GB"), TransferRail::Internal));
    }

    #[test]
    fn test_fee_schedule() {
        let fees = FeeSchedule::default();
        assert_eq!(fees.fee_for(TransferRail::Standard, &recipient("US")), Balance::ZERO);
        assert_eq!(fees.fee_for(TransferRail::Standard, &recipient("GB")), Balance::new(dec!(4.99)));
        assert_eq!(fees.fee_for(TransferRail::Wire, &recipient("US")), Balance::new(dec!(25.00)));
        assert_eq!(fees.fee_for(TransferRail::Wire, &recipient("IN")), Balance::new(dec!(45.00)));
    }

    #[test]
    fn test_convert_rounds_to_cents() {
        let rates = ExchangeRates::default();
        let (rate, received) = rates.convert(amount(dec!(1500)), &Currency::new("GBP").unwrap()).unwrap();
        assert_eq!(rate, dec!(0.79));
        assert_eq!(received, dec!(1185.00));

        let (_, received) = rates.convert(amount(dec!(10.01)), &Currency::new("EUR").unwrap()).unwrap();
        assert_eq!(received, dec!(9.21));
    }

    #[test]
    fn test_unknown_currency() {
        let rates = ExchangeRates::default();
        assert!(matches!(
            rates.rate(&Currency::new("XYZ").unwrap()),
            Err(TransferError::ValidationError(_))
        ));
    }

    #[test]
    fn test_compliance_fee_quote() {
        let rate = ComplianceFeeRate::default();
        assert_eq!(rate.quote(amount(dec!(1500))).unwrap().value(), dec!(150.00));
        assert!(ComplianceFeeRate::new(dec!(0)).is_err());
        assert!(ComplianceFeeRate::new(dec!(1.5)).is_err());
    }

    #[test]
    fn test_compliance_fee_quote_floor() {
        let rate = ComplianceFeeRate::default();
        assert_eq!(rate.quote(amount(dec!(0.01))).unwrap().value(), dec!(0.01));
        assert_eq!(rate.quote(amount(dec!(0.04))).unwrap().value(), dec!(0.01));
        assert_eq!(rate.quote(amount(dec!(0.26))).unwrap().value(), dec!(0.03));
    }

    #[test]
    fn test_convert_overflow() {
        let rates = ExchangeRates::default();
        let result = rates.convert(amount(Decimal::MAX), &Currency::new("MXN").unwrap());
        assert!(matches!(result, Err(TransferError::ValidationError(_))));
    }
}
