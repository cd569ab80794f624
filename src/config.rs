//! Simulation configuration.
//!
//! Loaded from a TOML file; every section and field is optional and falls
//! back to the demo defaults. `TRANSFER_SIM_CLEARANCE_CODE` overrides the
//! clearance code from the file.
//!
//! ```toml
//! [lifecycle]
//! processing_after_ms = 3000
//! flag_after_ms = 15000
//!
//! [compliance]
//! threshold = "1000"
//! home_country = "US"
//! fee_rate = "0.10"
//! clearance_code = "CLR-7731"
//!
//! [exchange_rates]
//! USD = "1"
//! EUR = "0.92"
//!
//! [[accounts]]
//! id = "checking"
//! name = "Everyday Checking"
//! balance = "25000"
//! ```

use crate::application::lifecycle::{EngineSettings, LifecycleTimings};
use crate::domain::account::{Account, AccountId};
use crate::domain::clearance::ClearanceGate;
use crate::domain::money::Balance;
use crate::domain::policy::{ComplianceFeeRate, ExchangeRates, FeeSchedule, ThresholdPolicy};
use crate::domain::transaction::CountryCode;
use crate::error::{Result, TransferError};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const CLEARANCE_CODE_ENV: &str = "TRANSFER_SIM_CLEARANCE_CODE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub lifecycle: LifecycleTimings,
    pub compliance: ComplianceConfig,
    pub fees: FeeSchedule,
    pub exchange_rates: ExchangeRates,
    pub accounts: Vec<AccountSeed>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleTimings::default(),
            compliance: ComplianceConfig::default(),
            fees: FeeSchedule::default(),
            exchange_rates: ExchangeRates::default(),
            accounts: vec![
                AccountSeed {
                    id: AccountId::new("checking"),
                    name: "Everyday Checking".to_string(),
                    balance: dec!(25000),
                },
                AccountSeed {
                    id: AccountId::new("savings"),
                    name: "High-Yield Savings".to_string(),
                    balance: dec!(50000),
                },
            ],
        }
    }
}

/// Compliance hold rules and the two ways of lifting a hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplianceConfig {
    /// Transfers at or above this amount to another country are held.
    pub threshold: Decimal,
    pub home_country: CountryCode,
    /// Share of the send amount charged to lift a hold without a code.
    pub fee_rate: Decimal,
    pub clearance_code: String,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            threshold: dec!(1000),
            home_country: CountryCode::us(),
            fee_rate: ComplianceFeeRate::default().value(),
            clearance_code: "CLR-7731".to_string(),
        }
    }
}

impl ComplianceConfig {
    pub fn policy(&self) -> ThresholdPolicy {
        ThresholdPolicy {
            threshold: self.threshold,
            home_country: self.home_country.clone(),
        }
    }
}

/// An account to open when the simulation starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSeed {
    pub id: AccountId,
    pub name: String,
    pub balance: Decimal,
}

impl From<&AccountSeed> for Account {
    fn from(seed: &AccountSeed) -> Self {
        Account::new(seed.id.clone(), seed.name.clone(), Balance::new(seed.balance))
    }
}

impl Config {
    /// Reads, overrides from the environment, and validates a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, validated.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(code) = std::env::var(CLEARANCE_CODE_ENV)
            && !code.trim().is_empty()
        {
            self.compliance.clearance_code = code.trim().to_string();
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.lifecycle.validate()?;
        ComplianceFeeRate::new(self.compliance.fee_rate)?;
        if self.compliance.threshold <= Decimal::ZERO {
            return Err(TransferError::ValidationError(
                "Compliance threshold must be positive".to_string(),
            ));
        }
        if self.compliance.clearance_code.trim().is_empty() {
            return Err(TransferError::ValidationError(
                "Clearance code must not be empty".to_string(),
            ));
        }
        if self.exchange_rates.is_empty() {
            return Err(TransferError::ValidationError(
                "At least one exchange rate is required".to_string(),
            ));
        }
        if let Some((currency, _)) = self.exchange_rates.rates().find(|(_, rate)| **rate <= Decimal::ZERO) {
            return Err(TransferError::ValidationError(format!(
                "Exchange rate for {currency} must be positive"
            )));
        }
        let fees = [
            ("standard_domestic", self.fees.standard_domestic),
            ("standard_international", self.fees.standard_international),
            ("wire_domestic", self.fees.wire_domestic),
            ("wire_international", self.fees.wire_international),
        ];
        if let Some((name, fee)) = fees.iter().find(|(_, fee)| *fee < Decimal::ZERO) {
            return Err(TransferError::ValidationError(format!(
                "Fee {name} must not be negative, got {fee}"
            )));
        }
        for seed in &self.accounts {
            if seed.balance < Decimal::ZERO {
                return Err(TransferError::ValidationError(format!(
                    "Opening balance of account {} must not be negative",
                    seed.id
                )));
            }
        }
        Ok(())
    }

    pub fn engine_settings(&self) -> Result<EngineSettings> {
        Ok(EngineSettings {
            timings: self.lifecycle.clone(),
            clearance: ClearanceGate::new(self.compliance.clearance_code.clone()),
            compliance_fee: ComplianceFeeRate::new(self.compliance.fee_rate)?,
        })
    }

    pub fn opening_accounts(&self) -> Vec<Account> {
        self.accounts.iter().map(Account::from).collect()
    }
}
