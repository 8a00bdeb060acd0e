//! Billing engine configuration

use crate::error::{BillingError, BillingResult};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

/// Path to a JSON config file
pub const CONFIG_ENV: &str = "RESELLER_CONFIG";
/// Overrides `commission_rate`
pub const COMMISSION_RATE_ENV: &str = "RESELLER_COMMISSION_RATE";
/// Overrides `payment_decline_rate`
pub const DECLINE_RATE_ENV: &str = "RESELLER_DECLINE_RATE";

/// Billing engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BillingConfig {
    /// Share of a paid invoice owed to the referring sales user
    pub commission_rate: Decimal,
    /// Probability that the simulated gateway declines a charge
    pub payment_decline_rate: f64,
    /// Days ahead of today that count as "due soon"
    pub due_soon_window_days: i64,
    /// Seconds between billing passes in the daemon
    pub billing_interval_secs: u64,
    /// Seconds between reminder passes in the daemon
    pub reminder_interval_secs: u64,
    /// ISO currency code, display only
    pub currency: String,
    /// Optional JSON fixture to seed the store from
    pub seed_path: Option<PathBuf>,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            commission_rate: dec!(0.20),
            payment_decline_rate: 0.25,
            due_soon_window_days: 1,
            billing_interval_secs: 3600,
            reminder_interval_secs: 300,
            currency: "INR".into(),
            seed_path: None,
        }
    }
}

impl BillingConfig {
    /// Load from file
    pub fn load(path: impl AsRef<Path>) -> BillingResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| BillingError::Config(format!("{}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| BillingError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save to file
    pub fn save(&self, path: impl AsRef<Path>) -> BillingResult<()> {
        let content = serde_json::to_string_pretty(self).map_err(|e| BillingError::Config(e.to_string()))?;
        std::fs::write(path.as_ref(), content).map_err(|e| BillingError::Config(e.to_string()))
    }

    /// Resolve from the environment: `RESELLER_CONFIG` file (defaults if unset
    /// or unreadable), then per-field overrides
    pub fn from_env() -> BillingResult<Self> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) => match Self::load(&path) {
                Ok(config) => {
                    info!(path = %path, "Loaded billing config");
                    config
                }
                Err(e) => {
                    warn!(path = %path, error = %e, "Failed to load billing config, using defaults");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        };

        if let Ok(raw) = std::env::var(COMMISSION_RATE_ENV) {
            config.commission_rate = Decimal::from_str(raw.trim())
                .map_err(|e| BillingError::Config(format!("{}={}: {}", COMMISSION_RATE_ENV, raw, e)))?;
        }
        if let Ok(raw) = std::env::var(DECLINE_RATE_ENV) {
            config.payment_decline_rate = raw
                .trim()
                .parse()
                .map_err(|e| BillingError::Config(format!("{}={}: {}", DECLINE_RATE_ENV, raw, e)))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Range checks on every field
    pub fn validate(&self) -> BillingResult<()> {
        if self.commission_rate < Decimal::ZERO || self.commission_rate > Decimal::ONE {
            return Err(BillingError::Config(format!(
                "commission_rate must be within [0, 1], got {}",
                self.commission_rate
            )));
        }
        if !(0.0..=1.0).contains(&self.payment_decline_rate) {
            return Err(BillingError::Config(format!(
                "payment_decline_rate must be within [0, 1], got {}",
                self.payment_decline_rate
            )));
        }
        if self.due_soon_window_days < 0 {
            return Err(BillingError::Config("due_soon_window_days cannot be negative".into()));
        }
        if self.billing_interval_secs == 0 || self.reminder_interval_secs == 0 {
            return Err(BillingError::Config("tick intervals must be positive".into()));
        }
        Ok(())
    }
}
