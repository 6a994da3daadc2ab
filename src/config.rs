//! Configuration management
//!
//! Loads the JSON configuration file. Every section has defaults so an empty
//! object (or a missing file handed to `Default`) is a valid configuration.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::session::AFTER_HOURS_BOUNDARY_HOUR;
use crate::types::CommissionRates;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub commission: CommissionConfig,
    pub session: SessionConfig,
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        serde_json::from_str(&contents).context("Failed to parse config JSON")
    }

    pub fn commission_rates(&self) -> CommissionRates {
        CommissionRates {
            buy_rate: self.commission.buy_rate,
            sell_rate: self.commission.sell_rate,
        }
    }
}

/// Commission rate configuration, as decimal fractions of notional
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommissionConfig {
    pub buy_rate: Decimal,
    pub sell_rate: Decimal,
}

impl Default for CommissionConfig {
    fn default() -> Self {
        CommissionConfig {
            buy_rate: dec!(0.0007),
            sell_rate: dec!(0.0007),
        }
    }
}

/// Broker session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Clock hours below this belong to the next calendar day
    pub after_hours_boundary_hour: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            after_hours_boundary_hour: AFTER_HOURS_BOUNDARY_HOUR,
        }
    }
}

/// Persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            db_path: "recon.db".to_string(),
        }
    }
}
