//! Commission configuration loading from commission.toml
//!
//! This module loads an organization's commission method and tier table from
//! a TOML configuration file. Parsed tiers go through the same validated
//! [`TierTable`] constructor as programmatic ones, so a gap-having or
//! overlapping table in the file is rejected at load time, not at payout
//! time.

use crate::core::commission::{CommissionMethod, CommissionTier, TierTable};
use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Which calculation method the file selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodKind {
    /// Fixed dollar amount per validated session
    FlatFee,
    /// Flat percentage of validated-session value
    Percentage,
    /// Achieved bracket applies to everything
    Progressive,
    /// Tax-bracket style
    Graduated,
}

/// Raw commission.toml contents before validation.
#[derive(Debug, Deserialize)]
pub struct CommissionConfig {
    /// Selected calculation method
    pub method: MethodKind,
    /// Dollars per session; required for `flat_fee`
    pub fee_per_session: Option<f64>,
    /// Fraction in `[0, 1]`; required for `percentage`
    pub rate: Option<f64>,
    /// Rate brackets; required for the tiered methods
    #[serde(default)]
    pub tiers: Vec<CommissionTier>,
}

impl CommissionConfig {
    /// Validates the raw file contents into a usable method.
    ///
    /// # Errors
    /// Returns `Config` when the selected method is missing its parameters
    /// and `InvalidTierTable` when the brackets fail structural validation.
    pub fn into_method(self) -> Result<CommissionMethod> {
        match self.method {
            MethodKind::FlatFee => {
                let fee_per_session = self.fee_per_session.ok_or_else(|| Error::Config {
                    message: "method \"flat_fee\" requires fee_per_session".to_string(),
                })?;
                if !fee_per_session.is_finite() || fee_per_session < 0.0 {
                    return Err(Error::InvalidAmount {
                        amount: fee_per_session,
                    });
                }
                Ok(CommissionMethod::FlatFee { fee_per_session })
            }
            MethodKind::Percentage => {
                let rate = self.rate.ok_or_else(|| Error::Config {
                    message: "method \"percentage\" requires rate".to_string(),
                })?;
                if !rate.is_finite() || !(0.0..=1.0).contains(&rate) {
                    return Err(Error::Config {
                        message: format!("rate {rate} is outside [0, 1]"),
                    });
                }
                Ok(CommissionMethod::Percentage { rate })
            }
            MethodKind::Progressive => Ok(CommissionMethod::Progressive {
                tiers: TierTable::new(self.tiers)?,
            }),
            MethodKind::Graduated => Ok(CommissionMethod::Graduated {
                tiers: TierTable::new(self.tiers)?,
            }),
        }
    }
}

/// Loads and validates a commission configuration from a TOML file.
///
/// # Errors
/// Returns an error if the file cannot be read, the TOML syntax is invalid,
/// or the configured method fails validation.
pub fn load_commission_config<P: AsRef<Path>>(path: P) -> Result<CommissionMethod> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("failed to read commission config: {e}"),
    })?;

    let config: CommissionConfig = toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("failed to parse commission config: {e}"),
    })?;

    config.into_method()
}

/// Loads the commission configuration from the default location
/// (./commission.toml).
pub fn load_default_commission_config() -> Result<CommissionMethod> {
    load_commission_config("commission.toml")
}
