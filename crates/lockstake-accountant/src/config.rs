//! Accountant configuration.

use lockstake_ledger::balance::DEFAULT_BALANCE_CHANGE_THRESHOLD;
use lockstake_types::{BPS_DENOMINATOR, WEEKLY_PENALTY_BPS};
use serde::{Deserialize, Serialize};

use crate::{AccountingError, Result};

/// Hard ceiling for the balance-change threshold.
pub const MAX_BALANCE_CHANGE_THRESHOLD: usize = 1_024;

/// Tunables of the reward accountant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountantConfig {
    /// Blocks a validator is expected to sign per epoch; full uptime earns
    /// one point per staked unit.
    #[serde(default = "default_blocks_per_epoch")]
    pub blocks_per_epoch: u64,
    /// Principal changes allowed per position.
    #[serde(default = "default_balance_change_threshold")]
    pub balance_change_threshold: usize,
    /// Principal burned per remaining week on an early exit.
    #[serde(default = "default_weekly_penalty_bps")]
    pub weekly_penalty_bps: u64,
    /// Commission of a pool created without an explicit one.
    #[serde(default = "default_commission_bps")]
    pub default_commission_bps: u64,
    /// Highest commission a validator may set.
    #[serde(default = "default_max_commission_bps")]
    pub max_commission_bps: u64,
}

impl Default for AccountantConfig {
    fn default() -> Self {
        Self {
            blocks_per_epoch: default_blocks_per_epoch(),
            balance_change_threshold: default_balance_change_threshold(),
            weekly_penalty_bps: default_weekly_penalty_bps(),
            default_commission_bps: default_commission_bps(),
            max_commission_bps: default_max_commission_bps(),
        }
    }
}

impl AccountantConfig {
    /// Check every field against its allowed range.
    ///
    /// # Errors
    ///
    /// - [`AccountingError::ParameterOutOfBounds`] naming the first bad field
    pub fn validate(&self) -> Result<()> {
        if self.blocks_per_epoch == 0 {
            return Err(out_of_bounds("blocks_per_epoch", 0));
        }
        if !(1..=MAX_BALANCE_CHANGE_THRESHOLD).contains(&self.balance_change_threshold) {
            return Err(out_of_bounds(
                "balance_change_threshold",
                self.balance_change_threshold as u64,
            ));
        }
        if self.weekly_penalty_bps > BPS_DENOMINATOR {
            return Err(out_of_bounds("weekly_penalty_bps", self.weekly_penalty_bps));
        }
        if self.max_commission_bps > BPS_DENOMINATOR {
            return Err(out_of_bounds("max_commission_bps", self.max_commission_bps));
        }
        if self.default_commission_bps > self.max_commission_bps {
            return Err(out_of_bounds(
                "default_commission_bps",
                self.default_commission_bps,
            ));
        }
        Ok(())
    }
}

pub(crate) fn out_of_bounds(name: &'static str, value: u64) -> AccountingError {
    AccountingError::ParameterOutOfBounds { name, value }
}

fn default_blocks_per_epoch() -> u64 {
    100
}
fn default_balance_change_threshold() -> usize {
    DEFAULT_BALANCE_CHANGE_THRESHOLD
}
fn default_weekly_penalty_bps() -> u64 {
    WEEKLY_PENALTY_BPS
}
fn default_commission_bps() -> u64 {
    1_000
}
fn default_max_commission_bps() -> u64 {
    5_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = AccountantConfig::default();
        config.validate().expect("default config");
        assert_eq!(config.balance_change_threshold, 64);
        assert_eq!(config.weekly_penalty_bps, 30);
    }

    #[test]
    fn test_rejects_bad_fields() {
        let config = AccountantConfig {
            blocks_per_epoch: 0,
            ..AccountantConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AccountingError::ParameterOutOfBounds { name: "blocks_per_epoch", .. })
        ));

        let config = AccountantConfig {
            balance_change_threshold: 0,
            ..AccountantConfig::default()
        };
        assert!(config.validate().is_err());

        let config = AccountantConfig {
            default_commission_bps: 6_000,
            ..AccountantConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AccountingError::ParameterOutOfBounds { name: "default_commission_bps", .. })
        ));
    }
}
