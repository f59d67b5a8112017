//! # lockstake-types
//!
//! Shared identifiers, constants and fixed-point helpers used across the
//! lockstake workspace.
//!
//! ## Units
//!
//! - Amounts (principal, rewards, escrow) are integer base units held in `u128`.
//! - Reward-per-share values are fixed-point, scaled by [`PRECISION`].
//! - Rates and bonuses are basis points over [`BPS_DENOMINATOR`].
//! - Time is Unix seconds.

pub mod math;

use serde::{Deserialize, Serialize};

/// Validator identifier assigned by the validator-set module.
pub type ValidatorId = u64;

/// Delegator identifier (account hash).
pub type DelegatorId = [u8; 32];

/// Monotonic epoch number produced by the validator-set module.
pub type EpochId = u64;

/// Token amount in base units.
pub type Amount = u128;

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// Fixed-point scale of cumulative reward-per-share values.
pub const PRECISION: u128 = 1_000_000_000_000;

/// Basis-point denominator (100% = 10,000 bps).
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Reward epochs per year (one epoch per day).
pub const EPOCHS_PER_YEAR: u64 = 365;

/// Seconds per day.
pub const DAY: u64 = 24 * 60 * 60;

/// Seconds per week.
pub const WEEK: u64 = 7 * DAY;

/// Early-exit penalty charged per remaining week of an active position.
pub const WEEKLY_PENALTY_BPS: u64 = 30;

/// Longest vesting duration a position can lock for.
pub const MAX_VESTING_WEEKS: u64 = 52;

/// Storage key of a vesting position and its balance-change history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PositionKey {
    /// Validator the stake is delegated to.
    pub validator: ValidatorId,
    /// Owner of the stake.
    pub delegator: DelegatorId,
}

impl PositionKey {
    /// Build a key from its parts.
    pub fn new(validator: ValidatorId, delegator: DelegatorId) -> Self {
        Self {
            validator,
            delegator,
        }
    }

    /// The same delegator's slot under another validator.
    pub fn with_validator(&self, validator: ValidatorId) -> Self {
        Self {
            validator,
            delegator: self.delegator,
        }
    }
}

impl std::fmt::Display for PositionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let short = hex::encode(&self.delegator[..4]);
        write!(f, "{}/{}", self.validator, short)
    }
}
