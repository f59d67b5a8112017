//! Macro-factor mapping and RSI bonus curve.
//!
//! ## Macro factor
//!
//! The deviation of the fast SMA from the slow SMA, in bps of the slow SMA,
//! moves the factor away from its default. A downtrend (fast below slow)
//! raises the factor, an uptrend lowers it:
//!
//! ```text
//! deviation = (slow - fast) * 10000 / slow
//! factor    = clamp(default + deviation * sensitivity / 10000, min, max)
//! ```
//!
//! ## RSI bonus
//!
//! Piecewise linear in the RSI: zero at or above `neutral_bps`, the full
//! bonus at or below `oversold_bps`, linear in between. The curve is
//! monotonic non-increasing in the RSI and bounded by the maximum bonus.

use lockstake_types::BPS_DENOMINATOR;
use serde::{Deserialize, Serialize};

/// Bounds and slope of the macro factor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroBounds {
    /// Factor used without a full slow window and while guarded.
    pub default_bps: u64,
    /// Lower clamp.
    pub min_bps: u64,
    /// Upper clamp.
    pub max_bps: u64,
    /// Factor change per bps of SMA deviation, in bps.
    pub sensitivity_bps: u64,
}

impl Default for MacroBounds {
    fn default() -> Self {
        Self {
            default_bps: 10_000,
            min_bps: 8_000,
            max_bps: 12_000,
            sensitivity_bps: 10_000,
        }
    }
}

/// Map the SMA crossover into a bounded macro factor.
pub fn macro_factor(fast_sma: u128, slow_sma: u128, bounds: &MacroBounds) -> u64 {
    if slow_sma == 0 {
        return bounds.default_bps;
    }
    let bps = i128::from(BPS_DENOMINATOR);
    let fast = fast_sma as i128;
    let slow = slow_sma as i128;

    let deviation = (slow - fast) * bps / slow;
    let adjustment = deviation * i128::from(bounds.sensitivity_bps) / bps;
    let factor = i128::from(bounds.default_bps) + adjustment;

    factor.clamp(i128::from(bounds.min_bps), i128::from(bounds.max_bps)) as u64
}

/// RSI thresholds of the bonus curve.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RsiCurve {
    /// RSI at or above which no bonus is paid.
    pub neutral_bps: u64,
    /// RSI at or below which the full bonus is paid.
    pub oversold_bps: u64,
}

impl Default for RsiCurve {
    fn default() -> Self {
        Self {
            neutral_bps: 5_000,
            oversold_bps: 3_000,
        }
    }
}

impl RsiCurve {
    /// Whether the thresholds describe a usable curve.
    pub fn is_valid(&self) -> bool {
        self.oversold_bps < self.neutral_bps && self.neutral_bps <= BPS_DENOMINATOR
    }

    /// Bonus in bps for an RSI reading.
    pub fn bonus(&self, rsi_bps: u64, max_bonus_bps: u64) -> u64 {
        if rsi_bps >= self.neutral_bps {
            return 0;
        }
        if rsi_bps <= self.oversold_bps {
            return max_bonus_bps;
        }
        let span = u128::from(self.neutral_bps - self.oversold_bps);
        let depth = u128::from(self.neutral_bps - rsi_bps);
        (u128::from(max_bonus_bps) * depth / span) as u64
    }
}
