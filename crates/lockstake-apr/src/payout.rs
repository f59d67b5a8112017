//! Conversion of reward points into currency.
//!
//! Ledgers store dimensionless points (principal-weighted reward share).
//! These functions apply the rates in force for a claim:
//!
//! ```text
//! bonused = points * (base + vest) * (10000 + rsi) / 10000^2 / EPOCHS_PER_YEAR
//! plain   = points * base / 10000 / EPOCHS_PER_YEAR
//! ```

use lockstake_types::{math, BPS_DENOMINATOR, EPOCHS_PER_YEAR};

use crate::calculator::RateSnapshot;
use crate::{AprError, Result};

/// Value of points accrued before a position's end.
pub fn bonused_value(points: u128, rates: &RateSnapshot) -> Result<u128> {
    let bps = u128::from(BPS_DENOMINATOR);
    let rate = u128::from(rates.base_bps + rates.vest_bonus_bps) * (bps + u128::from(rates.rsi_bonus_bps));
    math::mul_div(points, rate, bps * bps * u128::from(EPOCHS_PER_YEAR))
        .map_err(|_| AprError::Overflow)
}

/// Value of points accrued outside a vesting window.
pub fn plain_value(points: u128, base_bps: u64) -> Result<u128> {
    let denominator = u128::from(BPS_DENOMINATOR) * u128::from(EPOCHS_PER_YEAR);
    math::mul_div(points, u128::from(base_bps), denominator).map_err(|_| AprError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rates(base: u64, vest: u64, rsi: u64) -> RateSnapshot {
        RateSnapshot {
            base_bps: base,
            vest_bonus_bps: vest,
            rsi_bonus_bps: rsi,
        }
    }

    #[test]
    fn test_bonused_value_without_rsi() {
        // 7e6 * 510 * 10000 / 1e8 / 365 = 978.08
        let value = bonused_value(7_000_000, &rates(500, 10, 0)).expect("value");
        assert_eq!(value, 978);
    }

    #[test]
    fn test_bonused_value_with_rsi() {
        // 365e6 * 1000 * 12000 / 1e8 / 365 = 120_000
        let value = bonused_value(365_000_000, &rates(900, 100, 2_000)).expect("value");
        assert_eq!(value, 120_000);
    }

    #[test]
    fn test_plain_value() {
        // one year of points at 5% on 1e6 principal
        let value = plain_value(365_000_000, 500).expect("value");
        assert_eq!(value, 50_000);
    }

    #[test]
    fn test_zero_points() {
        assert_eq!(bonused_value(0, &rates(500, 10, 0)).expect("zero"), 0);
        assert_eq!(plain_value(0, 500).expect("zero"), 0);
    }

    #[test]
    fn test_overflow_reported() {
        let err = bonused_value(u128::MAX, &rates(500, 10, 0)).expect_err("overflow");
        assert_eq!(err, AprError::Overflow);
    }
}
