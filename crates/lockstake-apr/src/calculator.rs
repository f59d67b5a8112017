//! The APR calculator.
//!
//! Owns the price series, the guard and the governance-controlled rate
//! parameters. Positions capture a [`RateSnapshot`] when they open and keep
//! it for their whole life, so later price moves only affect new positions.

use lockstake_types::{math, Timestamp, BPS_DENOMINATOR, DAY, EPOCHS_PER_YEAR};
use serde::{Deserialize, Serialize};

use crate::bonus;
use crate::curve::{self, MacroBounds, RsiCurve};
use crate::guard::{Guard, STALENESS_THRESHOLD};
use crate::series::PriceSeries;
use crate::{AprError, Result};

/// Hard ceiling of the governance base APR.
pub const BASE_APR_CEILING_BPS: u64 = 5_000;

/// Hard ceiling of the macro factor.
pub const MACRO_CEILING_BPS: u64 = 20_000;

/// Hard ceiling of the RSI bonus.
pub const RSI_BONUS_CEILING_BPS: u64 = 5_000;

/// Longest SMA window or RSI period, in days.
pub const MAX_WINDOW_DAYS: u64 = 365;

/// Calculator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AprConfig {
    /// Governance base APR.
    pub base_apr_bps: u64,
    /// Lowest base APR governance may set.
    pub min_base_apr_bps: u64,
    /// Highest base APR governance may set.
    pub max_base_apr_bps: u64,
    /// Macro factor bounds and slope.
    pub macro_bounds: MacroBounds,
    /// Fast SMA window in days.
    pub fast_window: usize,
    /// Slow SMA window in days.
    pub slow_window: usize,
    /// RSI smoothing period in days.
    pub rsi_period: u64,
    /// RSI bonus curve.
    pub rsi_curve: RsiCurve,
    /// Largest RSI bonus.
    pub max_rsi_bps: u64,
    /// Seconds without a price before the feed counts as stale.
    pub staleness_secs: u64,
}

impl Default for AprConfig {
    fn default() -> Self {
        Self {
            base_apr_bps: 500,
            min_base_apr_bps: 100,
            max_base_apr_bps: 2_000,
            macro_bounds: MacroBounds::default(),
            fast_window: 7,
            slow_window: 30,
            rsi_period: 14,
            rsi_curve: RsiCurve::default(),
            max_rsi_bps: 2_000,
            staleness_secs: STALENESS_THRESHOLD,
        }
    }
}

impl AprConfig {
    /// Check every field against its bounds.
    ///
    /// # Errors
    ///
    /// - [`AprError::ParameterOutOfBounds`] naming the first offending field
    pub fn validate(&self) -> Result<()> {
        let check = |ok: bool, name: &'static str, value: u64| {
            if ok {
                Ok(())
            } else {
                Err(AprError::ParameterOutOfBounds { name, value })
            }
        };

        check(
            self.max_base_apr_bps <= BASE_APR_CEILING_BPS,
            "max_base_apr_bps",
            self.max_base_apr_bps,
        )?;
        check(
            self.min_base_apr_bps <= self.max_base_apr_bps,
            "min_base_apr_bps",
            self.min_base_apr_bps,
        )?;
        check(
            (self.min_base_apr_bps..=self.max_base_apr_bps).contains(&self.base_apr_bps),
            "base_apr_bps",
            self.base_apr_bps,
        )?;
        validate_macro(&self.macro_bounds)?;
        check(self.fast_window > 0, "fast_window", self.fast_window as u64)?;
        check(
            self.slow_window > self.fast_window && self.slow_window as u64 <= MAX_WINDOW_DAYS,
            "slow_window",
            self.slow_window as u64,
        )?;
        check(
            (1..=MAX_WINDOW_DAYS).contains(&self.rsi_period),
            "rsi_period",
            self.rsi_period,
        )?;
        check(
            self.rsi_curve.is_valid(),
            "rsi_curve.neutral_bps",
            self.rsi_curve.neutral_bps,
        )?;
        check(
            self.max_rsi_bps <= RSI_BONUS_CEILING_BPS,
            "max_rsi_bps",
            self.max_rsi_bps,
        )?;
        Ok(())
    }

    /// Ceiling reward rate as `(numerator, denominator)` per point.
    ///
    /// Uses the highest base governance may set, the highest macro factor,
    /// the 52-week bonus and the largest RSI bonus.
    pub fn max_apr(&self) -> (u128, u128) {
        let bps = u128::from(BPS_DENOMINATOR);
        let max_base =
            u128::from(self.max_base_apr_bps) * u128::from(self.macro_bounds.max_bps) / bps;
        let vest = u128::from(bonus::max_vesting_bonus());
        let numerator = (max_base + vest) * (bps + u128::from(self.max_rsi_bps));
        let denominator = bps * bps * u128::from(EPOCHS_PER_YEAR);
        (numerator, denominator)
    }
}

fn validate_macro(bounds: &MacroBounds) -> Result<()> {
    if bounds.min_bps == 0 || bounds.min_bps > bounds.max_bps {
        return Err(AprError::ParameterOutOfBounds {
            name: "macro_bounds.min_bps",
            value: bounds.min_bps,
        });
    }
    if bounds.max_bps > MACRO_CEILING_BPS {
        return Err(AprError::ParameterOutOfBounds {
            name: "macro_bounds.max_bps",
            value: bounds.max_bps,
        });
    }
    if !(bounds.min_bps..=bounds.max_bps).contains(&bounds.default_bps) {
        return Err(AprError::ParameterOutOfBounds {
            name: "macro_bounds.default_bps",
            value: bounds.default_bps,
        });
    }
    Ok(())
}

/// Rates a position captures when it opens.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateSnapshot {
    /// Effective base rate (base APR scaled by the macro factor).
    pub base_bps: u64,
    /// Duration bonus.
    pub vest_bonus_bps: u64,
    /// RSI bonus, applied as a `(10000 + rsi)` multiplier.
    pub rsi_bonus_bps: u64,
}

/// Dynamic APR calculator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AprCalculator {
    config: AprConfig,
    series: PriceSeries,
    guard: Guard,
}

impl AprCalculator {
    /// Create a calculator from a validated configuration.
    ///
    /// # Errors
    ///
    /// - [`AprError::ParameterOutOfBounds`] if the configuration is invalid
    pub fn new(config: AprConfig) -> Result<Self> {
        config.validate()?;
        let series = PriceSeries::new(config.macro_bounds.default_bps);
        let guard = Guard::with_threshold(config.staleness_secs);
        Ok(Self {
            config,
            series,
            guard,
        })
    }

    /// Admit a daily price vote.
    ///
    /// Returns `false` when the calculator is guarded and the price was
    /// ignored.
    ///
    /// # Errors
    ///
    /// - [`AprError::InvalidPrice`] if `price` is zero
    /// - [`AprError::NonMonotonicTimestamp`] if `timestamp` does not advance
    /// - [`AprError::PriceAlreadyRecorded`] if a price was admitted the same day
    pub fn on_new_price(&mut self, price: u64, timestamp: Timestamp) -> Result<bool> {
        if price == 0 {
            return Err(AprError::InvalidPrice(price));
        }
        if self.guard.is_guarded() {
            tracing::debug!(price, timestamp, "apr: guarded, price ignored");
            return Ok(false);
        }
        if let Some(last) = self.series.latest_timestamp() {
            if timestamp <= last {
                return Err(AprError::NonMonotonicTimestamp {
                    new: timestamp,
                    last,
                });
            }
            if timestamp / DAY == last / DAY {
                return Err(AprError::PriceAlreadyRecorded {
                    day: timestamp / DAY,
                });
            }
        }

        self.series.push(
            price,
            timestamp,
            self.config.fast_window,
            self.config.slow_window,
            self.config.rsi_period,
        )?;
        self.guard.record_price(timestamp);
        self.recompute();

        tracing::debug!(
            price,
            macro_factor = self.series.macro_factor_bps,
            rsi_bonus = self.series.rsi_bonus_bps,
            "apr: price admitted"
        );
        Ok(true)
    }

    fn recompute(&mut self) {
        if self.guard.is_guarded() {
            self.series.macro_factor_bps = self.config.macro_bounds.default_bps;
            self.series.rsi_bonus_bps = 0;
            return;
        }

        let bounds = &self.config.macro_bounds;
        self.series.macro_factor_bps = match (
            self.series.fast_sma(self.config.fast_window),
            self.series.slow_sma(self.config.slow_window),
        ) {
            (Some(fast), Some(slow)) => curve::macro_factor(fast, slow, bounds),
            _ => bounds.default_bps,
        };

        self.series.rsi_bonus_bps = self
            .series
            .rsi_bps(self.config.rsi_period)
            .map_or(0, |rsi| self.config.rsi_curve.bonus(rsi, self.config.max_rsi_bps));
    }

    /// Freeze the macro factor at its default and the RSI bonus at zero.
    pub fn guard(&mut self) {
        self.guard.engage();
        self.recompute();
    }

    /// Resume normal operation, recomputing from the retained series.
    pub fn unguard(&mut self) {
        self.guard.release();
        self.recompute();
    }

    /// Whether the calculator is guarded.
    pub fn is_guarded(&self) -> bool {
        self.guard.is_guarded()
    }

    /// Whether the price feed has gone quiet.
    pub fn is_stale(&self, now: Timestamp) -> bool {
        self.guard.is_stale(now)
    }

    /// Current macro factor.
    pub fn macro_factor(&self) -> u64 {
        self.series.macro_factor_bps
    }

    /// Current RSI bonus.
    pub fn rsi_bonus(&self) -> u64 {
        self.series.rsi_bonus_bps
    }

    /// Governance base APR.
    pub fn base_apr(&self) -> u64 {
        self.config.base_apr_bps
    }

    /// Base APR scaled by the macro factor.
    pub fn effective_base(&self) -> u64 {
        let scaled = u128::from(self.config.base_apr_bps) * u128::from(self.series.macro_factor_bps)
            / u128::from(BPS_DENOMINATOR);
        scaled as u64
    }

    /// Duration bonus for `weeks`.
    ///
    /// # Errors
    ///
    /// - [`AprError::InvalidDuration`] if `weeks` is outside `[1, 52]`
    pub fn vesting_bonus(&self, weeks: u64) -> Result<u64> {
        bonus::vesting_bonus(weeks)
    }

    /// Rates a position of `weeks` would capture now.
    ///
    /// # Errors
    ///
    /// - [`AprError::InvalidDuration`] if `weeks` is outside `[1, 52]`
    pub fn snapshot(&self, weeks: u64) -> Result<RateSnapshot> {
        Ok(RateSnapshot {
            base_bps: self.effective_base(),
            vest_bonus_bps: self.vesting_bonus(weeks)?,
            rsi_bonus_bps: self.rsi_bonus(),
        })
    }

    /// Ceiling reward rate as `(numerator, denominator)` per point.
    ///
    /// See [`AprConfig::max_apr`].
    pub fn max_apr(&self) -> (u128, u128) {
        self.config.max_apr()
    }

    /// Most that `points` could ever be worth at claim time.
    ///
    /// # Errors
    ///
    /// - [`AprError::Overflow`] on arithmetic overflow
    pub fn apply_max_reward(&self, points: u128) -> Result<u128> {
        let (numerator, denominator) = self.max_apr();
        math::mul_div(points, numerator, denominator).map_err(|_| AprError::Overflow)
    }

    /// Set the governance base APR.
    ///
    /// # Errors
    ///
    /// - [`AprError::ParameterOutOfBounds`] outside `[min_base, max_base]`
    pub fn set_base_apr(&mut self, bps: u64) -> Result<()> {
        if !(self.config.min_base_apr_bps..=self.config.max_base_apr_bps).contains(&bps) {
            return Err(AprError::ParameterOutOfBounds {
                name: "base_apr_bps",
                value: bps,
            });
        }
        tracing::info!(old = self.config.base_apr_bps, new = bps, "apr: base rate changed");
        self.config.base_apr_bps = bps;
        Ok(())
    }

    /// Replace the macro factor bounds.
    ///
    /// # Errors
    ///
    /// - [`AprError::ParameterOutOfBounds`] if the bounds are inconsistent
    pub fn set_macro_bounds(&mut self, bounds: MacroBounds) -> Result<()> {
        validate_macro(&bounds)?;
        tracing::info!(min = bounds.min_bps, max = bounds.max_bps, "apr: macro bounds changed");
        self.config.macro_bounds = bounds;
        self.recompute();
        Ok(())
    }

    /// Set the largest RSI bonus.
    ///
    /// # Errors
    ///
    /// - [`AprError::ParameterOutOfBounds`] above the hard ceiling
    pub fn set_max_rsi(&mut self, bps: u64) -> Result<()> {
        if bps > RSI_BONUS_CEILING_BPS {
            return Err(AprError::ParameterOutOfBounds {
                name: "max_rsi_bps",
                value: bps,
            });
        }
        tracing::info!(new = bps, "apr: max RSI bonus changed");
        self.config.max_rsi_bps = bps;
        self.recompute();
        Ok(())
    }

    /// Replace the RSI bonus curve.
    ///
    /// # Errors
    ///
    /// - [`AprError::ParameterOutOfBounds`] if the thresholds are inconsistent
    pub fn set_rsi_curve(&mut self, rsi_curve: RsiCurve) -> Result<()> {
        if !rsi_curve.is_valid() {
            return Err(AprError::ParameterOutOfBounds {
                name: "rsi_curve.neutral_bps",
                value: rsi_curve.neutral_bps,
            });
        }
        self.config.rsi_curve = rsi_curve;
        self.recompute();
        Ok(())
    }

    /// Active configuration.
    pub fn config(&self) -> &AprConfig {
        &self.config
    }

    /// Underlying price series.
    pub fn series(&self) -> &PriceSeries {
        &self.series
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const START: Timestamp = 1_700_000_000;

    fn small_config() -> AprConfig {
        AprConfig {
            fast_window: 2,
            slow_window: 4,
            rsi_period: 3,
            ..AprConfig::default()
        }
    }

    fn feed(calc: &mut AprCalculator, prices: &[u64]) {
        let first_day = calc.series().latest_timestamp().map_or(0, |t| (t - START) / DAY + 1);
        for (i, &p) in prices.iter().enumerate() {
            let ts = START + (first_day + i as u64) * DAY;
            calc.on_new_price(p, ts).expect("price");
        }
    }

    #[test]
    fn test_default_config_valid() {
        AprConfig::default().validate().expect("valid");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = AprConfig {
            base_apr_bps: 3_000,
            ..AprConfig::default()
        };
        let err = AprCalculator::new(config).expect_err("base above max");
        assert!(matches!(err, AprError::ParameterOutOfBounds { name: "base_apr_bps", .. }));

        let config = AprConfig {
            slow_window: 7,
            ..AprConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_window_lengths_capped() {
        let config = AprConfig {
            rsi_period: MAX_WINDOW_DAYS + 1,
            ..AprConfig::default()
        };
        let err = config.validate().expect_err("rsi period");
        assert!(matches!(err, AprError::ParameterOutOfBounds { name: "rsi_period", .. }));

        let config = AprConfig {
            slow_window: usize::MAX,
            ..AprConfig::default()
        };
        let err = config.validate().expect_err("slow window");
        assert!(matches!(err, AprError::ParameterOutOfBounds { name: "slow_window", .. }));

        let config = AprConfig {
            fast_window: 364,
            slow_window: 365,
            rsi_period: MAX_WINDOW_DAYS,
            ..AprConfig::default()
        };
        config.validate().expect("longest windows");
    }

    #[test]
    fn test_fresh_calculator_defaults() {
        let calc = AprCalculator::new(AprConfig::default()).expect("calc");
        assert_eq!(calc.macro_factor(), 10_000);
        assert_eq!(calc.rsi_bonus(), 0);
        assert_eq!(calc.effective_base(), 500);
    }

    #[test]
    fn test_downtrend_raises_macro_and_rsi() {
        let mut calc = AprCalculator::new(small_config()).expect("calc");
        feed(&mut calc, &[100, 90, 80, 70]);
        // fast = 75, slow = 85 => deviation 1176 bps
        assert_eq!(calc.macro_factor(), 11_176);
        assert_eq!(calc.rsi_bonus(), calc.config().max_rsi_bps);
        assert_eq!(calc.effective_base(), 558);
    }

    #[test]
    fn test_uptrend_no_rsi_bonus() {
        let mut calc = AprCalculator::new(small_config()).expect("calc");
        feed(&mut calc, &[100, 110, 120, 130]);
        assert!(calc.macro_factor() < 10_000);
        assert_eq!(calc.rsi_bonus(), 0);
    }

    #[test]
    fn test_guard_freezes() {
        let mut calc = AprCalculator::new(small_config()).expect("calc");
        feed(&mut calc, &[100, 90, 80, 70]);
        assert!(calc.rsi_bonus() > 0);

        calc.guard();
        assert_eq!(calc.macro_factor(), 10_000);
        assert_eq!(calc.rsi_bonus(), 0);

        let applied = calc.on_new_price(10, START + 100 * DAY).expect("guarded");
        assert!(!applied);
        assert_eq!(calc.series().latest_price(), Some(70));

        calc.unguard();
        assert_eq!(calc.macro_factor(), 11_176);
        assert_eq!(calc.rsi_bonus(), calc.config().max_rsi_bps);
    }

    #[test]
    fn test_price_validation() {
        let mut calc = AprCalculator::new(AprConfig::default()).expect("calc");
        assert_eq!(calc.on_new_price(0, START), Err(AprError::InvalidPrice(0)));

        calc.on_new_price(100, START).expect("first");
        let err = calc.on_new_price(100, START).expect_err("same time");
        assert!(matches!(err, AprError::NonMonotonicTimestamp { .. }));

        let err = calc.on_new_price(100, START + 60).expect_err("same day");
        assert!(matches!(err, AprError::PriceAlreadyRecorded { .. }));

        calc.on_new_price(100, START + DAY).expect("next day");
    }

    #[test]
    fn test_snapshot_and_max_apr() {
        let calc = AprCalculator::new(AprConfig::default()).expect("calc");
        let snap = calc.snapshot(52).expect("snapshot");
        assert_eq!(snap.base_bps, 500);
        assert_eq!(snap.vest_bonus_bps, 1_090);
        assert_eq!(snap.rsi_bonus_bps, 0);
        assert!(calc.snapshot(0).is_err());

        // (2000 * 1.2 + 1090) * (10000 + 2000)
        let (num, den) = calc.max_apr();
        assert_eq!(num, 3_490 * 12_000);
        assert_eq!(den, 10_000 * 10_000 * 365);
        assert_eq!(calc.apply_max_reward(den).expect("max"), num);
    }

    #[test]
    fn test_max_reward_covers_any_snapshot() {
        let mut calc = AprCalculator::new(small_config()).expect("calc");
        feed(&mut calc, &[100, 50, 25, 12]);
        calc.set_base_apr(calc.config().max_base_apr_bps).expect("base");
        let snap = calc.snapshot(52).expect("snapshot");
        let points = 1_000_000_000u128;
        let worst = crate::payout::bonused_value(points, &snap).expect("value");
        assert!(worst <= calc.apply_max_reward(points).expect("max"));
    }

    #[test]
    fn test_governance_setters() {
        let mut calc = AprCalculator::new(AprConfig::default()).expect("calc");
        calc.set_base_apr(800).expect("in range");
        assert_eq!(calc.base_apr(), 800);
        assert!(calc.set_base_apr(50).is_err());
        assert!(calc.set_max_rsi(RSI_BONUS_CEILING_BPS + 1).is_err());
        assert!(calc
            .set_macro_bounds(MacroBounds {
                min_bps: 9_000,
                max_bps: 8_000,
                ..MacroBounds::default()
            })
            .is_err());
        assert!(calc
            .set_rsi_curve(RsiCurve {
                neutral_bps: 2_000,
                oversold_bps: 4_000
            })
            .is_err());
    }

    #[test]
    fn test_bounds_hold_on_random_walk() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut calc = AprCalculator::new(AprConfig::default()).expect("calc");
        let mut price: u64 = 10_000;
        for day in 0..400u64 {
            let step: i64 = rng.gen_range(-500..=500);
            price = (price as i64 + step).max(1) as u64;
            calc.on_new_price(price, START + day * DAY).expect("price");

            let bounds = &calc.config().macro_bounds;
            assert!((bounds.min_bps..=bounds.max_bps).contains(&calc.macro_factor()));
            assert!(calc.rsi_bonus() <= calc.config().max_rsi_bps);
        }
    }
}
