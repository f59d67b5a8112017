//! Daily price series.
//!
//! Holds the two SMA windows with running sums and the smoothed average
//! gain/loss used for the RSI oscillator. Smoothing follows Wilder:
//!
//! ```text
//! avg = (avg * (n - 1) + delta) / n
//! ```
//!
//! During the first `n` deltas the averages are plain running means, so the
//! oscillator is not biased towards zero while warming up.

use std::collections::VecDeque;

use lockstake_types::{Timestamp, BPS_DENOMINATOR};
use serde::{Deserialize, Serialize};

use crate::{AprError, Result};

/// Fixed-point scale of the smoothed gain/loss averages.
pub const AVG_SCALE: u128 = 1_000_000;

/// Price history and derived indicator state.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PriceSeries {
    fast_window: VecDeque<u64>,
    slow_window: VecDeque<u64>,
    fast_sma_sum: u128,
    slow_sma_sum: u128,
    avg_gain: u128,
    avg_loss: u128,
    deltas_seen: u64,
    latest_price: Option<u64>,
    latest_timestamp: Option<Timestamp>,
    /// Current macro factor in bps.
    pub macro_factor_bps: u64,
    /// Current RSI bonus in bps.
    pub rsi_bonus_bps: u64,
}

impl PriceSeries {
    /// Create an empty series with the given initial macro factor.
    pub fn new(macro_factor_bps: u64) -> Self {
        Self {
            macro_factor_bps,
            ..Self::default()
        }
    }

    /// Push a price, evicting the oldest entries of full windows.
    ///
    /// Nothing is written if any running value would overflow.
    ///
    /// # Errors
    ///
    /// - [`AprError::Overflow`] if a window sum or a smoothed average overflows
    pub fn push(
        &mut self,
        price: u64,
        timestamp: Timestamp,
        fast_len: usize,
        slow_len: usize,
        rsi_period: u64,
    ) -> Result<()> {
        let (avg_gain, avg_loss, deltas_seen) = match self.latest_price {
            Some(previous) => {
                let gain = scaled(price.saturating_sub(previous))?;
                let loss = scaled(previous.saturating_sub(price))?;
                let n = u128::from(self.deltas_seen.min(rsi_period.saturating_sub(1))) + 1;
                (
                    smooth(self.avg_gain, gain, n)?,
                    smooth(self.avg_loss, loss, n)?,
                    self.deltas_seen.checked_add(1).ok_or(AprError::Overflow)?,
                )
            }
            None => (self.avg_gain, self.avg_loss, self.deltas_seen),
        };
        let fast_sum = sum_after_push(&self.fast_window, self.fast_sma_sum, price, fast_len)?;
        let slow_sum = sum_after_push(&self.slow_window, self.slow_sma_sum, price, slow_len)?;

        push_window(&mut self.fast_window, price, fast_len);
        push_window(&mut self.slow_window, price, slow_len);
        self.fast_sma_sum = fast_sum;
        self.slow_sma_sum = slow_sum;
        self.avg_gain = avg_gain;
        self.avg_loss = avg_loss;
        self.deltas_seen = deltas_seen;
        self.latest_price = Some(price);
        self.latest_timestamp = Some(timestamp);
        Ok(())
    }

    /// Fast SMA once the fast window is full.
    pub fn fast_sma(&self, fast_len: usize) -> Option<u128> {
        full_average(&self.fast_window, self.fast_sma_sum, fast_len)
    }

    /// Slow SMA once the slow window is full.
    pub fn slow_sma(&self, slow_len: usize) -> Option<u128> {
        full_average(&self.slow_window, self.slow_sma_sum, slow_len)
    }

    /// RSI in bps once `rsi_period` deltas have been observed.
    ///
    /// A flat market reads as neutral (5,000 bps); a market without losses
    /// reads 10,000 bps.
    pub fn rsi_bps(&self, rsi_period: u64) -> Option<u64> {
        if self.deltas_seen < rsi_period {
            return None;
        }
        let total = self.avg_gain + self.avg_loss;
        if total == 0 {
            return Some(BPS_DENOMINATOR / 2);
        }
        let rsi = self.avg_gain * u128::from(BPS_DENOMINATOR) / total;
        Some(rsi as u64)
    }

    /// Smoothed average gain, scaled by [`AVG_SCALE`].
    pub fn avg_gain(&self) -> u128 {
        self.avg_gain
    }

    /// Smoothed average loss, scaled by [`AVG_SCALE`].
    pub fn avg_loss(&self) -> u128 {
        self.avg_loss
    }

    /// Last admitted price.
    pub fn latest_price(&self) -> Option<u64> {
        self.latest_price
    }

    /// Timestamp of the last admitted price.
    pub fn latest_timestamp(&self) -> Option<Timestamp> {
        self.latest_timestamp
    }

    /// Number of prices in the slow window.
    pub fn len(&self) -> usize {
        self.slow_window.len()
    }

    /// Whether no price has been admitted yet.
    pub fn is_empty(&self) -> bool {
        self.latest_price.is_none()
    }
}

fn scaled(delta: u64) -> Result<u128> {
    u128::from(delta)
        .checked_mul(AVG_SCALE)
        .ok_or(AprError::Overflow)
}

/// `(avg * (n - 1) + delta) / n`
fn smooth(avg: u128, delta: u128, n: u128) -> Result<u128> {
    avg.checked_mul(n - 1)
        .and_then(|weighted| weighted.checked_add(delta))
        .map(|total| total / n)
        .ok_or(AprError::Overflow)
}

/// Window sum after pushing `price` and evicting down to `capacity`.
fn sum_after_push(window: &VecDeque<u64>, sum: u128, price: u64, capacity: usize) -> Result<u128> {
    if capacity == 0 {
        return Ok(sum);
    }
    let evicted: u128 = window
        .iter()
        .take((window.len() + 1).saturating_sub(capacity))
        .map(|&p| u128::from(p))
        .sum();
    sum.checked_sub(evicted)
        .and_then(|kept| kept.checked_add(u128::from(price)))
        .ok_or(AprError::Overflow)
}

fn push_window(window: &mut VecDeque<u64>, price: u64, capacity: usize) {
    if capacity == 0 {
        return;
    }
    while window.len() >= capacity {
        window.pop_front();
    }
    window.push_back(price);
}

fn full_average(window: &VecDeque<u64>, sum: u128, capacity: usize) -> Option<u128> {
    if capacity == 0 || window.len() < capacity {
        return None;
    }
    Some(sum / capacity as u128)
}
