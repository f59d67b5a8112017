//! Early-exit penalty.
//!
//! Cutting principal from an active position burns
//! `weekly_bps * weeks_remaining` of the removed amount, capped at all of it.

use lockstake_types::{math, Amount, BPS_DENOMINATOR};

use crate::Result;

/// Penalty rate for exiting with `weeks_remaining` left.
pub fn penalty_bps(weeks_remaining: u64, weekly_bps: u64) -> u64 {
    weeks_remaining
        .saturating_mul(weekly_bps)
        .min(BPS_DENOMINATOR)
}

/// Amount burned when `removed` leaves a position early.
///
/// # Errors
///
/// - [`AccountingError::Overflow`](crate::AccountingError::Overflow) on arithmetic overflow
pub fn early_exit_penalty(removed: Amount, weeks_remaining: u64, weekly_bps: u64) -> Result<Amount> {
    Ok(math::apply_bps(removed, penalty_bps(weeks_remaining, weekly_bps))?)
}
