//! The vesting position record and its lifecycle.

use lockstake_apr::RateSnapshot;
use lockstake_types::{math, PositionKey, Timestamp, ValidatorId, DelegatorId, WEEK};
use serde::{Deserialize, Serialize};

use crate::{Result, VestingError};

/// Lifecycle state of a position at a point in time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionState {
    /// Locked; accrues bonused reward.
    Active,
    /// Ended; bonused reward is claimable, new reward accrues at the base rate.
    Maturing,
    /// Fully matured; the slot can be reused once empty and claimed.
    Matured,
}

/// A vesting position. Times and rates are fixed until the position closes;
/// only a swap changes the validator and commission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Validator the position is delegated to.
    pub validator: ValidatorId,
    /// Owner of the position.
    pub delegator: DelegatorId,
    /// Lock start.
    pub start: Timestamp,
    /// Lock length in seconds.
    pub duration: u64,
    /// `start + duration`.
    pub end: Timestamp,
    /// Rates captured at open.
    pub rates: RateSnapshot,
    /// Validator commission in force for this position.
    pub commission_bps: u64,
}

impl Position {
    /// Build a position locked for `weeks` from `start`.
    ///
    /// # Errors
    ///
    /// - [`VestingError::Overflow`] if the end time overflows
    pub fn new(
        key: PositionKey,
        start: Timestamp,
        weeks: u64,
        rates: RateSnapshot,
        commission_bps: u64,
    ) -> Result<Self> {
        let duration = weeks.checked_mul(WEEK).ok_or(VestingError::Overflow)?;
        let end = start.checked_add(duration).ok_or(VestingError::Overflow)?;
        Ok(Self {
            validator: key.validator,
            delegator: key.delegator,
            start,
            duration,
            end,
            rates,
            commission_bps,
        })
    }

    /// Storage key of the position.
    pub fn key(&self) -> PositionKey {
        PositionKey::new(self.validator, self.delegator)
    }

    /// End of the maturing window.
    pub fn matured_at(&self) -> Timestamp {
        self.end.saturating_add(self.duration)
    }

    /// Lifecycle state at `now`.
    pub fn state(&self, now: Timestamp) -> PositionState {
        if now < self.end {
            PositionState::Active
        } else if now < self.matured_at() {
            PositionState::Maturing
        } else {
            PositionState::Matured
        }
    }

    /// Whole weeks left until `end`, rounded up; zero once ended.
    pub fn weeks_remaining(&self, now: Timestamp) -> u64 {
        let left = self.end.saturating_sub(now);
        math::ceil_div(u128::from(left), u128::from(WEEK)).map_or(0, |w| w as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const START: Timestamp = 1_700_000_000;

    fn position(weeks: u64) -> Position {
        let rates = RateSnapshot {
            base_bps: 500,
            vest_bonus_bps: 10,
            rsi_bonus_bps: 0,
        };
        Position::new(PositionKey::new(1, [0x01; 32]), START, weeks, rates, 1_000)
            .expect("position")
    }

    #[test]
    fn test_times() {
        let p = position(2);
        assert_eq!(p.duration, 2 * WEEK);
        assert_eq!(p.end, START + 2 * WEEK);
        assert_eq!(p.matured_at(), START + 4 * WEEK);
    }

    #[test]
    fn test_lifecycle_boundaries() {
        let p = position(1);
        assert_eq!(p.state(START), PositionState::Active);
        assert_eq!(p.state(p.end - 1), PositionState::Active);
        assert_eq!(p.state(p.end), PositionState::Maturing);
        assert_eq!(p.state(p.matured_at() - 1), PositionState::Maturing);
        assert_eq!(p.state(p.matured_at()), PositionState::Matured);
    }

    #[test]
    fn test_weeks_remaining_rounds_up() {
        let p = position(10);
        assert_eq!(p.weeks_remaining(START), 10);
        assert_eq!(p.weeks_remaining(START + 1), 10);
        assert_eq!(p.weeks_remaining(p.end - WEEK), 1);
        assert_eq!(p.weeks_remaining(p.end - 1), 1);
        assert_eq!(p.weeks_remaining(p.end), 0);
        assert_eq!(p.weeks_remaining(p.end + WEEK), 0);
    }

    #[test]
    fn test_key_roundtrip() {
        let p = position(1);
        assert_eq!(p.key(), PositionKey::new(1, [0x01; 32]));
    }
}
