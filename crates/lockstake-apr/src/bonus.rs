//! Vesting-duration bonus table.
//!
//! Longer locks earn a larger bonus on top of the base rate. The per-week
//! increment grows with the duration:
//!
//! | Weeks   | Increment per week |
//! |---------|--------------------|
//! | 1-4     | 10 bps             |
//! | 5-12    | 15 bps             |
//! | 13-26   | 20 bps             |
//! | 27-52   | 25 bps             |
//!
//! so a 52-week lock earns 1,090 bps.

use lockstake_types::MAX_VESTING_WEEKS;

use crate::{AprError, Result};

const TABLE_LEN: usize = MAX_VESTING_WEEKS as usize;

/// Bonus in bps for `weeks` = index + 1.
pub const VESTING_BONUS_BPS: [u64; TABLE_LEN] = build_table();

const fn increment(week: u64) -> u64 {
    if week <= 4 {
        10
    } else if week <= 12 {
        15
    } else if week <= 26 {
        20
    } else {
        25
    }
}

const fn build_table() -> [u64; TABLE_LEN] {
    let mut table = [0u64; TABLE_LEN];
    let mut acc = 0;
    let mut i = 0;
    while i < TABLE_LEN {
        acc += increment(i as u64 + 1);
        table[i] = acc;
        i += 1;
    }
    table
}

/// Look up the bonus for a lock of `weeks`.
///
/// # Errors
///
/// - [`AprError::InvalidDuration`] if `weeks` is outside `[1, 52]`
pub fn vesting_bonus(weeks: u64) -> Result<u64> {
    if weeks == 0 || weeks > MAX_VESTING_WEEKS {
        return Err(AprError::InvalidDuration(weeks));
    }
    Ok(VESTING_BONUS_BPS[(weeks - 1) as usize])
}

/// Bonus of the longest lock.
pub fn max_vesting_bonus() -> u64 {
    VESTING_BONUS_BPS[TABLE_LEN - 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_points() {
        assert_eq!(vesting_bonus(1).expect("1w"), 10);
        assert_eq!(vesting_bonus(4).expect("4w"), 40);
        assert_eq!(vesting_bonus(12).expect("12w"), 160);
        assert_eq!(vesting_bonus(26).expect("26w"), 440);
        assert_eq!(vesting_bonus(52).expect("52w"), 1_090);
        assert_eq!(max_vesting_bonus(), 1_090);
    }

    #[test]
    fn test_monotonic() {
        for w in 1..MAX_VESTING_WEEKS {
            let a = vesting_bonus(w).expect("w");
            let b = vesting_bonus(w + 1).expect("w+1");
            assert!(a <= b, "bonus decreased at week {w}");
        }
    }

    #[test]
    fn test_out_of_range() {
        assert_eq!(vesting_bonus(0), Err(AprError::InvalidDuration(0)));
        assert_eq!(vesting_bonus(53), Err(AprError::InvalidDuration(53)));
    }
}
