//! Shared unit-test setup.

use lockstake_apr::AprConfig;
use lockstake_types::{Amount, DelegatorId, Timestamp};

use crate::accountant::RewardAccountant;
use crate::config::AccountantConfig;
use crate::interfaces::{InMemoryTreasury, StaticValidatorSet, ValidatorSet};

pub(crate) use lockstake_types::{DAY, WEEK};

pub(crate) const START: Timestamp = 1_700_000_000;
pub(crate) const STAKE: Amount = 1_000_000_000;

pub(crate) type TestAccountant = RewardAccountant<StaticValidatorSet, InMemoryTreasury>;

pub(crate) fn delegator(n: u8) -> DelegatorId {
    [n; 32]
}

/// Validators 1, 2 and 3 with full uptime.
pub(crate) fn validators() -> StaticValidatorSet {
    StaticValidatorSet::new([1, 2, 3], 100)
}

pub(crate) fn accountant() -> TestAccountant {
    RewardAccountant::new(
        AccountantConfig::default(),
        AprConfig::default(),
        validators(),
        InMemoryTreasury::default(),
    )
    .expect("accountant")
}

/// Close one epoch per day for `days` days and return the new time.
pub(crate) fn run_days(acc: &mut TestAccountant, from: Timestamp, days: u64) -> Timestamp {
    let mut now = from;
    for _ in 0..days {
        now += DAY;
        let epoch = acc.validators().current_epoch_id();
        acc.close_epoch(epoch, now).expect("close epoch");
        acc.validators_mut().advance_epoch();
    }
    now
}
