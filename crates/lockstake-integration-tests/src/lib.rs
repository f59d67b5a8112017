//! Integration test crate for the lockstake engine.
//!
//! The library only holds fixtures shared by the scenarios under `tests/`,
//! which exercise the ledger, APR calculator, position store and accountant
//! together.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p lockstake-integration-tests
//! ```

use lockstake_accountant::{
    AccountantConfig, InMemoryTreasury, RewardAccountant, StaticValidatorSet, ValidatorSet,
};
use lockstake_apr::AprConfig;
use lockstake_types::{Amount, DelegatorId, Timestamp, DAY};

/// Simulated start time.
pub const START: Timestamp = 1_700_000_000;

/// A stake that earns exactly this many points per full-uptime epoch.
pub const STAKE: Amount = 1_000_000_000;

/// Accountant over in-memory collaborators.
pub type Engine = RewardAccountant<StaticValidatorSet, InMemoryTreasury>;

/// Delegator id filled with `n`.
pub fn delegator(n: u8) -> DelegatorId {
    [n; 32]
}

/// Engine with validators `1..=validators` at full uptime.
pub fn engine(validators: u64) -> Engine {
    engine_with(validators, AccountantConfig::default(), AprConfig::default())
}

/// Engine with explicit configs.
pub fn engine_with(validators: u64, config: AccountantConfig, apr: AprConfig) -> Engine {
    let set = StaticValidatorSet::new(1..=validators, config.blocks_per_epoch);
    RewardAccountant::new(config, apr, set, InMemoryTreasury::default())
        .expect("valid engine config")
}

/// Close one epoch per day for `days` days and return the new time.
pub fn run_days(engine: &mut Engine, from: Timestamp, days: u64) -> Timestamp {
    let mut now = from;
    for _ in 0..days {
        now += DAY;
        let epoch = engine.validators().current_epoch_id();
        engine.close_epoch(epoch, now).expect("close epoch");
        engine.validators_mut().advance_epoch();
    }
    now
}

/// Assert `escrowed == paid + burned + pending`.
pub fn assert_conserved(engine: &Engine) {
    let treasury = engine.treasury();
    assert_eq!(
        treasury.escrowed,
        treasury.paid + treasury.burned_escrow + engine.total_escrow(),
        "escrow not conserved"
    );
}
