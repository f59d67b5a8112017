//! Integration test: the price feed driving position rates.
//!
//! 1. A falling market raises the macro factor and pays the RSI bonus
//! 2. Positions capture those rates at open and keep them
//! 3. The guard freezes bonuses without touching open positions
//! 4. One vote per day, and a quiet feed reports stale

use lockstake_accountant::AccountingError;
use lockstake_apr::{payout, AprError};
use lockstake_integration_tests::{
    assert_conserved, delegator, engine, run_days, Engine, STAKE, START,
};
use lockstake_types::{Timestamp, DAY};

/// Feed `days` prices, one per day, falling by `step` each day.
fn feed_falling(engine: &mut Engine, from: Timestamp, days: u64, step: u64) -> Timestamp {
    let mut now = from;
    for day in 0..days {
        engine
            .on_new_price(10_000 - day * step, now)
            .expect("price");
        now += DAY;
    }
    now
}

#[test]
fn test_downtrend_raises_captured_rates() {
    let mut engine = engine(1);
    feed_falling(&mut engine, START, 31, 50);

    let apr = engine.apr();
    assert!(apr.macro_factor() > 10_000);
    assert!(apr.macro_factor() <= 12_000);
    assert_eq!(apr.rsi_bonus(), 2_000);
    assert!(apr.effective_base() > 500);

    let captured = engine.apr().snapshot(4).expect("snapshot");
    let now = START + 31 * DAY;
    let position = engine
        .open_position(1, delegator(1), 4, STAKE, now)
        .expect("open");
    assert_eq!(position.rates, captured);
    assert_eq!(position.rates.rsi_bonus_bps, 2_000);
}

#[test]
fn test_guard_keeps_open_positions() {
    let mut engine = engine(1);
    let now = feed_falling(&mut engine, START, 31, 50);
    let position = engine
        .open_position(1, delegator(1), 1, STAKE, now)
        .expect("open");

    engine.guard();
    assert!(engine.apr().is_guarded());
    assert_eq!(engine.apr().macro_factor(), 10_000);
    assert_eq!(engine.apr().rsi_bonus(), 0);
    assert!(!engine.on_new_price(1, now).expect("ignored"));

    let end = run_days(&mut engine, now, 7);
    let receipt = engine.claim(1, delegator(1), end).expect("claim");
    assert_eq!(
        receipt.reward,
        payout::bonused_value(7 * STAKE, &position.rates).expect("value")
    );
    assert_conserved(&engine);

    engine.unguard();
    assert_eq!(engine.apr().rsi_bonus(), 2_000);
}

#[test]
fn test_one_vote_per_day() {
    let mut engine = engine(1);
    engine.on_new_price(1_000, START).expect("first");
    assert!(matches!(
        engine.on_new_price(1_001, START + 60),
        Err(AccountingError::Apr(AprError::PriceAlreadyRecorded { .. }))
    ));
    assert!(matches!(
        engine.on_new_price(1_001, START - 1),
        Err(AccountingError::Apr(AprError::NonMonotonicTimestamp { .. }))
    ));
    assert!(matches!(
        engine.on_new_price(0, START + DAY),
        Err(AccountingError::Apr(AprError::InvalidPrice(0)))
    ));
    assert!(engine.on_new_price(1_001, START + DAY).expect("next day"));
}

#[test]
fn test_staleness() {
    let mut engine = engine(1);
    engine.on_new_price(1_000, START).expect("price");
    assert!(!engine.apr().is_stale(START + DAY));
    assert!(engine.apr().is_stale(START + 3 * DAY));
}

#[test]
fn test_escrow_ceiling_covers_richest_position() {
    let mut engine = engine(1);
    let now = feed_falling(&mut engine, START, 31, 50);
    engine.set_base_apr(2_000).expect("max base");
    let position = engine
        .open_position(1, delegator(1), 52, STAKE, now)
        .expect("open");
    assert_eq!(position.rates.vest_bonus_bps, 1_090);

    let (numerator, denominator) = engine.max_apr();
    let ceiling = STAKE * numerator / denominator;
    let best = payout::bonused_value(STAKE, &position.rates).expect("value");
    assert!(best <= ceiling);
}
