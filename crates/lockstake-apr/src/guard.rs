//! Emergency guard and feed staleness.
//!
//! Governance can guard the calculator when the price feed misbehaves.
//! While guarded the macro factor sits at its default, the RSI bonus is zero
//! and new prices are ignored. Separately, a feed that has not delivered a
//! price within the staleness threshold is reported as stale so hosts can
//! alert before guarding.

use lockstake_types::{Timestamp, DAY};
use serde::{Deserialize, Serialize};

/// Default staleness threshold (two days without a price).
pub const STALENESS_THRESHOLD: u64 = 2 * DAY;

/// Guard flag plus the time of the last admitted price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Guard {
    guarded: bool,
    last_price_time: Option<Timestamp>,
    staleness_threshold: u64,
}

impl Default for Guard {
    fn default() -> Self {
        Self::with_threshold(STALENESS_THRESHOLD)
    }
}

impl Guard {
    /// Create an unguarded guard with a custom staleness threshold.
    pub fn with_threshold(staleness_threshold: u64) -> Self {
        Self {
            guarded: false,
            last_price_time: None,
            staleness_threshold,
        }
    }

    /// Record an admitted price.
    pub fn record_price(&mut self, timestamp: Timestamp) {
        self.last_price_time = Some(timestamp);
    }

    /// Whether the feed missed the staleness window. A feed that never
    /// delivered a price is not stale.
    pub fn is_stale(&self, now: Timestamp) -> bool {
        self.last_price_time
            .is_some_and(|last| now.saturating_sub(last) > self.staleness_threshold)
    }

    /// Freeze the calculator.
    pub fn engage(&mut self) {
        if !self.guarded {
            tracing::warn!("apr guard engaged: macro factor and RSI bonus frozen");
        }
        self.guarded = true;
    }

    /// Unfreeze the calculator.
    pub fn release(&mut self) {
        if self.guarded {
            tracing::info!("apr guard released");
        }
        self.guarded = false;
    }

    /// Whether the calculator is frozen.
    pub fn is_guarded(&self) -> bool {
        self.guarded
    }

    /// Time of the last admitted price.
    pub fn last_price_time(&self) -> Option<Timestamp> {
        self.last_price_time
    }

    /// Configured staleness threshold in seconds.
    pub fn staleness_threshold(&self) -> u64 {
        self.staleness_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_guard() {
        let g = Guard::default();
        assert!(!g.is_guarded());
        assert_eq!(g.staleness_threshold(), STALENESS_THRESHOLD);
        assert_eq!(g.last_price_time(), None);
    }

    #[test]
    fn test_engage_and_release() {
        let mut g = Guard::default();
        g.engage();
        assert!(g.is_guarded());
        g.engage();
        assert!(g.is_guarded());
        g.release();
        assert!(!g.is_guarded());
    }

    #[test]
    fn test_staleness() {
        let mut g = Guard::with_threshold(60);
        assert!(!g.is_stale(1_000_000));

        g.record_price(1_000);
        assert!(!g.is_stale(1_060));
        assert!(g.is_stale(1_061));
    }
}
