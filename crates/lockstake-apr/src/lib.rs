//! # lockstake-apr
//!
//! Dynamic APR calculation for vesting positions.
//!
//! The effective base rate is the governance base APR scaled by a macro
//! factor derived from a dual simple-moving-average crossover of the daily
//! price feed. Positions additionally earn a duration bonus from a static
//! table and an RSI bonus captured while the market is oversold.
//!
//! ## Modules
//!
//! - [`bonus`] - vesting-duration bonus table
//! - [`series`] - daily price series (SMA windows, smoothed gain/loss)
//! - [`curve`] - macro-factor mapping and RSI bonus curve
//! - [`guard`] - emergency guard and feed staleness
//! - [`calculator`] - the APR calculator and its configuration
//! - [`payout`] - conversion of reward points into currency

pub mod bonus;
pub mod calculator;
pub mod curve;
pub mod guard;
pub mod payout;
pub mod series;

pub use calculator::{AprCalculator, AprConfig, RateSnapshot};

use lockstake_types::Timestamp;

/// Error types for APR operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AprError {
    /// Price is zero.
    #[error("invalid price: {0}")]
    InvalidPrice(u64),

    /// Price timestamp is not strictly increasing.
    #[error("non-monotonic timestamp: {new} <= {last}")]
    NonMonotonicTimestamp {
        /// The rejected timestamp.
        new: Timestamp,
        /// The last accepted timestamp.
        last: Timestamp,
    },

    /// A price was already admitted for this day.
    #[error("price already recorded for day {day}")]
    PriceAlreadyRecorded {
        /// Day number (timestamp / 86400).
        day: u64,
    },

    /// Vesting duration outside `[1, 52]` weeks.
    #[error("invalid vesting duration: {0} weeks")]
    InvalidDuration(u64),

    /// A governance parameter is outside its allowed range.
    #[error("parameter {name} out of bounds: {value}")]
    ParameterOutOfBounds {
        /// Parameter name.
        name: &'static str,
        /// Rejected value.
        value: u64,
    },

    /// Arithmetic overflow.
    #[error("arithmetic overflow")]
    Overflow,
}

/// Convenience result type for APR operations.
pub type Result<T> = std::result::Result<T, AprError>;
