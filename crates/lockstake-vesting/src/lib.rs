//! # lockstake-vesting
//!
//! Vesting positions: delegations locked for a fixed number of weeks in
//! exchange for a bonus reward rate.
//!
//! A position's lifecycle is derived from the clock, never stored:
//!
//! - **Active** - `now < end`
//! - **Maturing** - `end <= now < end + duration`
//! - **Matured** - `now >= end + duration`
//!
//! ## Modules
//!
//! - [`position`] - the position record and its lifecycle
//! - [`store`] - positions keyed by (validator, delegator) with their histories

pub mod position;
pub mod store;

pub use position::{Position, PositionState};
pub use store::{OpenRequest, SlotStatus, VestingPositionStore};

use lockstake_ledger::LedgerError;
use lockstake_types::PositionKey;

/// Error types for vesting operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VestingError {
    /// An unexpired position already occupies the slot.
    #[error("position {0} is active")]
    PositionActive(PositionKey),

    /// The position in the slot has ended but not matured.
    #[error("position {0} is maturing")]
    PositionMaturing(PositionKey),

    /// The matured position in the slot still has unclaimed rewards.
    #[error("position {0} has unclaimed rewards")]
    RewardsNotClaimed(PositionKey),

    /// Swaps need an active source position.
    #[error("source position {0} is not active")]
    OldPositionInactive(PositionKey),

    /// The swap destination slot is occupied.
    #[error("destination slot {0} is unavailable")]
    NewPositionUnavailable(PositionKey),

    /// Top-ups are only allowed while the position is active.
    #[error("position {0} no longer accepts top-ups")]
    TopUpClosed(PositionKey),

    /// No position in the slot.
    #[error("no position at {0}")]
    NoPosition(PositionKey),

    /// The slot still holds principal.
    #[error("slot {0} still holds principal")]
    PrincipalNotZero(PositionKey),

    /// Duration outside `[1, 52]` weeks.
    #[error("invalid vesting duration: {0} weeks")]
    InvalidDuration(u64),

    /// Zero principal.
    #[error("amount must be non-zero")]
    ZeroAmount,

    /// Swap source and destination are the same validator.
    #[error("cannot swap position {0} to its own validator")]
    SameValidator(PositionKey),

    /// Balance-change history rejected the change.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Arithmetic overflow in position times.
    #[error("arithmetic overflow")]
    Overflow,
}

/// Convenience result type for vesting operations.
pub type Result<T> = std::result::Result<T, VestingError>;
