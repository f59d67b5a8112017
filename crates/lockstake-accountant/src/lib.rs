//! # lockstake-accountant
//!
//! The reward accountant: delegation pools, epoch accrual, vesting position
//! operations and claims.
//!
//! ## Flow
//!
//! 1. Epoch close appends one RPS snapshot per rewarded validator and escrows
//!    the most those points could ever be worth.
//! 2. Every principal change settles the delegator's accumulator into
//!    pending bonused / plain points and records a balance change.
//! 3. A claim converts pending points into currency with the rates the
//!    position captured at open, pays delegator and commission, and burns the
//!    unused part of the escrow.
//!
//! All operations validate before they mutate, so a failed call leaves the
//! accountant unchanged. The accountant is a single writer: hosts that
//! process keys in parallel must serialize access per validator.
//!
//! ## Modules
//!
//! - [`config`] - accountant configuration
//! - [`interfaces`] - validator-set and treasury collaborators
//! - [`pool`] - delegation pools and stake records
//! - [`penalty`] - early-exit penalty
//! - [`accountant`] - the accountant, delegation and epoch close
//! - [`positions`] - open, top-up, cut and swap
//! - [`claims`] - claims and reward getters

pub mod accountant;
pub mod claims;
pub mod config;
pub mod interfaces;
pub mod penalty;
pub mod pool;
pub mod positions;

#[cfg(test)]
pub(crate) mod fixtures;

pub use accountant::{EpochSummary, RewardAccountant};
pub use claims::{ClaimHints, ClaimReceipt};
pub use config::AccountantConfig;
pub use interfaces::{
    BurnReason, InMemoryTreasury, Payee, StaticValidatorSet, Treasury, ValidatorSet,
};
pub use pool::{DelegationPool, Stake};
pub use positions::{CutReceipt, SwapReceipt};

use lockstake_apr::AprError;
use lockstake_ledger::LedgerError;
use lockstake_types::math::MathError;
use lockstake_types::{Amount, EpochId, PositionKey, ValidatorId};
use lockstake_vesting::VestingError;

/// Error types for accounting operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountingError {
    /// Historical lookup or balance-change limit failure.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Rate calculation failure.
    #[error(transparent)]
    Apr(#[from] AprError),

    /// Position lifecycle violation.
    #[error(transparent)]
    Vesting(#[from] VestingError),

    /// More principal requested than staked.
    #[error("insufficient principal: requested {requested}, available {available}")]
    InsufficientPrincipal {
        /// Requested amount.
        requested: Amount,
        /// Staked amount.
        available: Amount,
    },

    /// Zero amount.
    #[error("amount must be non-zero")]
    ZeroAmount,

    /// The validator is not in the active set.
    #[error("validator {0} is not active")]
    ValidatorInactive(ValidatorId),

    /// Plain delegation calls on a slot that holds a vesting position.
    #[error("slot {0} holds a vesting position")]
    PositionExists(PositionKey),

    /// A position cannot open over plain stake in the same slot.
    #[error("slot {0} holds a plain delegation")]
    DelegationExists(PositionKey),

    /// The epoch was already closed.
    #[error("epoch {epoch} already closed (last closed {last})")]
    EpochAlreadyClosed {
        /// Rejected epoch.
        epoch: EpochId,
        /// Last closed epoch.
        last: EpochId,
    },

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

    /// An amount that can never go negative did. This is a bug.
    #[error("accounting invariant violated: {0}")]
    InvariantViolation(&'static str),
}

impl From<MathError> for AccountingError {
    fn from(err: MathError) -> Self {
        match err {
            MathError::Overflow | MathError::DivisionByZero => AccountingError::Overflow,
            MathError::Underflow => invariant("negative amount"),
        }
    }
}

/// Log and build an invariant violation.
pub(crate) fn invariant(what: &'static str) -> AccountingError {
    tracing::error!(what, "accounting invariant violated");
    AccountingError::InvariantViolation(what)
}

/// Convenience result type for accounting operations.
pub type Result<T> = std::result::Result<T, AccountingError>;
