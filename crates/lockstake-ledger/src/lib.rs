//! # lockstake-ledger
//!
//! Append-only histories behind reward accounting.
//!
//! Both histories are written once per epoch at most and never rewritten,
//! which lets claims resolve past state with a binary search instead of
//! replaying every epoch.
//!
//! ## Modules
//!
//! - [`rps`] - per-validator cumulative reward-per-share snapshots
//! - [`balance`] - per-position principal snapshots

pub mod balance;
pub mod rps;

use lockstake_types::{EpochId, Timestamp, ValidatorId};

/// Error types for ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// No snapshot covers the requested point in time, or the supplied
    /// snapshot index is out of range.
    #[error("invalid epoch for validator {validator}: {reason}")]
    InvalidEpoch {
        /// Validator whose ledger was queried.
        validator: ValidatorId,
        /// What was wrong with the query.
        reason: String,
    },

    /// The supplied snapshot index does not match the resolved snapshot.
    #[error("wrong RPS snapshot: supplied index {supplied}, resolved {resolved}")]
    WrongRps {
        /// Index supplied by the caller.
        supplied: usize,
        /// Index the lookup resolved to.
        resolved: usize,
    },

    /// The referenced balance change postdates the target epoch.
    #[error("balance change {index} at epoch {record_epoch} is later than epoch {target_epoch}")]
    EarlyBalanceChange {
        /// Referenced record index.
        index: usize,
        /// Epoch of the referenced record.
        record_epoch: EpochId,
        /// Epoch being resolved.
        target_epoch: EpochId,
    },

    /// A newer balance change still applies to the target epoch.
    #[error("balance change {index} is stale: epoch {next_epoch} also precedes epoch {target_epoch}")]
    LateBalanceChange {
        /// Referenced record index.
        index: usize,
        /// Epoch of the next record, which should have been referenced.
        next_epoch: EpochId,
        /// Epoch being resolved.
        target_epoch: EpochId,
    },

    /// The balance-change index is out of range.
    #[error("balance change index {index} out of range (len {len})")]
    InvalidParamsIndex {
        /// Referenced record index.
        index: usize,
        /// Number of records for the position.
        len: usize,
    },

    /// A balance change was already recorded in this epoch.
    #[error("balance change already made in epoch {epoch}")]
    BalanceChangeAlreadyMade {
        /// Epoch of the rejected change.
        epoch: EpochId,
    },

    /// The position reached its balance-change limit.
    #[error("balance changes exceeded (limit {limit})")]
    BalanceChangesExceeded {
        /// Configured limit.
        limit: usize,
    },

    /// Epoch ids must strictly increase.
    #[error("non-monotonic epoch: {epoch} <= {last}")]
    NonMonotonicEpoch {
        /// Rejected epoch.
        epoch: EpochId,
        /// Last recorded epoch.
        last: EpochId,
    },

    /// Snapshot timestamps must not go backwards.
    #[error("non-monotonic timestamp: {timestamp} < {last}")]
    NonMonotonicTimestamp {
        /// Rejected timestamp.
        timestamp: Timestamp,
        /// Last recorded timestamp.
        last: Timestamp,
    },

    /// Reward cannot be spread over an empty pool.
    #[error("pool of validator {0} has no shares")]
    ZeroShares(ValidatorId),

    /// Arithmetic overflow in a cumulative value.
    #[error("arithmetic overflow")]
    Overflow,
}

/// Convenience result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
