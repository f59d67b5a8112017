//! Balance-change history of vesting positions.
//!
//! Every principal-altering event on a position (open, top-up, cut, swap)
//! records the post-change principal under the epoch it happened in. Claims
//! use the history to find the principal that was staked when a past reward
//! snapshot was taken.
//!
//! ## Abuse limits
//!
//! - At most one record per epoch per position.
//! - At most `threshold` records per position until it is closed, not
//!   counting withdrawals after the position ended.

use std::collections::BTreeMap;

use lockstake_types::{Amount, EpochId, PositionKey};
use serde::{Deserialize, Serialize};

use crate::{LedgerError, Result};

/// Default number of balance changes a position may record.
pub const DEFAULT_BALANCE_CHANGE_THRESHOLD: usize = 64;

/// Principal in force from `epoch` until the next record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceChangeRecord {
    /// Epoch of the change.
    pub epoch: EpochId,
    /// Principal after the change.
    pub principal: Amount,
}

/// Per-position principal snapshots.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BalanceChangeHistory {
    records: BTreeMap<PositionKey, Vec<BalanceChangeRecord>>,
    threshold: usize,
}

impl Default for BalanceChangeHistory {
    fn default() -> Self {
        Self::new(DEFAULT_BALANCE_CHANGE_THRESHOLD)
    }
}

impl BalanceChangeHistory {
    /// Create an empty history with the given per-position limit.
    pub fn new(threshold: usize) -> Self {
        Self {
            records: BTreeMap::new(),
            threshold,
        }
    }

    /// Current per-position limit.
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Change the per-position limit. Existing histories are kept as they are.
    pub fn set_threshold(&mut self, threshold: usize) {
        self.threshold = threshold;
    }

    /// Check whether a record for `epoch` would be accepted.
    ///
    /// # Errors
    ///
    /// Same as [`append`](Self::append).
    pub fn ensure_can_append(&self, key: &PositionKey, epoch: EpochId) -> Result<()> {
        self.check(key, epoch, true)
    }

    /// Check whether a record for `epoch` would be accepted without the
    /// record-count limit.
    ///
    /// # Errors
    ///
    /// Same as [`append_uncapped`](Self::append_uncapped).
    pub fn ensure_can_append_uncapped(&self, key: &PositionKey, epoch: EpochId) -> Result<()> {
        self.check(key, epoch, false)
    }

    fn check(&self, key: &PositionKey, epoch: EpochId, capped: bool) -> Result<()> {
        let records = self.records(key);
        if let Some(last) = records.last() {
            if last.epoch == epoch {
                return Err(LedgerError::BalanceChangeAlreadyMade { epoch });
            }
            if epoch < last.epoch {
                return Err(LedgerError::NonMonotonicEpoch {
                    epoch,
                    last: last.epoch,
                });
            }
        }
        if capped && records.len() >= self.threshold {
            return Err(LedgerError::BalanceChangesExceeded {
                limit: self.threshold,
            });
        }
        Ok(())
    }

    /// Record the principal of `key` after a change in `epoch`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::BalanceChangeAlreadyMade`] if `key` already changed in `epoch`
    /// - [`LedgerError::NonMonotonicEpoch`] if `epoch` precedes the last record
    /// - [`LedgerError::BalanceChangesExceeded`] if the limit is reached
    pub fn append(&mut self, key: PositionKey, epoch: EpochId, principal: Amount) -> Result<()> {
        self.ensure_can_append(&key, epoch)?;
        self.push(key, epoch, principal);
        Ok(())
    }

    /// Record a change that no end-of-vesting lookup can resolve to, such as
    /// a withdrawal after the position ended. The record-count limit does not
    /// apply; one record per epoch still does.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::BalanceChangeAlreadyMade`] if `key` already changed in `epoch`
    /// - [`LedgerError::NonMonotonicEpoch`] if `epoch` precedes the last record
    pub fn append_uncapped(
        &mut self,
        key: PositionKey,
        epoch: EpochId,
        principal: Amount,
    ) -> Result<()> {
        self.ensure_can_append_uncapped(&key, epoch)?;
        self.push(key, epoch, principal);
        Ok(())
    }

    fn push(&mut self, key: PositionKey, epoch: EpochId, principal: Amount) {
        let records = self.records.entry(key).or_default();
        records.push(BalanceChangeRecord { epoch, principal });

        tracing::trace!(
            %key,
            epoch,
            principal,
            count = records.len(),
            "ledger: recorded balance change"
        );
    }

    /// All records of a position, oldest first.
    pub fn records(&self, key: &PositionKey) -> &[BalanceChangeRecord] {
        self.records.get(key).map_or(&[], Vec::as_slice)
    }

    /// Number of records of a position.
    pub fn count(&self, key: &PositionKey) -> usize {
        self.records(key).len()
    }

    /// Find the latest record at or before `epoch`.
    ///
    /// Returns the record index and the principal in force.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidParamsIndex`] if the position has no records
    /// - [`LedgerError::EarlyBalanceChange`] if every record postdates `epoch`
    pub fn principal_at(&self, key: &PositionKey, epoch: EpochId) -> Result<(usize, Amount)> {
        let records = self.records(key);
        let first = records
            .first()
            .ok_or(LedgerError::InvalidParamsIndex { index: 0, len: 0 })?;

        let after = records.partition_point(|r| r.epoch <= epoch);
        if after == 0 {
            return Err(LedgerError::EarlyBalanceChange {
                index: 0,
                record_epoch: first.epoch,
                target_epoch: epoch,
            });
        }
        let index = after - 1;
        Ok((index, records[index].principal))
    }

    /// Validate a caller-supplied record index for `epoch` and return its principal.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidParamsIndex`] if `index` is out of range
    /// - [`LedgerError::EarlyBalanceChange`] if record `index` postdates `epoch`
    /// - [`LedgerError::LateBalanceChange`] if a later record also precedes `epoch`
    pub fn principal_at_checked(
        &self,
        key: &PositionKey,
        epoch: EpochId,
        index: usize,
    ) -> Result<Amount> {
        let records = self.records(key);
        let record = records.get(index).ok_or(LedgerError::InvalidParamsIndex {
            index,
            len: records.len(),
        })?;

        if record.epoch > epoch {
            return Err(LedgerError::EarlyBalanceChange {
                index,
                record_epoch: record.epoch,
                target_epoch: epoch,
            });
        }
        if let Some(next) = records.get(index + 1) {
            if next.epoch <= epoch {
                return Err(LedgerError::LateBalanceChange {
                    index,
                    next_epoch: next.epoch,
                    target_epoch: epoch,
                });
            }
        }
        Ok(record.principal)
    }

    /// Drop the whole history of a position.
    pub fn clear(&mut self, key: &PositionKey) {
        if let Some(removed) = self.records.remove(key) {
            tracing::trace!(%key, removed = removed.len(), "ledger: cleared balance history");
        }
    }

    /// Move the history of `from` to `to`, replacing whatever `to` held.
    pub fn transfer(&mut self, from: &PositionKey, to: PositionKey) {
        let moved = self.records.remove(from).unwrap_or_default();
        if moved.is_empty() {
            self.records.remove(&to);
        } else {
            self.records.insert(to, moved);
        }
    }
}
