//! Cumulative reward-per-share (RPS) ledger.
//!
//! Each validator owns an append-only list of snapshots. Closing an epoch in
//! which the validator earned reward appends one snapshot:
//!
//! ```text
//! cumulative_rps += delta_points * PRECISION / total_shares
//! ```
//!
//! A delegator's raw points between two snapshots are
//! `(rps_b - rps_a) * principal / PRECISION`. The ledger carries no rates;
//! currency conversion happens at claim time.

use std::collections::BTreeMap;

use lockstake_types::{math, EpochId, Timestamp, ValidatorId, PRECISION};
use serde::{Deserialize, Serialize};

use crate::{LedgerError, Result};

/// One immutable point of a validator's reward history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpsSnapshot {
    /// Epoch that produced the reward.
    pub epoch: EpochId,
    /// Epoch close time.
    pub timestamp: Timestamp,
    /// Running reward-per-share, scaled by [`PRECISION`].
    pub cumulative_rps: u128,
}

/// A validated snapshot waiting for [`RewardLedger::commit`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingSnapshot {
    validator: ValidatorId,
    delta_rps: u128,
    snapshot: RpsSnapshot,
}

impl PendingSnapshot {
    /// Validator the snapshot belongs to.
    pub fn validator(&self) -> ValidatorId {
        self.validator
    }

    /// The snapshot that will be written.
    pub fn snapshot(&self) -> &RpsSnapshot {
        &self.snapshot
    }
}

/// Append-only reward-per-share history for every validator.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RewardLedger {
    series: BTreeMap<ValidatorId, Vec<RpsSnapshot>>,
}

impl RewardLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Spread `delta_points` over `total_shares` and append a snapshot.
    ///
    /// # Errors
    ///
    /// Same as [`prepare`](Self::prepare).
    pub fn append(
        &mut self,
        validator: ValidatorId,
        epoch: EpochId,
        timestamp: Timestamp,
        delta_points: u128,
        total_shares: u128,
    ) -> Result<RpsSnapshot> {
        let pending = self.prepare(validator, epoch, timestamp, delta_points, total_shares)?;
        Ok(self.commit(pending))
    }

    /// Compute the snapshot [`append`](Self::append) would write, without
    /// writing it.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::ZeroShares`] if `total_shares` is zero
    /// - [`LedgerError::NonMonotonicEpoch`] if `epoch` does not follow the last snapshot
    /// - [`LedgerError::NonMonotonicTimestamp`] if `timestamp` precedes the last snapshot
    /// - [`LedgerError::Overflow`] if the cumulative value overflows
    pub fn prepare(
        &self,
        validator: ValidatorId,
        epoch: EpochId,
        timestamp: Timestamp,
        delta_points: u128,
        total_shares: u128,
    ) -> Result<PendingSnapshot> {
        if total_shares == 0 {
            return Err(LedgerError::ZeroShares(validator));
        }

        let previous = match self.snapshots(validator).last() {
            Some(last) => {
                if epoch <= last.epoch {
                    return Err(LedgerError::NonMonotonicEpoch {
                        epoch,
                        last: last.epoch,
                    });
                }
                if timestamp < last.timestamp {
                    return Err(LedgerError::NonMonotonicTimestamp {
                        timestamp,
                        last: last.timestamp,
                    });
                }
                last.cumulative_rps
            }
            None => 0,
        };

        let delta_rps = math::mul_div(delta_points, PRECISION, total_shares)
            .map_err(|_| LedgerError::Overflow)?;
        let cumulative_rps = previous
            .checked_add(delta_rps)
            .ok_or(LedgerError::Overflow)?;

        Ok(PendingSnapshot {
            validator,
            delta_rps,
            snapshot: RpsSnapshot {
                epoch,
                timestamp,
                cumulative_rps,
            },
        })
    }

    /// Write a snapshot produced by [`prepare`](Self::prepare).
    ///
    /// The snapshot must have been prepared against the ledger as it is now;
    /// committing a stale one breaks the ordering of the series.
    pub fn commit(&mut self, pending: PendingSnapshot) -> RpsSnapshot {
        let PendingSnapshot {
            validator,
            delta_rps,
            snapshot,
        } = pending;
        self.series.entry(validator).or_default().push(snapshot);

        tracing::trace!(
            validator,
            epoch = snapshot.epoch,
            delta_rps,
            cumulative_rps = snapshot.cumulative_rps,
            "ledger: appended RPS snapshot"
        );
        snapshot
    }

    /// Latest cumulative RPS of a validator, zero before its first reward.
    pub fn current(&self, validator: ValidatorId) -> u128 {
        self.snapshots(validator)
            .last()
            .map_or(0, |s| s.cumulative_rps)
    }

    /// All snapshots of a validator, oldest first.
    pub fn snapshots(&self, validator: ValidatorId) -> &[RpsSnapshot] {
        self.series.get(&validator).map_or(&[], Vec::as_slice)
    }

    /// Find the latest snapshot taken at or before `timestamp`.
    ///
    /// Returns the snapshot index and its cumulative RPS.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidEpoch`] if the ledger is empty or `timestamp`
    ///   precedes the first snapshot
    pub fn cumulative_at(
        &self,
        validator: ValidatorId,
        timestamp: Timestamp,
    ) -> Result<(usize, RpsSnapshot)> {
        let series = self.snapshots(validator);
        if series.is_empty() {
            return Err(LedgerError::InvalidEpoch {
                validator,
                reason: "no reward snapshots".to_string(),
            });
        }

        let after = series.partition_point(|s| s.timestamp <= timestamp);
        if after == 0 {
            return Err(LedgerError::InvalidEpoch {
                validator,
                reason: format!(
                    "timestamp {timestamp} precedes first snapshot at {}",
                    series[0].timestamp
                ),
            });
        }

        let index = after - 1;
        Ok((index, series[index]))
    }

    /// Like [`cumulative_at`](Self::cumulative_at), but the caller names the
    /// snapshot index it expects.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidEpoch`] if `epoch_index` is out of range or no
    ///   snapshot covers `timestamp`
    /// - [`LedgerError::WrongRps`] if `epoch_index` is not the resolved snapshot
    pub fn cumulative_at_checked(
        &self,
        validator: ValidatorId,
        timestamp: Timestamp,
        epoch_index: usize,
    ) -> Result<RpsSnapshot> {
        let len = self.snapshots(validator).len();
        if epoch_index >= len {
            return Err(LedgerError::InvalidEpoch {
                validator,
                reason: format!("snapshot index {epoch_index} out of range (len {len})"),
            });
        }

        let (resolved, snapshot) = self.cumulative_at(validator, timestamp)?;
        if resolved != epoch_index {
            return Err(LedgerError::WrongRps {
                supplied: epoch_index,
                resolved,
            });
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger_with(points: &[(EpochId, Timestamp, u128)]) -> RewardLedger {
        let mut ledger = RewardLedger::new();
        for &(epoch, ts, delta) in points {
            ledger.append(1, epoch, ts, delta, 1_000).expect("append");
        }
        ledger
    }

    #[test]
    fn test_append_accumulates() {
        let ledger = ledger_with(&[(1, 100, 1_000), (2, 200, 500)]);
        let snaps = ledger.snapshots(1);
        assert_eq!(snaps.len(), 2);
        assert_eq!(snaps[0].cumulative_rps, PRECISION);
        assert_eq!(snaps[1].cumulative_rps, PRECISION + PRECISION / 2);
        assert_eq!(ledger.current(1), PRECISION + PRECISION / 2);
    }

    #[test]
    fn test_current_of_unknown_validator_is_zero() {
        let ledger = RewardLedger::new();
        assert_eq!(ledger.current(42), 0);
        assert!(ledger.snapshots(42).is_empty());
    }

    #[test]
    fn test_zero_shares_rejected() {
        let mut ledger = RewardLedger::new();
        let err = ledger.append(3, 1, 100, 10, 0).expect_err("zero shares");
        assert_eq!(err, LedgerError::ZeroShares(3));
    }

    #[test]
    fn test_repeated_epoch_rejected() {
        let mut ledger = ledger_with(&[(5, 100, 1)]);
        let err = ledger.append(1, 5, 200, 1, 1_000).expect_err("same epoch");
        assert!(matches!(err, LedgerError::NonMonotonicEpoch { epoch: 5, last: 5 }));
    }

    #[test]
    fn test_backwards_timestamp_rejected() {
        let mut ledger = ledger_with(&[(1, 500, 1)]);
        let err = ledger.append(1, 2, 400, 1, 1_000).expect_err("backwards");
        assert!(matches!(err, LedgerError::NonMonotonicTimestamp { .. }));
    }

    #[test]
    fn test_cumulative_at_floor() {
        let ledger = ledger_with(&[(1, 100, 1_000), (2, 200, 1_000), (3, 300, 1_000)]);

        let (idx, snap) = ledger.cumulative_at(1, 100).expect("exact");
        assert_eq!((idx, snap.epoch), (0, 1));

        let (idx, _) = ledger.cumulative_at(1, 299).expect("between");
        assert_eq!(idx, 1);

        let (idx, snap) = ledger.cumulative_at(1, 10_000).expect("after last");
        assert_eq!(idx, 2);
        assert_eq!(snap.cumulative_rps, 3 * PRECISION);
    }

    #[test]
    fn test_cumulative_before_first_is_invalid() {
        let ledger = ledger_with(&[(1, 100, 1_000)]);
        let err = ledger.cumulative_at(1, 99).expect_err("before first");
        assert!(matches!(err, LedgerError::InvalidEpoch { .. }));

        let err = ledger.cumulative_at(2, 1_000).expect_err("empty");
        assert!(matches!(err, LedgerError::InvalidEpoch { .. }));
    }

    #[test]
    fn test_checked_lookup() {
        let ledger = ledger_with(&[(1, 100, 1_000), (2, 200, 1_000)]);

        let snap = ledger.cumulative_at_checked(1, 250, 1).expect("matching hint");
        assert_eq!(snap.epoch, 2);

        let err = ledger.cumulative_at_checked(1, 250, 0).expect_err("stale hint");
        assert_eq!(err, LedgerError::WrongRps { supplied: 0, resolved: 1 });

        let err = ledger.cumulative_at_checked(1, 250, 7).expect_err("out of range");
        assert!(matches!(err, LedgerError::InvalidEpoch { .. }));
    }

    #[test]
    fn test_prepare_does_not_write() {
        let mut ledger = ledger_with(&[(1, 100, 1_000)]);
        let pending = ledger.prepare(1, 2, 200, 500, 1_000).expect("prepare");
        assert_eq!(pending.validator(), 1);
        assert_eq!(pending.snapshot().cumulative_rps, PRECISION + PRECISION / 2);
        assert_eq!(ledger.snapshots(1).len(), 1);

        let written = ledger.commit(pending);
        assert_eq!(ledger.snapshots(1).last(), Some(&written));
    }

    #[test]
    fn test_prepare_overflow_leaves_ledger_untouched() {
        let mut ledger = ledger_with(&[(1, 100, 1_000)]);
        let err = ledger
            .prepare(1, 2, 200, u128::MAX, 1)
            .expect_err("overflow");
        assert_eq!(err, LedgerError::Overflow);
        assert_eq!(ledger.current(1), PRECISION);
        assert!(ledger.append(1, 2, 200, 1_000, 1_000).is_ok());
    }

    #[test]
    fn test_monotonic_series() {
        let ledger = ledger_with(&[(1, 100, 3), (4, 100, 0), (9, 900, 77)]);
        for pair in ledger.snapshots(1).windows(2) {
            assert!(pair[0].epoch < pair[1].epoch);
            assert!(pair[0].cumulative_rps <= pair[1].cumulative_rps);
        }
    }
}
