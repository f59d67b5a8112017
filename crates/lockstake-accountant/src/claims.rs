//! Reward claims.
//!
//! A claim settles the slot, converts its pending points into currency and
//! pays it out of the validator's escrow:
//!
//! ```text
//! release  = escrow reserved for the slot's points at epoch close
//! paid     = min(value(points), release)
//! burned   = release - paid
//! ```
//!
//! Bonused points pay the rates the position captured at open; plain points
//! pay the position's base rate, or the current effective base for plain
//! delegations. The validator's commission comes out of `paid`.

use lockstake_apr::payout;
use lockstake_types::{math, Amount, DelegatorId, PositionKey, Timestamp, ValidatorId};
use lockstake_vesting::{Position, PositionState};
use serde::{Deserialize, Serialize};

use crate::accountant::{Accrual, RewardAccountant};
use crate::interfaces::{BurnReason, Payee, Treasury, ValidatorSet};
use crate::pool::Stake;
use crate::{invariant, Result};

/// Caller-computed indices for a position's end-of-vesting lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimHints {
    /// Index of the validator's last RPS snapshot at or before the position end.
    pub epoch_index: usize,
    /// Index of the balance-change record in force at that snapshot's epoch.
    pub balance_change_index: usize,
}

/// Outcome of a claim.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimReceipt {
    /// Points paid at bonused rates.
    pub bonused_points: u128,
    /// Points paid at the base rate.
    pub plain_points: u128,
    /// Currency value of the points.
    pub reward: Amount,
    /// Paid to the validator.
    pub commission: Amount,
    /// Paid to the delegator.
    pub delegator_amount: Amount,
    /// Escrow released by this claim.
    pub escrow_released: Amount,
    /// Released escrow that was burned.
    pub escrow_burned: Amount,
}

impl ClaimReceipt {
    /// Total paid out.
    pub fn paid(&self) -> Amount {
        self.commission.saturating_add(self.delegator_amount)
    }
}

impl<V: ValidatorSet, T: Treasury> RewardAccountant<V, T> {
    /// Claim a slot's rewards, resolving historical lookups internally.
    ///
    /// Claiming an active position is a no-op that returns an empty receipt;
    /// its points stay pending.
    ///
    /// # Errors
    ///
    /// - [`AccountingError::InvariantViolation`](crate::AccountingError::InvariantViolation)
    ///   if the slot's records disagree
    /// - [`AccountingError::Overflow`](crate::AccountingError::Overflow) on arithmetic overflow
    pub fn claim(
        &mut self,
        validator: ValidatorId,
        delegator: DelegatorId,
        now: Timestamp,
    ) -> Result<ClaimReceipt> {
        self.claim_inner(PositionKey::new(validator, delegator), now, None)
    }

    /// Claim a position's rewards, validating caller-supplied indices first.
    ///
    /// Hints are ignored for plain delegations.
    ///
    /// # Errors
    ///
    /// - [`lockstake_ledger::LedgerError::InvalidEpoch`] /
    ///   [`lockstake_ledger::LedgerError::WrongRps`] for a bad `epoch_index`
    /// - [`lockstake_ledger::LedgerError::InvalidParamsIndex`] /
    ///   [`lockstake_ledger::LedgerError::EarlyBalanceChange`] /
    ///   [`lockstake_ledger::LedgerError::LateBalanceChange`] for a bad
    ///   `balance_change_index`
    /// - everything [`claim`](Self::claim) returns
    pub fn claim_with_hints(
        &mut self,
        validator: ValidatorId,
        delegator: DelegatorId,
        hints: ClaimHints,
        now: Timestamp,
    ) -> Result<ClaimReceipt> {
        self.claim_inner(PositionKey::new(validator, delegator), now, Some(hints))
    }

    /// Currency value of every point the slot could claim, before escrow
    /// limits and commission.
    ///
    /// # Errors
    ///
    /// - [`AccountingError::Overflow`](crate::AccountingError::Overflow) on arithmetic overflow
    pub fn total_potential_reward(
        &self,
        validator: ValidatorId,
        delegator: DelegatorId,
        now: Timestamp,
    ) -> Result<Amount> {
        let key = PositionKey::new(validator, delegator);
        let accrual = self.accrue(&key, now)?;
        self.value_of(self.positions.get(&key), &accrual)
    }

    fn claim_inner(
        &mut self,
        key: PositionKey,
        now: Timestamp,
        hints: Option<ClaimHints>,
    ) -> Result<ClaimReceipt> {
        let position = self.positions.get(&key).cloned();
        if let Some(p) = &position {
            if p.state(now) == PositionState::Active {
                tracing::debug!(%key, "accountant: claim on active position deferred");
                return Ok(ClaimReceipt::default());
            }
        }
        let Some(stake) = self.stakes.get(&key) else {
            return Ok(ClaimReceipt::default());
        };
        if let (Some(p), Some(hints)) = (&position, hints) {
            self.verify_hints(&key, p, stake, hints)?;
        }

        let accrual = self.accrue(&key, now)?;
        let reward = self.value_of(position.as_ref(), &accrual)?;

        let held = self.escrow_of(key.validator);
        let release = accrual.reserved;
        if release > held {
            return Err(invariant("slot reserved more escrow than its validator holds"));
        }
        if reward > release {
            tracing::warn!(%key, reward, release, "accountant: reward capped by escrow");
        }
        let paid = reward.min(release);
        let commission_bps = position
            .as_ref()
            .map_or_else(|| self.commission_of(key.validator), |p| p.commission_bps);
        let commission = math::apply_bps(paid, commission_bps)?;
        let delegator_amount = math::checked_sub(paid, commission)?;
        let burned = math::checked_sub(release, paid)?;
        let remaining = math::checked_sub(held, release)?;

        self.escrow.insert(key.validator, remaining);
        let stake = self.commit_accrual(&key, accrual);
        stake.bonused_points = 0;
        stake.plain_points = 0;
        stake.reserved = 0;
        let principal = stake.principal;

        if delegator_amount > 0 {
            self.treasury
                .payout(Payee::Delegator(key.delegator), delegator_amount);
        }
        if commission > 0 {
            self.treasury.payout(Payee::Validator(key.validator), commission);
        }
        if burned > 0 {
            self.treasury.burn(burned, BurnReason::UnusedEscrow);
        }
        if principal == 0 {
            if position.is_some() {
                self.positions.close(&key);
            }
            self.stakes.remove(&key);
        }

        tracing::info!(
            %key,
            bonused_points = accrual.bonused_points,
            plain_points = accrual.plain_points,
            reward,
            commission,
            burned,
            "accountant: rewards claimed"
        );
        Ok(ClaimReceipt {
            bonused_points: accrual.bonused_points,
            plain_points: accrual.plain_points,
            reward,
            commission,
            delegator_amount,
            escrow_released: release,
            escrow_burned: burned,
        })
    }

    /// Check the caller's indices against the ledger and the position history.
    fn verify_hints(
        &self,
        key: &PositionKey,
        position: &Position,
        stake: &Stake,
        hints: ClaimHints,
    ) -> Result<()> {
        let snapshot =
            self.ledger
                .cumulative_at_checked(key.validator, position.end, hints.epoch_index)?;
        let principal_at_end = self.positions.history().principal_at_checked(
            key,
            snapshot.epoch,
            hints.balance_change_index,
        )?;

        // Unsettled points up to the end must have been earned at the
        // principal the history records for that window.
        if stake.checkpoint_rps < snapshot.cumulative_rps && principal_at_end != stake.principal {
            return Err(invariant("balance history disagrees with staked principal"));
        }
        Ok(())
    }

    /// Currency value of an accrual.
    fn value_of(&self, position: Option<&Position>, accrual: &Accrual) -> Result<Amount> {
        match position {
            Some(p) => {
                let bonused = payout::bonused_value(accrual.bonused_points, &p.rates)?;
                let plain = payout::plain_value(accrual.plain_points, p.rates.base_bps)?;
                Ok(math::checked_add(bonused, plain)?)
            }
            None => {
                let points = math::checked_add(accrual.bonused_points, accrual.plain_points)?;
                Ok(payout::plain_value(points, self.apr.effective_base())?)
            }
        }
    }
}
