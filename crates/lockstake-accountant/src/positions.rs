//! Vesting position operations: open, top-up, cut and swap.
//!
//! Each operation settles the slot before touching its principal, so points
//! earned at the old principal land in the pending buckets first.

use lockstake_apr::RateSnapshot;
use lockstake_types::{math, Amount, DelegatorId, PositionKey, Timestamp, ValidatorId, MAX_VESTING_WEEKS};
use lockstake_vesting::{OpenRequest, Position, PositionState, VestingError};
use serde::{Deserialize, Serialize};

use crate::accountant::RewardAccountant;
use crate::interfaces::{BurnReason, Treasury, ValidatorSet};
use crate::penalty;
use crate::pool::Stake;
use crate::{AccountingError, Result};

/// Outcome of a cut.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CutReceipt {
    /// Principal removed from the position.
    pub removed: Amount,
    /// Part of `removed` burned as an early-exit penalty.
    pub penalty: Amount,
    /// Part of `removed` returned to the delegator.
    pub returned: Amount,
    /// Lifecycle state at the time of the cut.
    pub state: PositionState,
    /// Whether the position was closed.
    pub closed: bool,
}

/// Outcome of a swap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapReceipt {
    /// Source slot.
    pub from: PositionKey,
    /// Destination slot.
    pub to: PositionKey,
    /// Principal moved.
    pub principal: Amount,
    /// Commission the position took from the destination.
    pub commission_bps: u64,
    /// Pending points carried along.
    pub carried_points: u128,
    /// Escrow moved with the pending points.
    pub carried_escrow: Amount,
}

impl<V: ValidatorSet, T: Treasury> RewardAccountant<V, T> {
    /// Lock `amount` with a validator for `weeks` weeks.
    ///
    /// The position captures the current effective base, the duration bonus,
    /// the RSI bonus and the validator's commission.
    ///
    /// # Errors
    ///
    /// - [`AccountingError::ZeroAmount`] if `amount` is zero
    /// - [`AccountingError::ValidatorInactive`] if the validator is not active
    /// - [`AccountingError::DelegationExists`] if the slot holds plain stake
    /// - [`VestingError::RewardsNotClaimed`] if the slot has pending rewards
    /// - [`VestingError::PositionActive`], [`VestingError::PositionMaturing`]
    ///   if an earlier position occupies the slot
    /// - [`VestingError::InvalidDuration`] if `weeks` is outside `[1, 52]`
    pub fn open_position(
        &mut self,
        validator: ValidatorId,
        delegator: DelegatorId,
        weeks: u64,
        amount: Amount,
        now: Timestamp,
    ) -> Result<Position> {
        if amount == 0 {
            return Err(AccountingError::ZeroAmount);
        }
        if !self.validators.is_active(validator) {
            return Err(AccountingError::ValidatorInactive(validator));
        }
        let key = PositionKey::new(validator, delegator);
        let slot = self.slot_status(&key, now)?;
        if self.positions.get(&key).is_none() {
            if slot.principal > 0 {
                return Err(AccountingError::DelegationExists(key));
            }
            if slot.unclaimed {
                return Err(VestingError::RewardsNotClaimed(key).into());
            }
        }

        // The store reports a bad duration after its slot checks.
        let rates = if (1..=MAX_VESTING_WEEKS).contains(&weeks) {
            self.apr.snapshot(weeks)?
        } else {
            RateSnapshot::default()
        };
        let accrual = self.accrue(&key, now)?;
        let pool = self.pool_after(validator, |p| p.deposit(amount))?;
        let request = OpenRequest {
            key,
            weeks,
            principal: amount,
            commission_bps: self.commission_of(validator),
            rates,
        };
        let epoch = self.validators.current_epoch_id();
        let position = self.positions.open(request, slot, now, epoch)?.clone();

        self.pools.insert(validator, pool);
        self.commit_accrual(&key, accrual).principal = amount;
        Ok(position)
    }

    /// Add `amount` to an active position. Returns the new principal.
    ///
    /// # Errors
    ///
    /// - [`AccountingError::ZeroAmount`] if `amount` is zero
    /// - [`AccountingError::ValidatorInactive`] if the validator is not active
    /// - [`VestingError::NoPosition`] / [`VestingError::TopUpClosed`]
    /// - [`lockstake_ledger::LedgerError::BalanceChangeAlreadyMade`] /
    ///   [`lockstake_ledger::LedgerError::BalanceChangesExceeded`]
    pub fn top_up(
        &mut self,
        validator: ValidatorId,
        delegator: DelegatorId,
        amount: Amount,
        now: Timestamp,
    ) -> Result<Amount> {
        if amount == 0 {
            return Err(AccountingError::ZeroAmount);
        }
        if !self.validators.is_active(validator) {
            return Err(AccountingError::ValidatorInactive(validator));
        }
        let key = PositionKey::new(validator, delegator);
        let accrual = self.accrue(&key, now)?;
        let principal = math::checked_add(self.principal_of(&key), amount)?;
        let pool = self.pool_after(validator, |p| p.deposit(amount))?;
        let epoch = self.validators.current_epoch_id();
        self.positions.top_up(&key, principal, now, epoch)?;

        self.pools.insert(validator, pool);
        self.commit_accrual(&key, accrual).principal = principal;
        tracing::info!(%key, amount, principal, "accountant: position topped up");
        Ok(principal)
    }

    /// Remove `amount` from a position.
    ///
    /// While the position is active the removed principal pays the
    /// early-exit penalty, which is burned. The position closes once its
    /// principal and pending points are both gone; with points pending it
    /// stays until they are claimed.
    ///
    /// # Errors
    ///
    /// - [`AccountingError::ZeroAmount`] if `amount` is zero
    /// - [`VestingError::NoPosition`] if the slot is empty
    /// - [`AccountingError::InsufficientPrincipal`] if less than `amount` is staked
    /// - [`lockstake_ledger::LedgerError::BalanceChangeAlreadyMade`]
    /// - [`lockstake_ledger::LedgerError::BalanceChangesExceeded`] while the
    ///   position is still active
    pub fn cut(
        &mut self,
        validator: ValidatorId,
        delegator: DelegatorId,
        amount: Amount,
        now: Timestamp,
    ) -> Result<CutReceipt> {
        if amount == 0 {
            return Err(AccountingError::ZeroAmount);
        }
        let key = PositionKey::new(validator, delegator);
        let (state, weeks_remaining) = {
            let position = self
                .positions
                .get(&key)
                .ok_or(VestingError::NoPosition(key))?;
            (position.state(now), position.weeks_remaining(now))
        };
        let available = self.principal_of(&key);
        if amount > available {
            return Err(AccountingError::InsufficientPrincipal {
                requested: amount,
                available,
            });
        }

        let penalty = if state == PositionState::Active {
            penalty::early_exit_penalty(amount, weeks_remaining, self.config.weekly_penalty_bps)?
        } else {
            0
        };
        let accrual = self.accrue(&key, now)?;
        let pool = self.pool_after(validator, |p| p.withdraw(amount))?;
        let remaining = available - amount;
        let epoch = self.validators.current_epoch_id();
        self.positions.cut(&key, remaining, now, epoch)?;

        self.pools.insert(validator, pool);
        self.commit_accrual(&key, accrual).principal = remaining;
        if penalty > 0 {
            self.treasury.burn(penalty, BurnReason::EarlyExitPenalty);
            tracing::warn!(%key, amount, penalty, weeks_remaining, "accountant: early exit penalised");
        }

        let closed = remaining == 0 && !accrual.has_pending();
        if closed {
            self.positions.close(&key);
            self.stakes.remove(&key);
        }
        tracing::info!(%key, amount, remaining, ?state, "accountant: position cut");

        Ok(CutReceipt {
            removed: amount,
            penalty,
            returned: amount - penalty,
            state,
            closed,
        })
    }

    /// Move an active position to another validator.
    ///
    /// Principal, pending points and the escrow backing them move in one
    /// step; nothing is written until every check has passed.
    ///
    /// # Errors
    ///
    /// - [`AccountingError::ValidatorInactive`] if the destination is not active
    /// - [`VestingError::NoPosition`] / [`VestingError::SameValidator`]
    /// - [`VestingError::OldPositionInactive`] if the source has ended
    /// - [`VestingError::NewPositionUnavailable`] if the destination slot is taken
    /// - [`lockstake_ledger::LedgerError::BalanceChangeAlreadyMade`] /
    ///   [`lockstake_ledger::LedgerError::BalanceChangesExceeded`]
    pub fn swap(
        &mut self,
        delegator: DelegatorId,
        from_validator: ValidatorId,
        to_validator: ValidatorId,
        now: Timestamp,
    ) -> Result<SwapReceipt> {
        if !self.validators.is_active(to_validator) {
            return Err(AccountingError::ValidatorInactive(to_validator));
        }
        let from = PositionKey::new(from_validator, delegator);
        let to = from.with_validator(to_validator);

        let principal = self.principal_of(&from);
        let accrual = self.accrue(&from, now)?;
        let destination = self.slot_status(&to, now)?;
        let commission_bps = self.commission_of(to_validator);

        let carried_points = accrual.points()?;
        let carried_escrow = accrual.reserved;
        let source_escrow = math::checked_sub(self.escrow_of(from_validator), carried_escrow)?;
        let destination_escrow = math::checked_add(self.escrow_of(to_validator), carried_escrow)?;
        let source_pool = self.pool_after(from_validator, |p| p.withdraw(principal))?;
        let destination_pool = self.pool_after(to_validator, |p| p.deposit(principal))?;

        let epoch = self.validators.current_epoch_id();
        self.positions.swap(
            &from,
            to_validator,
            commission_bps,
            principal,
            destination,
            now,
            epoch,
        )?;

        self.pools.insert(from_validator, source_pool);
        self.pools.insert(to_validator, destination_pool);
        self.escrow.insert(from_validator, source_escrow);
        self.escrow.insert(to_validator, destination_escrow);
        self.stakes.remove(&from);
        self.stakes.insert(
            to,
            Stake {
                principal,
                checkpoint_rps: self.ledger.current(to_validator),
                bonused_points: accrual.bonused_points,
                plain_points: accrual.plain_points,
                checkpoint_eps: self.escrow_per_share_of(to_validator),
                reserved: carried_escrow,
            },
        );

        tracing::debug!(%from, %to, carried_points, carried_escrow, "accountant: pending rewards carried");
        Ok(SwapReceipt {
            from,
            to,
            principal,
            commission_bps,
            carried_points,
            carried_escrow,
        })
    }
}
