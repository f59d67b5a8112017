//! The reward accountant.
//!
//! Owns the reward ledger, the position store, the APR calculator, the
//! delegation pools and the per-validator escrow. Every public operation
//! validates first and mutates last.
//!
//! Escrow is reserved per share when an epoch closes, next to the RPS
//! snapshot, so each slot settles only the escrow set aside for its own
//! points:
//!
//! ```text
//! delta_eps  = max_reward(delta_points) * PRECISION / total_shares
//! escrow    += ceil(delta_eps * total_shares / PRECISION)
//! reserved  += (eps_now - checkpoint_eps) * principal / PRECISION
//! ```

use std::collections::BTreeMap;

use lockstake_apr::curve::MacroBounds;
use lockstake_apr::{AprCalculator, AprConfig};
use lockstake_ledger::rps::{PendingSnapshot, RewardLedger};
use lockstake_ledger::LedgerError;
use lockstake_types::{
    math, Amount, DelegatorId, EpochId, PositionKey, Timestamp, ValidatorId, BPS_DENOMINATOR,
    PRECISION,
};
use lockstake_vesting::{Position, PositionState, SlotStatus, VestingPositionStore};
use serde::{Deserialize, Serialize};

use crate::config::{out_of_bounds, AccountantConfig, MAX_BALANCE_CHANGE_THRESHOLD};
use crate::interfaces::{Treasury, ValidatorSet};
use crate::pool::{DelegationPool, Stake};
use crate::{invariant, AccountingError, Result};

/// Outcome of an epoch close.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochSummary {
    /// Closed epoch.
    pub epoch: EpochId,
    /// Validators that received reward points.
    pub rewarded_validators: usize,
    /// Points distributed across every validator.
    pub total_points: u128,
    /// Currency reserved for those points.
    pub escrowed: Amount,
}

/// A slot's pending points after settling to the current RPS.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Accrual {
    pub rps_now: u128,
    pub eps_now: u128,
    pub bonused_points: u128,
    pub plain_points: u128,
    pub reserved: Amount,
}

impl Accrual {
    pub(crate) fn has_pending(&self) -> bool {
        self.bonused_points > 0 || self.plain_points > 0 || self.reserved > 0
    }

    pub(crate) fn points(&self) -> Result<u128> {
        Ok(math::checked_add(self.bonused_points, self.plain_points)?)
    }
}

/// One validator's share of an epoch close, computed before anything is written.
struct EpochCredit {
    snapshot: PendingSnapshot,
    delta_points: u128,
    escrow_per_share: u128,
    escrow_balance: Amount,
}

/// Reward accounting engine over a validator set and a treasury.
#[derive(Debug)]
pub struct RewardAccountant<V, T> {
    pub(crate) config: AccountantConfig,
    pub(crate) validators: V,
    pub(crate) treasury: T,
    pub(crate) apr: AprCalculator,
    pub(crate) ledger: RewardLedger,
    pub(crate) positions: VestingPositionStore,
    pub(crate) pools: BTreeMap<ValidatorId, DelegationPool>,
    pub(crate) stakes: BTreeMap<PositionKey, Stake>,
    pub(crate) escrow: BTreeMap<ValidatorId, Amount>,
    pub(crate) escrow_per_share: BTreeMap<ValidatorId, u128>,
    pub(crate) last_closed_epoch: Option<EpochId>,
    pub(crate) last_closed_at: Option<Timestamp>,
}

impl<V: ValidatorSet, T: Treasury> RewardAccountant<V, T> {
    /// Create an accountant.
    ///
    /// # Errors
    ///
    /// - [`AccountingError::ParameterOutOfBounds`] if either config is invalid
    pub fn new(
        config: AccountantConfig,
        apr_config: AprConfig,
        validators: V,
        treasury: T,
    ) -> Result<Self> {
        config.validate()?;
        let apr = AprCalculator::new(apr_config)?;
        let positions = VestingPositionStore::new(config.balance_change_threshold);
        Ok(Self {
            config,
            validators,
            treasury,
            apr,
            ledger: RewardLedger::new(),
            positions,
            pools: BTreeMap::new(),
            stakes: BTreeMap::new(),
            escrow: BTreeMap::new(),
            escrow_per_share: BTreeMap::new(),
            last_closed_epoch: None,
            last_closed_at: None,
        })
    }

    // ---- Settlement ----

    /// Pending points of a slot as if it were settled now.
    pub(crate) fn accrue(&self, key: &PositionKey, now: Timestamp) -> Result<Accrual> {
        let rps_now = self.ledger.current(key.validator);
        let eps_now = self.escrow_per_share_of(key.validator);
        let Some(stake) = self.stakes.get(key) else {
            return Ok(Accrual {
                rps_now,
                eps_now,
                ..Accrual::default()
            });
        };

        let (bonused, plain) = self.unsettled_points(key, stake, rps_now, now)?;
        let reserved = self.unsettled_escrow(stake, eps_now)?;
        Ok(Accrual {
            rps_now,
            eps_now,
            bonused_points: math::checked_add(stake.bonused_points, bonused)?,
            plain_points: math::checked_add(stake.plain_points, plain)?,
            reserved: math::checked_add(stake.reserved, reserved)?,
        })
    }

    /// Escrow reserved for the slot since its checkpoint.
    fn unsettled_escrow(&self, stake: &Stake, eps_now: u128) -> Result<Amount> {
        if eps_now < stake.checkpoint_eps {
            return Err(invariant("escrow per share below checkpoint"));
        }
        if stake.principal == 0 {
            return Ok(0);
        }
        let delta = math::checked_sub(eps_now, stake.checkpoint_eps)?;
        Ok(math::mul_div(delta, stake.principal, PRECISION)?)
    }

    /// Split the points earned since the checkpoint at the position's end.
    fn unsettled_points(
        &self,
        key: &PositionKey,
        stake: &Stake,
        rps_now: u128,
        now: Timestamp,
    ) -> Result<(u128, u128)> {
        let checkpoint = stake.checkpoint_rps;
        if rps_now < checkpoint {
            return Err(invariant("cumulative RPS below checkpoint"));
        }
        if stake.principal == 0 || rps_now == checkpoint {
            return Ok((0, 0));
        }
        let points = |from: u128, to: u128| -> Result<u128> {
            let delta = math::checked_sub(to, from)?;
            Ok(math::mul_div(delta, stake.principal, PRECISION)?)
        };

        match self.positions.get(key) {
            Some(position) if position.state(now) == PositionState::Active => {
                Ok((points(checkpoint, rps_now)?, 0))
            }
            Some(position) => {
                let rps_end = self.rps_at_end(position)?;
                if checkpoint < rps_end {
                    Ok((points(checkpoint, rps_end)?, points(rps_end, rps_now)?))
                } else {
                    Ok((0, points(checkpoint, rps_now)?))
                }
            }
            None => Ok((0, points(checkpoint, rps_now)?)),
        }
    }

    /// Cumulative RPS at a position's end; zero if no snapshot precedes it.
    fn rps_at_end(&self, position: &Position) -> Result<u128> {
        match self.ledger.cumulative_at(position.validator, position.end) {
            Ok((_, snapshot)) => Ok(snapshot.cumulative_rps),
            Err(LedgerError::InvalidEpoch { .. }) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Write an accrual into the slot's stake record.
    pub(crate) fn commit_accrual(&mut self, key: &PositionKey, accrual: Accrual) -> &mut Stake {
        let stake = self.stakes.entry(*key).or_default();
        stake.checkpoint_rps = accrual.rps_now;
        stake.checkpoint_eps = accrual.eps_now;
        stake.bonused_points = accrual.bonused_points;
        stake.plain_points = accrual.plain_points;
        stake.reserved = accrual.reserved;
        stake
    }

    /// Drop a stake record that holds nothing.
    pub(crate) fn prune_stake(&mut self, key: &PositionKey) {
        if self.stakes.get(key).is_some_and(Stake::is_empty) {
            self.stakes.remove(key);
        }
    }

    /// What the position store needs to know about a slot.
    pub(crate) fn slot_status(&self, key: &PositionKey, now: Timestamp) -> Result<SlotStatus> {
        Ok(SlotStatus {
            principal: self.principal_of(key),
            unclaimed: self.accrue(key, now)?.has_pending(),
        })
    }

    pub(crate) fn escrow_per_share_of(&self, validator: ValidatorId) -> u128 {
        self.escrow_per_share.get(&validator).copied().unwrap_or(0)
    }

    pub(crate) fn principal_of(&self, key: &PositionKey) -> Amount {
        self.stakes.get(key).map_or(0, |s| s.principal)
    }

    /// Pool of a validator as it would look after `f`, without storing it.
    pub(crate) fn pool_after(
        &self,
        validator: ValidatorId,
        f: impl FnOnce(&mut DelegationPool) -> Result<()>,
    ) -> Result<DelegationPool> {
        let mut pool = self
            .pools
            .get(&validator)
            .cloned()
            .unwrap_or_else(|| DelegationPool::new(validator, self.config.default_commission_bps));
        f(&mut pool)?;
        Ok(pool)
    }

    pub(crate) fn commission_of(&self, validator: ValidatorId) -> u64 {
        self.pools
            .get(&validator)
            .map_or(self.config.default_commission_bps, |p| p.commission_bps)
    }

    // ---- Plain delegation ----

    /// Delegate `amount` to a validator outside any vesting position.
    ///
    /// # Errors
    ///
    /// - [`AccountingError::ZeroAmount`] if `amount` is zero
    /// - [`AccountingError::ValidatorInactive`] if the validator is not active
    /// - [`AccountingError::PositionExists`] if the slot holds a vesting position
    pub fn delegate(
        &mut self,
        validator: ValidatorId,
        delegator: DelegatorId,
        amount: Amount,
        now: Timestamp,
    ) -> Result<()> {
        if amount == 0 {
            return Err(AccountingError::ZeroAmount);
        }
        if !self.validators.is_active(validator) {
            return Err(AccountingError::ValidatorInactive(validator));
        }
        let key = PositionKey::new(validator, delegator);
        if self.positions.get(&key).is_some() {
            return Err(AccountingError::PositionExists(key));
        }

        let accrual = self.accrue(&key, now)?;
        let principal = math::checked_add(self.principal_of(&key), amount)?;
        let pool = self.pool_after(validator, |p| p.deposit(amount))?;

        self.pools.insert(validator, pool);
        self.commit_accrual(&key, accrual).principal = principal;

        tracing::info!(%key, amount, principal, "accountant: delegated");
        Ok(())
    }

    /// Withdraw `amount` of plain delegation.
    ///
    /// Pending points stay claimable after the principal is gone.
    ///
    /// # Errors
    ///
    /// - [`AccountingError::ZeroAmount`] if `amount` is zero
    /// - [`AccountingError::PositionExists`] if the slot holds a vesting position
    /// - [`AccountingError::InsufficientPrincipal`] if less than `amount` is staked
    pub fn undelegate(
        &mut self,
        validator: ValidatorId,
        delegator: DelegatorId,
        amount: Amount,
        now: Timestamp,
    ) -> Result<()> {
        if amount == 0 {
            return Err(AccountingError::ZeroAmount);
        }
        let key = PositionKey::new(validator, delegator);
        if self.positions.get(&key).is_some() {
            return Err(AccountingError::PositionExists(key));
        }
        let available = self.principal_of(&key);
        if amount > available {
            return Err(AccountingError::InsufficientPrincipal {
                requested: amount,
                available,
            });
        }

        let accrual = self.accrue(&key, now)?;
        let pool = self.pool_after(validator, |p| p.withdraw(amount))?;

        self.pools.insert(validator, pool);
        self.commit_accrual(&key, accrual).principal = available - amount;
        self.prune_stake(&key);

        tracing::info!(%key, amount, principal = available - amount, "accountant: undelegated");
        Ok(())
    }

    // ---- Epoch close ----

    /// Distribute an epoch's reward points and escrow their ceiling value.
    ///
    /// Each active validator with stake earns
    /// `total_shares * signed_blocks / blocks_per_epoch` points.
    ///
    /// # Errors
    ///
    /// - [`AccountingError::EpochAlreadyClosed`] if `epoch` does not follow the last close
    /// - [`LedgerError::NonMonotonicTimestamp`] if `timestamp` precedes the last close
    /// - [`AccountingError::Overflow`] on arithmetic overflow
    pub fn close_epoch(&mut self, epoch: EpochId, timestamp: Timestamp) -> Result<EpochSummary> {
        if let Some(last) = self.last_closed_epoch {
            if epoch <= last {
                return Err(AccountingError::EpochAlreadyClosed { epoch, last });
            }
        }
        if let Some(last) = self.last_closed_at {
            if timestamp < last {
                return Err(LedgerError::NonMonotonicTimestamp { timestamp, last }.into());
            }
        }

        let blocks = u128::from(self.config.blocks_per_epoch);
        let mut plan = Vec::new();
        let mut total_points: u128 = 0;
        let mut escrowed: Amount = 0;

        for pool in self.pools.values() {
            if pool.total_shares == 0 || !self.validators.is_active(pool.validator) {
                continue;
            }
            let signed = u128::from(self.validators.signed_blocks(pool.validator, epoch)).min(blocks);
            let delta_points = math::mul_div(pool.total_shares, signed, blocks)?;
            if delta_points == 0 {
                continue;
            }
            let snapshot = self.ledger.prepare(
                pool.validator,
                epoch,
                timestamp,
                delta_points,
                pool.total_shares,
            )?;

            // Slots settle rounding down, so the reserve rounds up. It stays
            // within the ceiling since delta_eps itself rounds down.
            let ceiling = self.apr.apply_max_reward(delta_points)?;
            let delta_eps = math::mul_div(ceiling, PRECISION, pool.total_shares)?;
            let scaled = delta_eps
                .checked_mul(pool.total_shares)
                .ok_or(AccountingError::Overflow)?;
            let reserve = math::ceil_div(scaled, PRECISION)?;
            let escrow_per_share =
                math::checked_add(self.escrow_per_share_of(pool.validator), delta_eps)?;
            let escrow_balance = math::checked_add(self.escrow_of(pool.validator), reserve)?;

            total_points = math::checked_add(total_points, delta_points)?;
            escrowed = math::checked_add(escrowed, reserve)?;
            plan.push(EpochCredit {
                snapshot,
                delta_points,
                escrow_per_share,
                escrow_balance,
            });
        }

        for credit in &plan {
            let validator = credit.snapshot.validator();
            self.ledger.commit(credit.snapshot);
            self.escrow_per_share.insert(validator, credit.escrow_per_share);
            self.escrow.insert(validator, credit.escrow_balance);
            tracing::debug!(
                validator,
                delta_points = credit.delta_points,
                escrow = credit.escrow_balance,
                "accountant: validator rewarded"
            );
        }
        if escrowed > 0 {
            self.treasury.escrow(escrowed);
        }
        self.last_closed_epoch = Some(epoch);
        self.last_closed_at = Some(timestamp);

        tracing::info!(
            epoch,
            validators = plan.len(),
            total_points,
            escrowed,
            "accountant: epoch closed"
        );
        Ok(EpochSummary {
            epoch,
            rewarded_validators: plan.len(),
            total_points,
            escrowed,
        })
    }

    // ---- Getters ----

    /// Points earned since the slot was last settled:
    /// `(current_rps - checkpoint_rps) * principal / PRECISION`.
    ///
    /// # Errors
    ///
    /// - [`AccountingError::InvariantViolation`] if the checkpoint is ahead of the ledger
    pub fn raw_reward(&self, validator: ValidatorId, delegator: DelegatorId) -> Result<u128> {
        let key = PositionKey::new(validator, delegator);
        let Some(stake) = self.stakes.get(&key) else {
            return Ok(0);
        };
        let delta = math::checked_sub(self.ledger.current(validator), stake.checkpoint_rps)?;
        Ok(math::mul_div(delta, stake.principal, PRECISION)?)
    }

    /// Whether the slot holds a position that has not ended.
    pub fn is_active_position(
        &self,
        validator: ValidatorId,
        delegator: DelegatorId,
        now: Timestamp,
    ) -> bool {
        let key = PositionKey::new(validator, delegator);
        self.positions.state(&key, now) == Some(PositionState::Active)
    }

    /// Whether the slot could receive a swapped position.
    ///
    /// # Errors
    ///
    /// - [`AccountingError::InvariantViolation`] if the slot's checkpoint is corrupt
    pub fn is_available_for_swap(
        &self,
        validator: ValidatorId,
        delegator: DelegatorId,
        now: Timestamp,
    ) -> Result<bool> {
        let key = PositionKey::new(validator, delegator);
        let slot = self.slot_status(&key, now)?;
        Ok(self.positions.is_available_for_swap(&key, slot, now))
    }

    /// Ceiling reward rate as `(numerator, denominator)` per point.
    pub fn max_apr(&self) -> (u128, u128) {
        self.apr.max_apr()
    }

    /// Delegation pool of a validator.
    pub fn pool(&self, validator: ValidatorId) -> Option<&DelegationPool> {
        self.pools.get(&validator)
    }

    /// Stake record of a slot.
    pub fn stake(&self, validator: ValidatorId, delegator: DelegatorId) -> Option<&Stake> {
        self.stakes.get(&PositionKey::new(validator, delegator))
    }

    /// Vesting position of a slot.
    pub fn position(&self, validator: ValidatorId, delegator: DelegatorId) -> Option<&Position> {
        self.positions.get(&PositionKey::new(validator, delegator))
    }

    /// Escrow held for a validator's unclaimed rewards.
    pub fn escrow_of(&self, validator: ValidatorId) -> Amount {
        self.escrow.get(&validator).copied().unwrap_or(0)
    }

    /// Escrow held across every validator.
    pub fn total_escrow(&self) -> Amount {
        self.escrow.values().fold(0, |acc, v| acc.saturating_add(*v))
    }

    /// Last closed epoch.
    pub fn last_closed_epoch(&self) -> Option<EpochId> {
        self.last_closed_epoch
    }

    /// Accountant configuration.
    pub fn config(&self) -> &AccountantConfig {
        &self.config
    }

    /// APR calculator.
    pub fn apr(&self) -> &AprCalculator {
        &self.apr
    }

    /// Reward ledger.
    pub fn ledger(&self) -> &RewardLedger {
        &self.ledger
    }

    /// Position store.
    pub fn positions(&self) -> &VestingPositionStore {
        &self.positions
    }

    /// Validator set.
    pub fn validators(&self) -> &V {
        &self.validators
    }

    /// Mutable validator set, for hosts that drive it.
    pub fn validators_mut(&mut self) -> &mut V {
        &mut self.validators
    }

    /// Treasury.
    pub fn treasury(&self) -> &T {
        &self.treasury
    }

    // ---- Oracle and governance ----

    /// Forward a daily price vote to the APR calculator.
    ///
    /// # Errors
    ///
    /// See [`AprCalculator::on_new_price`].
    pub fn on_new_price(&mut self, price: u64, timestamp: Timestamp) -> Result<bool> {
        Ok(self.apr.on_new_price(price, timestamp)?)
    }

    /// Freeze the APR bonuses.
    pub fn guard(&mut self) {
        self.apr.guard();
    }

    /// Release the APR guard.
    pub fn unguard(&mut self) {
        self.apr.unguard();
    }

    /// Set the governance base APR.
    ///
    /// # Errors
    ///
    /// - [`lockstake_apr::AprError::ParameterOutOfBounds`] outside the configured range
    pub fn set_base_apr(&mut self, bps: u64) -> Result<()> {
        Ok(self.apr.set_base_apr(bps)?)
    }

    /// Replace the macro-factor bounds.
    ///
    /// # Errors
    ///
    /// - [`lockstake_apr::AprError::ParameterOutOfBounds`] if the bounds are invalid
    /// - [`AccountingError::ParameterOutOfBounds`] if the resulting ceiling rate
    ///   is below the rate an open position captured
    pub fn set_macro_bounds(&mut self, bounds: MacroBounds) -> Result<()> {
        let mut candidate = self.apr.config().clone();
        candidate.macro_bounds = bounds;
        self.ensure_ceiling_covers_positions(&candidate, "macro_bounds.max_bps", bounds.max_bps)?;
        Ok(self.apr.set_macro_bounds(bounds)?)
    }

    /// Set the largest RSI bonus.
    ///
    /// # Errors
    ///
    /// - [`lockstake_apr::AprError::ParameterOutOfBounds`] above the hard ceiling
    /// - [`AccountingError::ParameterOutOfBounds`] if the resulting ceiling rate
    ///   is below the rate an open position captured
    pub fn set_max_rsi(&mut self, bps: u64) -> Result<()> {
        let mut candidate = self.apr.config().clone();
        candidate.max_rsi_bps = bps;
        self.ensure_ceiling_covers_positions(&candidate, "max_rsi_bps", bps)?;
        Ok(self.apr.set_max_rsi(bps)?)
    }

    /// Reject a config whose ceiling rate is below the rate some open
    /// position captured; epochs closed under it could not escrow what the
    /// position earns.
    fn ensure_ceiling_covers_positions(
        &self,
        candidate: &AprConfig,
        name: &'static str,
        value: u64,
    ) -> Result<()> {
        candidate.validate()?;
        let (ceiling, _) = candidate.max_apr();
        let required = self.captured_rate_ceiling()?;
        if ceiling < required {
            tracing::warn!(name, value, ceiling, required, "accountant: ceiling below captured rates");
            return Err(out_of_bounds(name, value));
        }
        Ok(())
    }

    /// Highest `(base + vest) * (10000 + rsi)` among stored positions, on the
    /// same denominator as [`AprConfig::max_apr`].
    fn captured_rate_ceiling(&self) -> Result<u128> {
        let bps = u128::from(BPS_DENOMINATOR);
        self.positions.iter().try_fold(0u128, |highest, position| {
            let rates = &position.rates;
            let bonused = u128::from(rates.base_bps)
                .checked_add(u128::from(rates.vest_bonus_bps))
                .and_then(|r| r.checked_mul(bps + u128::from(rates.rsi_bonus_bps)))
                .ok_or(AccountingError::Overflow)?;
            Ok(highest.max(bonused))
        })
    }

    /// Set the number of principal changes allowed per position.
    ///
    /// # Errors
    ///
    /// - [`AccountingError::ParameterOutOfBounds`] outside `[1, 1024]`
    pub fn set_balance_change_threshold(&mut self, threshold: usize) -> Result<()> {
        if !(1..=MAX_BALANCE_CHANGE_THRESHOLD).contains(&threshold) {
            return Err(out_of_bounds("balance_change_threshold", threshold as u64));
        }
        self.config.balance_change_threshold = threshold;
        self.positions.set_balance_change_threshold(threshold);
        tracing::info!(threshold, "accountant: balance-change threshold set");
        Ok(())
    }

    /// Set a validator's commission. Existing positions keep the commission
    /// they captured.
    ///
    /// # Errors
    ///
    /// - [`AccountingError::ParameterOutOfBounds`] above `max_commission_bps`
    pub fn set_commission(&mut self, validator: ValidatorId, bps: u64) -> Result<()> {
        if bps > self.config.max_commission_bps {
            return Err(out_of_bounds("commission_bps", bps));
        }
        self.pools
            .entry(validator)
            .or_insert_with(|| DelegationPool::new(validator, bps))
            .commission_bps = bps;
        tracing::info!(validator, bps, "accountant: commission set");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::*;
    use crate::interfaces::InMemoryTreasury;

    #[test]
    fn test_rejects_invalid_config() {
        let config = AccountantConfig {
            blocks_per_epoch: 0,
            ..AccountantConfig::default()
        };
        let result = RewardAccountant::new(
            config,
            AprConfig::default(),
            validators(),
            InMemoryTreasury::default(),
        );
        assert!(matches!(
            result,
            Err(AccountingError::ParameterOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_delegate_and_accrue() {
        let mut acc = accountant();
        acc.delegate(1, delegator(1), STAKE, START).expect("delegate");
        assert_eq!(acc.pool(1).expect("pool").total_principal, STAKE);

        let now = run_days(&mut acc, START, 3);
        assert_eq!(acc.raw_reward(1, delegator(1)).expect("raw"), 3 * STAKE);
        assert_eq!(acc.ledger().snapshots(1).len(), 3);
        assert!(acc.escrow_of(1) > 0);
        assert_eq!(acc.treasury().escrowed, acc.escrow_of(1));
        assert!(now > START);
    }

    #[test]
    fn test_delegate_rejections() {
        let mut acc = accountant();
        assert_eq!(
            acc.delegate(1, delegator(1), 0, START),
            Err(AccountingError::ZeroAmount)
        );
        assert_eq!(
            acc.delegate(99, delegator(1), 10, START),
            Err(AccountingError::ValidatorInactive(99))
        );

        acc.open_position(1, delegator(2), 4, STAKE, START)
            .expect("open");
        assert!(matches!(
            acc.delegate(1, delegator(2), 10, START),
            Err(AccountingError::PositionExists(_))
        ));
        assert!(matches!(
            acc.undelegate(1, delegator(2), 10, START),
            Err(AccountingError::PositionExists(_))
        ));
    }

    #[test]
    fn test_undelegate_settles_first() {
        let mut acc = accountant();
        acc.delegate(1, delegator(1), STAKE, START).expect("delegate");
        let now = run_days(&mut acc, START, 2);

        acc.undelegate(1, delegator(1), STAKE, now)
            .expect("undelegate");
        let stake = acc.stake(1, delegator(1)).expect("pending points remain");
        assert_eq!(stake.principal, 0);
        assert_eq!(stake.plain_points, 2 * STAKE);
        assert_eq!(acc.pool(1).expect("pool").total_principal, 0);

        let err = acc
            .undelegate(1, delegator(1), 1, now)
            .expect_err("nothing left");
        assert!(matches!(
            err,
            AccountingError::InsufficientPrincipal { requested: 1, available: 0 }
        ));
    }

    #[test]
    fn test_checkpoint_excludes_earlier_rewards() {
        let mut acc = accountant();
        acc.delegate(1, delegator(1), STAKE, START).expect("delegate");
        let now = run_days(&mut acc, START, 2);

        acc.delegate(1, delegator(2), STAKE, now).expect("late joiner");
        assert_eq!(acc.raw_reward(1, delegator(2)).expect("raw"), 0);

        run_days(&mut acc, now, 1);
        assert_eq!(acc.raw_reward(1, delegator(1)).expect("raw"), 3 * STAKE);
        assert_eq!(acc.raw_reward(1, delegator(2)).expect("raw"), STAKE);
    }

    #[test]
    fn test_epoch_close_rules() {
        let mut acc = accountant();
        acc.delegate(1, delegator(1), STAKE, START).expect("delegate");
        acc.delegate(2, delegator(1), STAKE, START).expect("delegate");

        acc.validators_mut().set_signed_blocks(2, 25);
        let summary = acc.close_epoch(0, START + DAY).expect("close");
        assert_eq!(summary.rewarded_validators, 2);
        assert_eq!(summary.total_points, STAKE + STAKE / 4);
        assert_eq!(acc.raw_reward(2, delegator(1)).expect("raw"), STAKE / 4);

        assert_eq!(
            acc.close_epoch(0, START + 2 * DAY),
            Err(AccountingError::EpochAlreadyClosed { epoch: 0, last: 0 })
        );
        assert!(matches!(
            acc.close_epoch(1, START),
            Err(AccountingError::Ledger(LedgerError::NonMonotonicTimestamp { .. }))
        ));

        acc.validators_mut().deactivate(1);
        let summary = acc.close_epoch(1, START + 2 * DAY).expect("close");
        assert_eq!(summary.rewarded_validators, 1);
    }

    #[test]
    fn test_uptime_is_capped_at_full_epoch() {
        let mut acc = accountant();
        acc.delegate(1, delegator(1), STAKE, START).expect("delegate");
        acc.validators_mut().set_signed_blocks(1, 1_000);
        let summary = acc.close_epoch(0, START + DAY).expect("close");
        assert_eq!(summary.total_points, STAKE);
    }

    #[test]
    fn test_governance_setters() {
        let mut acc = accountant();
        acc.set_commission(3, 2_000).expect("commission");
        assert_eq!(acc.pool(3).expect("pool").commission_bps, 2_000);
        assert!(matches!(
            acc.set_commission(3, 9_000),
            Err(AccountingError::ParameterOutOfBounds { name: "commission_bps", .. })
        ));

        acc.set_balance_change_threshold(2).expect("threshold");
        assert_eq!(acc.positions().history().threshold(), 2);
        assert!(acc.set_balance_change_threshold(0).is_err());

        acc.set_base_apr(800).expect("base");
        assert_eq!(acc.apr().effective_base(), 800);
        assert!(matches!(
            acc.set_base_apr(9_000),
            Err(AccountingError::Apr(_))
        ));
    }

    #[test]
    fn test_availability_for_swap() {
        let mut acc = accountant();
        assert!(acc.is_available_for_swap(2, delegator(1), START).expect("empty"));
        acc.delegate(2, delegator(1), STAKE, START).expect("delegate");
        assert!(!acc.is_available_for_swap(2, delegator(1), START).expect("staked"));
    }
}
