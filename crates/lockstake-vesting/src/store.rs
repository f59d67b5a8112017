//! Position store.
//!
//! Positions and their balance-change histories share one key and are
//! created, moved and destroyed together. The store validates lifecycle
//! rules; reward settlement and penalties belong to the accountant, which
//! reports the slot's principal and unclaimed state through [`SlotStatus`].

use std::collections::BTreeMap;

use lockstake_apr::RateSnapshot;
use lockstake_ledger::balance::BalanceChangeHistory;
use lockstake_types::{Amount, EpochId, PositionKey, Timestamp, ValidatorId, MAX_VESTING_WEEKS};
use serde::{Deserialize, Serialize};

use crate::position::{Position, PositionState};
use crate::{Result, VestingError};

/// What the accountant knows about a slot that the store does not.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SlotStatus {
    /// Principal currently staked in the slot.
    pub principal: Amount,
    /// Whether the slot has reward points that were never claimed.
    pub unclaimed: bool,
}

/// Parameters of a new position.
#[derive(Clone, Copy, Debug)]
pub struct OpenRequest {
    /// Slot to open.
    pub key: PositionKey,
    /// Lock length in weeks.
    pub weeks: u64,
    /// Initial principal.
    pub principal: Amount,
    /// Validator commission at open.
    pub commission_bps: u64,
    /// Rates captured at open.
    pub rates: RateSnapshot,
}

/// Positions keyed by (validator, delegator).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VestingPositionStore {
    positions: BTreeMap<PositionKey, Position>,
    history: BalanceChangeHistory,
}

impl VestingPositionStore {
    /// Create an empty store with the given balance-change limit.
    pub fn new(balance_change_threshold: usize) -> Self {
        Self {
            positions: BTreeMap::new(),
            history: BalanceChangeHistory::new(balance_change_threshold),
        }
    }

    /// Position in a slot.
    pub fn get(&self, key: &PositionKey) -> Option<&Position> {
        self.positions.get(key)
    }

    /// Lifecycle state of a slot's position.
    pub fn state(&self, key: &PositionKey, now: Timestamp) -> Option<PositionState> {
        self.get(key).map(|p| p.state(now))
    }

    /// Iterate every position in key order.
    pub fn iter(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    /// Balance-change histories.
    pub fn history(&self) -> &BalanceChangeHistory {
        &self.history
    }

    /// Change the per-position balance-change limit.
    pub fn set_balance_change_threshold(&mut self, threshold: usize) {
        self.history.set_threshold(threshold);
    }

    /// Open a position, replacing a closed-out matured one.
    ///
    /// # Errors
    ///
    /// - [`VestingError::PositionActive`] if the slot's position has not ended
    /// - [`VestingError::PositionMaturing`] if it has ended but not matured
    /// - [`VestingError::RewardsNotClaimed`] if it matured with unclaimed rewards
    /// - [`VestingError::PrincipalNotZero`] if the slot still holds principal
    /// - [`VestingError::InvalidDuration`] / [`VestingError::ZeroAmount`] on bad input
    /// - [`VestingError::Ledger`] if the history rejects the first record
    pub fn open(
        &mut self,
        request: OpenRequest,
        slot: SlotStatus,
        now: Timestamp,
        epoch: EpochId,
    ) -> Result<&Position> {
        let key = request.key;
        self.ensure_open_allowed(&key, slot, now)?;

        if request.weeks == 0 || request.weeks > MAX_VESTING_WEEKS {
            return Err(VestingError::InvalidDuration(request.weeks));
        }
        if request.principal == 0 {
            return Err(VestingError::ZeroAmount);
        }

        let position = Position::new(key, now, request.weeks, request.rates, request.commission_bps)?;

        if self.positions.remove(&key).is_some() {
            tracing::debug!(%key, "vesting: replacing matured position");
        }
        self.history.clear(&key);
        self.history.append(key, epoch, request.principal)?;

        tracing::info!(
            %key,
            weeks = request.weeks,
            principal = request.principal,
            end = position.end,
            base = position.rates.base_bps,
            vest_bonus = position.rates.vest_bonus_bps,
            rsi_bonus = position.rates.rsi_bonus_bps,
            "vesting: position opened"
        );
        let stored = self.positions.entry(key).or_insert(position);
        Ok(&*stored)
    }

    fn ensure_open_allowed(&self, key: &PositionKey, slot: SlotStatus, now: Timestamp) -> Result<()> {
        match self.state(key, now) {
            Some(PositionState::Active) => Err(VestingError::PositionActive(*key)),
            Some(PositionState::Maturing) => Err(VestingError::PositionMaturing(*key)),
            Some(PositionState::Matured) if slot.unclaimed => {
                Err(VestingError::RewardsNotClaimed(*key))
            }
            _ if slot.principal > 0 => Err(VestingError::PrincipalNotZero(*key)),
            _ => Ok(()),
        }
    }

    /// Record a top-up of an active position.
    ///
    /// # Errors
    ///
    /// - [`VestingError::NoPosition`] if the slot is empty
    /// - [`VestingError::TopUpClosed`] once the position has ended
    /// - [`VestingError::Ledger`] if the history rejects the change
    pub fn top_up(
        &mut self,
        key: &PositionKey,
        new_principal: Amount,
        now: Timestamp,
        epoch: EpochId,
    ) -> Result<()> {
        let position = self.get(key).ok_or(VestingError::NoPosition(*key))?;
        if position.state(now) != PositionState::Active {
            return Err(VestingError::TopUpClosed(*key));
        }
        self.history.append(*key, epoch, new_principal)?;
        Ok(())
    }

    /// Check that a cut could be recorded this epoch, without recording it.
    ///
    /// Once the position has ended its records no longer feed the
    /// end-of-vesting principal lookup, so only the once-per-epoch rule
    /// applies; the record-count limit never locks principal in.
    ///
    /// # Errors
    ///
    /// - [`VestingError::NoPosition`] if the slot is empty
    /// - [`VestingError::Ledger`] if the history would reject the change
    pub fn ensure_can_cut(
        &self,
        key: &PositionKey,
        now: Timestamp,
        epoch: EpochId,
    ) -> Result<PositionState> {
        let state = self
            .get(key)
            .ok_or(VestingError::NoPosition(*key))?
            .state(now);
        if state == PositionState::Active {
            self.history.ensure_can_append(key, epoch)?;
        } else {
            self.history.ensure_can_append_uncapped(key, epoch)?;
        }
        Ok(state)
    }

    /// Record a cut and return the state the position was in.
    ///
    /// # Errors
    ///
    /// - [`VestingError::NoPosition`] if the slot is empty
    /// - [`VestingError::Ledger`] if the history rejects the change
    pub fn cut(
        &mut self,
        key: &PositionKey,
        new_principal: Amount,
        now: Timestamp,
        epoch: EpochId,
    ) -> Result<PositionState> {
        let state = self.ensure_can_cut(key, now, epoch)?;
        if state == PositionState::Active {
            self.history.append(*key, epoch, new_principal)?;
        } else {
            self.history.append_uncapped(*key, epoch, new_principal)?;
        }
        Ok(state)
    }

    /// Whether a slot could receive a swapped position.
    pub fn is_available_for_swap(&self, key: &PositionKey, slot: SlotStatus, now: Timestamp) -> bool {
        if slot.principal > 0 || slot.unclaimed {
            return false;
        }
        match self.state(key, now) {
            None | Some(PositionState::Matured) => true,
            Some(_) => false,
        }
    }

    /// Move an active position to another validator.
    ///
    /// The position keeps its start, duration, end and rates, takes the
    /// destination's current commission and carries its history along.
    ///
    /// # Errors
    ///
    /// - [`VestingError::NoPosition`] if the source slot is empty
    /// - [`VestingError::SameValidator`] if the destination is the source validator
    /// - [`VestingError::OldPositionInactive`] if the source is not active
    /// - [`VestingError::NewPositionUnavailable`] if the destination slot is taken
    /// - [`VestingError::Ledger`] if the history rejects the change
    #[allow(clippy::too_many_arguments)]
    pub fn swap(
        &mut self,
        from: &PositionKey,
        to_validator: ValidatorId,
        to_commission_bps: u64,
        principal: Amount,
        destination: SlotStatus,
        now: Timestamp,
        epoch: EpochId,
    ) -> Result<&Position> {
        let source = self.get(from).ok_or(VestingError::NoPosition(*from))?;
        if to_validator == from.validator {
            return Err(VestingError::SameValidator(*from));
        }
        if source.state(now) != PositionState::Active {
            return Err(VestingError::OldPositionInactive(*from));
        }
        let to = from.with_validator(to_validator);
        if !self.is_available_for_swap(&to, destination, now) {
            return Err(VestingError::NewPositionUnavailable(to));
        }
        self.history.ensure_can_append(from, epoch)?;

        let mut moved = self
            .positions
            .remove(from)
            .ok_or(VestingError::NoPosition(*from))?;
        moved.validator = to_validator;
        moved.commission_bps = to_commission_bps;

        self.positions.remove(&to);
        self.history.transfer(from, to);
        self.history.append(to, epoch, principal)?;

        tracing::info!(
            from = %from,
            to = %to,
            principal,
            commission = to_commission_bps,
            "vesting: position swapped"
        );
        let stored = self.positions.entry(to).or_insert(moved);
        Ok(&*stored)
    }

    /// Destroy a position and its history.
    pub fn close(&mut self, key: &PositionKey) -> Option<Position> {
        let removed = self.positions.remove(key);
        self.history.clear(key);
        if removed.is_some() {
            tracing::info!(%key, "vesting: position closed");
        }
        removed
    }
}
