//! Collaborators the accountant reads from and pays through.
//!
//! The validator set and the treasury live outside the engine. Both are
//! traits so that hosts can plug in a chain runtime while the tests and the
//! simulator use the in-memory implementations below.

use std::collections::{BTreeMap, BTreeSet};

use lockstake_types::{Amount, DelegatorId, EpochId, ValidatorId};
use serde::{Deserialize, Serialize};

/// Read access to consensus state.
pub trait ValidatorSet {
    /// Whether the validator may receive new stake and rewards.
    fn is_active(&self, validator: ValidatorId) -> bool;

    /// Epoch principal changes are recorded under.
    fn current_epoch_id(&self) -> EpochId;

    /// Blocks the validator signed in `epoch`.
    fn signed_blocks(&self, validator: ValidatorId, epoch: EpochId) -> u64;
}

/// Why currency was burned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BurnReason {
    /// Escrow left over after a claim paid less than the ceiling rate.
    UnusedEscrow,
    /// Principal forfeited by an early exit.
    EarlyExitPenalty,
}

/// Recipient of a payout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Payee {
    /// A delegator's reward share.
    Delegator(DelegatorId),
    /// A validator's commission.
    Validator(ValidatorId),
}

impl std::fmt::Display for Payee {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Payee::Delegator(id) => write!(f, "delegator:{}", hex::encode(&id[..4])),
            Payee::Validator(id) => write!(f, "validator:{id}"),
        }
    }
}

/// Funding source and sink for reward currency.
pub trait Treasury {
    /// Reserve `amount` for rewards accrued this epoch.
    fn escrow(&mut self, amount: Amount);

    /// Pay `amount` out of escrow.
    fn payout(&mut self, to: Payee, amount: Amount);

    /// Destroy `amount`.
    fn burn(&mut self, amount: Amount, reason: BurnReason);
}

/// Validator set held in memory.
#[derive(Clone, Debug, Default)]
pub struct StaticValidatorSet {
    active: BTreeSet<ValidatorId>,
    epoch: EpochId,
    signed: BTreeMap<ValidatorId, u64>,
}

impl StaticValidatorSet {
    /// Create a set with the given active validators, each signing
    /// `signed_blocks` blocks per epoch.
    pub fn new(validators: impl IntoIterator<Item = ValidatorId>, signed_blocks: u64) -> Self {
        let active: BTreeSet<ValidatorId> = validators.into_iter().collect();
        let signed = active.iter().map(|&v| (v, signed_blocks)).collect();
        Self {
            active,
            epoch: 0,
            signed,
        }
    }

    /// Add a validator to the active set.
    pub fn activate(&mut self, validator: ValidatorId) {
        self.active.insert(validator);
    }

    /// Remove a validator from the active set.
    pub fn deactivate(&mut self, validator: ValidatorId) {
        self.active.remove(&validator);
    }

    /// Set the blocks a validator signs per epoch from now on.
    pub fn set_signed_blocks(&mut self, validator: ValidatorId, blocks: u64) {
        self.signed.insert(validator, blocks);
    }

    /// Move to the next epoch and return it.
    pub fn advance_epoch(&mut self) -> EpochId {
        self.epoch += 1;
        self.epoch
    }
}

impl ValidatorSet for StaticValidatorSet {
    fn is_active(&self, validator: ValidatorId) -> bool {
        self.active.contains(&validator)
    }

    fn current_epoch_id(&self) -> EpochId {
        self.epoch
    }

    fn signed_blocks(&self, validator: ValidatorId, _epoch: EpochId) -> u64 {
        self.signed.get(&validator).copied().unwrap_or(0)
    }
}

/// Treasury that only keeps totals.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct InMemoryTreasury {
    /// Total reserved at epoch closes.
    pub escrowed: Amount,
    /// Total paid to every payee.
    pub paid: Amount,
    /// Escrow burned after claims.
    pub burned_escrow: Amount,
    /// Principal burned by early exits.
    pub burned_penalty: Amount,
    /// Per-payee totals.
    pub payouts: BTreeMap<Payee, Amount>,
}

impl InMemoryTreasury {
    /// Total paid to one payee.
    pub fn paid_to(&self, payee: Payee) -> Amount {
        self.payouts.get(&payee).copied().unwrap_or(0)
    }
}

impl Treasury for InMemoryTreasury {
    fn escrow(&mut self, amount: Amount) {
        self.escrowed = self.escrowed.saturating_add(amount);
    }

    fn payout(&mut self, to: Payee, amount: Amount) {
        self.paid = self.paid.saturating_add(amount);
        let entry = self.payouts.entry(to).or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    fn burn(&mut self, amount: Amount, reason: BurnReason) {
        match reason {
            BurnReason::UnusedEscrow => {
                self.burned_escrow = self.burned_escrow.saturating_add(amount);
            }
            BurnReason::EarlyExitPenalty => {
                self.burned_penalty = self.burned_penalty.saturating_add(amount);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_set() {
        let mut set = StaticValidatorSet::new([1, 2], 100);
        assert!(set.is_active(1));
        assert!(!set.is_active(3));
        assert_eq!(set.signed_blocks(2, 0), 100);
        assert_eq!(set.signed_blocks(3, 0), 0);

        set.deactivate(1);
        assert!(!set.is_active(1));
        set.set_signed_blocks(2, 40);
        assert_eq!(set.signed_blocks(2, 5), 40);

        assert_eq!(set.current_epoch_id(), 0);
        assert_eq!(set.advance_epoch(), 1);
        assert_eq!(set.current_epoch_id(), 1);
    }

    #[test]
    fn test_treasury_totals() {
        let mut treasury = InMemoryTreasury::default();
        treasury.escrow(1_000);
        treasury.payout(Payee::Delegator([1; 32]), 600);
        treasury.payout(Payee::Validator(9), 100);
        treasury.payout(Payee::Delegator([1; 32]), 50);
        treasury.burn(250, BurnReason::UnusedEscrow);
        treasury.burn(30, BurnReason::EarlyExitPenalty);

        assert_eq!(treasury.escrowed, 1_000);
        assert_eq!(treasury.paid, 750);
        assert_eq!(treasury.paid_to(Payee::Delegator([1; 32])), 650);
        assert_eq!(treasury.paid_to(Payee::Validator(9)), 100);
        assert_eq!(treasury.burned_escrow, 250);
        assert_eq!(treasury.burned_penalty, 30);
    }

    #[test]
    fn test_payee_display() {
        assert_eq!(Payee::Validator(4).to_string(), "validator:4");
        assert_eq!(Payee::Delegator([0xab; 32]).to_string(), "delegator:abababab");
    }
}
