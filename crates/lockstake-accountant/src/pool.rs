//! Delegation pools and per-slot stake records.

use lockstake_types::{math, Amount, ValidatorId};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Aggregate stake delegated to one validator. Shares track principal 1:1.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationPool {
    /// Validator the pool belongs to.
    pub validator: ValidatorId,
    /// Sum of every slot's principal.
    pub total_principal: Amount,
    /// Reward shares outstanding.
    pub total_shares: u128,
    /// Commission taken from delegator rewards.
    pub commission_bps: u64,
}

impl DelegationPool {
    /// Create an empty pool.
    pub fn new(validator: ValidatorId, commission_bps: u64) -> Self {
        Self {
            validator,
            total_principal: 0,
            total_shares: 0,
            commission_bps,
        }
    }

    /// Add principal.
    ///
    /// # Errors
    ///
    /// - [`AccountingError::Overflow`](crate::AccountingError::Overflow) on overflow
    pub fn deposit(&mut self, amount: Amount) -> Result<()> {
        let principal = math::checked_add(self.total_principal, amount)?;
        let shares = math::checked_add(self.total_shares, amount)?;
        self.total_principal = principal;
        self.total_shares = shares;
        Ok(())
    }

    /// Remove principal.
    ///
    /// # Errors
    ///
    /// - [`AccountingError::InvariantViolation`](crate::AccountingError::InvariantViolation)
    ///   if the pool holds less than `amount`
    pub fn withdraw(&mut self, amount: Amount) -> Result<()> {
        let principal = math::checked_sub(self.total_principal, amount)?;
        let shares = math::checked_sub(self.total_shares, amount)?;
        self.total_principal = principal;
        self.total_shares = shares;
        Ok(())
    }
}

/// Accounting state of one (validator, delegator) slot.
///
/// Settled points wait in two buckets until claimed: `bonused_points` were
/// earned inside a vesting window and pay the position's captured rates;
/// `plain_points` pay the base rate. `reserved` is the escrow set aside for
/// those points when their epochs closed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stake {
    /// Staked principal.
    pub principal: Amount,
    /// Cumulative RPS the slot was last settled at.
    pub checkpoint_rps: u128,
    /// Settled points payable at bonused rates.
    pub bonused_points: u128,
    /// Settled points payable at the base rate.
    pub plain_points: u128,
    /// Cumulative escrow-per-share the slot was last settled at.
    pub checkpoint_eps: u128,
    /// Settled escrow backing the pending points.
    pub reserved: Amount,
}

impl Stake {
    /// Whether settled points or their escrow await a claim.
    pub fn has_pending(&self) -> bool {
        self.bonused_points > 0 || self.plain_points > 0 || self.reserved > 0
    }

    /// Nothing staked and nothing owed.
    pub fn is_empty(&self) -> bool {
        self.principal == 0 && !self.has_pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AccountingError;

    #[test]
    fn test_deposit_and_withdraw() {
        let mut pool = DelegationPool::new(7, 1_000);
        pool.deposit(500).expect("deposit");
        pool.deposit(250).expect("deposit");
        assert_eq!(pool.total_principal, 750);
        assert_eq!(pool.total_shares, 750);
        pool.withdraw(700).expect("withdraw");
        assert_eq!(pool.total_principal, 50);
    }

    #[test]
    fn test_withdraw_more_than_held() {
        let mut pool = DelegationPool::new(7, 1_000);
        pool.deposit(10).expect("deposit");
        let err = pool.withdraw(11).expect_err("should fail");
        assert!(matches!(err, AccountingError::InvariantViolation(_)));
        assert_eq!(pool.total_principal, 10);
    }

    #[test]
    fn test_stake_emptiness() {
        let mut stake = Stake::default();
        assert!(stake.is_empty());
        stake.plain_points = 1;
        assert!(stake.has_pending());
        assert!(!stake.is_empty());

        stake.plain_points = 0;
        stake.reserved = 1;
        assert!(!stake.is_empty());
    }
}
