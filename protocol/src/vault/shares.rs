//! Per-holder share balances.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::types::{Address, Amount};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShareError {
    #[error("{holder} holds {available} shares, requested {requested}")]
    Insufficient {
        holder: Address,
        available: Amount,
        requested: Amount,
    },

    #[error("share balance overflow")]
    Overflow,
}

/// Share balances keyed by holder, plus the running total.
///
/// Zero balances are pruned so that `iter()` only yields live holders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareLedger {
    balances: BTreeMap<Address, Amount>,
    total: Amount,
}

impl ShareLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance_of(&self, holder: &Address) -> Amount {
        self.balances.get(holder).copied().unwrap_or(0)
    }

    pub fn total(&self) -> Amount {
        self.total
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &Amount)> {
        self.balances.iter()
    }

    /// Fails if minting `shares` to `holder` would overflow.
    pub fn check_mint(&self, holder: &Address, shares: Amount) -> Result<(), ShareError> {
        self.total.checked_add(shares).ok_or(ShareError::Overflow)?;
        self.balance_of(holder)
            .checked_add(shares)
            .ok_or(ShareError::Overflow)?;
        Ok(())
    }

    pub fn mint(&mut self, holder: Address, shares: Amount) -> Result<(), ShareError> {
        self.check_mint(&holder, shares)?;
        if shares == 0 {
            return Ok(());
        }
        *self.balances.entry(holder).or_insert(0) += shares;
        self.total += shares;
        Ok(())
    }

    /// Fails if `holder` owns fewer than `shares`.
    pub fn check_burn(&self, holder: &Address, shares: Amount) -> Result<(), ShareError> {
        let available = self.balance_of(holder);
        if available < shares {
            return Err(ShareError::Insufficient {
                holder: *holder,
                available,
                requested: shares,
            });
        }
        Ok(())
    }

    pub fn burn(&mut self, holder: Address, shares: Amount) -> Result<(), ShareError> {
        self.check_burn(&holder, shares)?;
        self.debit(holder, shares);
        self.total -= shares;
        Ok(())
    }

    /// Moves `shares` from one holder to another.
    pub fn transfer(&mut self, from: Address, to: Address, shares: Amount) -> Result<(), ShareError> {
        self.check_burn(&from, shares)?;
        if from == to || shares == 0 {
            return Ok(());
        }
        self.balance_of(&to)
            .checked_add(shares)
            .ok_or(ShareError::Overflow)?;

        self.debit(from, shares);
        *self.balances.entry(to).or_insert(0) += shares;
        Ok(())
    }

    fn debit(&mut self, holder: Address, shares: Amount) {
        if let Some(balance) = self.balances.get_mut(&holder) {
            *balance -= shares;
            if *balance == 0 {
                self.balances.remove(&holder);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_burn_tracks_total() {
        let a = Address::derive("a");
        let b = Address::derive("b");
        let mut ledger = ShareLedger::new();
        ledger.mint(a, 10).unwrap();
        ledger.mint(b, 5).unwrap();
        assert_eq!(ledger.total(), 15);

        ledger.burn(a, 10).unwrap();
        assert_eq!(ledger.total(), 5);
        assert_eq!(ledger.balance_of(&a), 0);
        assert_eq!(ledger.iter().count(), 1);
    }

    #[test]
    fn burn_beyond_balance_rejected() {
        let a = Address::derive("a");
        let mut ledger = ShareLedger::new();
        ledger.mint(a, 3).unwrap();
        assert_eq!(
            ledger.burn(a, 4),
            Err(ShareError::Insufficient {
                holder: a,
                available: 3,
                requested: 4
            })
        );
        assert_eq!(ledger.balance_of(&a), 3);
    }

    #[test]
    fn self_transfer_is_noop() {
        let a = Address::derive("a");
        let mut ledger = ShareLedger::new();
        ledger.mint(a, 7).unwrap();
        ledger.transfer(a, a, 7).unwrap();
        assert_eq!(ledger.balance_of(&a), 7);
    }

    #[test]
    fn mint_overflow_rejected() {
        let a = Address::derive("a");
        let mut ledger = ShareLedger::new();
        ledger.mint(a, Amount::MAX).unwrap();
        assert_eq!(ledger.mint(Address::derive("b"), 1), Err(ShareError::Overflow));
    }

    #[test]
    fn ledger_survives_bincode() {
        let mut ledger = ShareLedger::new();
        ledger.mint(Address::derive("a"), 42).unwrap();
        let bytes = bincode::serialize(&ledger).unwrap();
        let back: ShareLedger = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, ledger);
    }
}
