//! # Custody
//!
//! What an endpoint holds and who may take it out.
//!
//! [`Escrow`] tracks the endpoint's token and native balances. Outbound sends
//! and withdrawals debit it; funding, inbound token transfers and yield
//! credit it. Under [`FundingMode::PullFromDepositor`] it additionally keeps a
//! per-depositor sub-balance so a transfer can only spend what its caller put
//! in.
//!
//! [`OwnerGuard`] is the withdrawal gate. The owner is fixed at construction;
//! there is no transfer of ownership.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use stake_across_protocol::config::FundingMode;
use stake_across_protocol::{Address, Amount};

use crate::error::{EndpointError, EndpointResult, Holding};

// ---------------------------------------------------------------------------
// OwnerGuard
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnerGuard {
    owner: Address,
}

impl OwnerGuard {
    pub fn new(owner: Address) -> Self {
        Self { owner }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    /// `Unauthorized` unless `caller` is the owner.
    pub fn authorize(&self, caller: Address) -> EndpointResult<()> {
        if caller != self.owner {
            return Err(EndpointError::Unauthorized { caller });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Escrow
// ---------------------------------------------------------------------------

/// Balances held by one endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escrow {
    tokens: BTreeMap<Address, Amount>,
    native: Amount,
    /// depositor -> token -> amount. Only used in pull mode.
    deposits: BTreeMap<Address, BTreeMap<Address, Amount>>,
}

impl Escrow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self, holding: Holding) -> Amount {
        match holding {
            Holding::Token(token) => self.tokens.get(&token).copied().unwrap_or(0),
            Holding::Native => self.native,
        }
    }

    pub fn token_balance(&self, token: &Address) -> Amount {
        self.balance(Holding::Token(*token))
    }

    /// Non-zero token balances.
    pub fn tokens(&self) -> impl Iterator<Item = (&Address, &Amount)> {
        self.tokens.iter().filter(|(_, amount)| **amount > 0)
    }

    /// What `depositor` has deposited of `token` and not yet spent.
    pub fn deposit_of(&self, depositor: &Address, token: &Address) -> Amount {
        self.deposits
            .get(depositor)
            .and_then(|by_token| by_token.get(token))
            .copied()
            .unwrap_or(0)
    }

    pub fn credit(&mut self, holding: Holding, amount: Amount) -> EndpointResult<()> {
        let updated = self
            .balance(holding)
            .checked_add(amount)
            .ok_or(EndpointError::Overflow)?;
        *self.slot(holding) = updated;
        Ok(())
    }

    pub fn debit(&mut self, holding: Holding, amount: Amount) -> EndpointResult<()> {
        let available = self.balance(holding);
        let remaining = available
            .checked_sub(amount)
            .ok_or(EndpointError::InsufficientBalance {
                holding,
                available,
                requested: amount,
            })?;
        *self.slot(holding) = remaining;
        Ok(())
    }

    /// Credits the escrow and `depositor`'s sub-balance together.
    pub fn deposit_for(
        &mut self,
        depositor: Address,
        token: Address,
        amount: Amount,
    ) -> EndpointResult<()> {
        let current = self.deposit_of(&depositor, &token);
        let updated = current.checked_add(amount).ok_or(EndpointError::Overflow)?;
        self.credit(Holding::Token(token), amount)?;
        self.deposits
            .entry(depositor)
            .or_default()
            .insert(token, updated);
        Ok(())
    }

    /// Debits `amount` of `token` on behalf of `caller`, honouring the
    /// funding mode.
    pub fn spend(
        &mut self,
        mode: FundingMode,
        caller: Address,
        token: Address,
        amount: Amount,
    ) -> EndpointResult<()> {
        match mode {
            FundingMode::Prefunded => self.debit(Holding::Token(token), amount),
            FundingMode::PullFromDepositor => {
                let available = self.deposit_of(&caller, &token);
                if available < amount {
                    return Err(EndpointError::InsufficientBalance {
                        holding: Holding::Token(token),
                        available,
                        requested: amount,
                    });
                }
                self.debit(Holding::Token(token), amount)?;
                if let Some(by_token) = self.deposits.get_mut(&caller) {
                    by_token.insert(token, available - amount);
                }
                Ok(())
            }
        }
    }

    /// Empties a holding and returns what it held. Depositor sub-balances of
    /// a swept token are cleared too, since nothing backs them any more.
    pub fn sweep(&mut self, holding: Holding) -> EndpointResult<Amount> {
        let amount = self.balance(holding);
        if amount == 0 {
            return Err(EndpointError::NothingToWithdraw(holding));
        }
        *self.slot(holding) = 0;
        if let Holding::Token(token) = holding {
            for by_token in self.deposits.values_mut() {
                by_token.remove(&token);
            }
        }
        Ok(amount)
    }

    fn slot(&mut self, holding: Holding) -> &mut Amount {
        match holding {
            Holding::Token(token) => self.tokens.entry(token).or_insert(0),
            Holding::Native => &mut self.native,
        }
    }
}
