//! # Vault Accounting Engine
//!
//! [`VaultState`] is the pair `(total_assets, total_shares)` and the
//! conversion rules between them. [`Vault`] adds the per-holder
//! [`ShareLedger`] so that minting and burning always move the totals and a
//! holder's balance together.
//!
//! ## Rounding
//!
//! Every conversion rounds **down**, i.e. against whoever is calling:
//!
//! - `deposit` mints `floor(assets * shares / assets_total)`, so a depositor
//!   never receives more claim than they paid for.
//! - `redeem` pays `floor(shares * assets_total / shares_total)`, so a
//!   redeemer never drains more than their claim.
//!
//! Together these make a deposit/redeem pair unprofitable for the caller,
//! which is what defeats share-price inflation games. Yield is asset-only:
//! it raises `total_assets` without minting, distributing pro-rata.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::math::mul_div_floor;
use super::shares::{ShareError, ShareLedger};
use crate::types::{Address, Amount};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by the accounting engine. None of them leave partial state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultError {
    /// The holder tried to burn or move more shares than they own.
    #[error("insufficient shares: {holder} holds {available}, requested {requested}")]
    InsufficientShares {
        holder: Address,
        available: Amount,
        requested: Amount,
    },

    /// Zero is never a meaningful deposit or redemption.
    #[error("amount must be greater than zero")]
    ZeroAmount,

    /// Outstanding shares with no assets behind them. Only reachable through
    /// a corrupted snapshot; deposits are refused rather than dividing by zero.
    #[error("vault has {total_shares} shares outstanding but no assets")]
    Insolvent { total_shares: Amount },

    /// A total or balance would exceed `u128::MAX`.
    #[error("arithmetic overflow in vault accounting")]
    Overflow,
}

impl From<ShareError> for VaultError {
    fn from(e: ShareError) -> Self {
        match e {
            ShareError::Insufficient {
                holder,
                available,
                requested,
            } => VaultError::InsufficientShares {
                holder,
                available,
                requested,
            },
            ShareError::Overflow => VaultError::Overflow,
        }
    }
}

// ---------------------------------------------------------------------------
// VaultState
// ---------------------------------------------------------------------------

/// Pooled assets and outstanding shares.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultState {
    /// Everything the vault counts as backing shares, injected yield included.
    pub total_assets: Amount,
    /// Sum of all minted, unburned shares.
    pub total_shares: Amount,
}

impl VaultState {
    /// A vault that already holds `assets` with no shares outstanding.
    pub fn seeded(assets: Amount) -> Self {
        Self {
            total_assets: assets,
            total_shares: 0,
        }
    }

    /// Shares a deposit of `assets` would mint right now.
    ///
    /// 1:1 while no shares exist; otherwise rounded down.
    pub fn preview_deposit(&self, assets: Amount) -> Result<Amount, VaultError> {
        if self.total_shares == 0 {
            return Ok(assets);
        }
        if self.total_assets == 0 {
            return Err(VaultError::Insolvent {
                total_shares: self.total_shares,
            });
        }
        mul_div_floor(assets, self.total_shares, self.total_assets).ok_or(VaultError::Overflow)
    }

    /// Assets a redemption of `shares` would pay right now, rounded down.
    ///
    /// Returns `0` while no shares exist. Saturates at `u128::MAX` for share
    /// counts far beyond the supply, which no holder can own anyway.
    pub fn preview_redeem(&self, shares: Amount) -> Amount {
        if self.total_shares == 0 {
            return 0;
        }
        mul_div_floor(shares, self.total_assets, self.total_shares).unwrap_or(Amount::MAX)
    }

    /// Adds `assets` to the pool and returns the shares minted for them.
    /// The caller is responsible for crediting those shares to a holder.
    pub fn deposit(&mut self, assets: Amount) -> Result<Amount, VaultError> {
        if assets == 0 {
            return Err(VaultError::ZeroAmount);
        }
        let shares = self.preview_deposit(assets)?;
        let total_assets = self
            .total_assets
            .checked_add(assets)
            .ok_or(VaultError::Overflow)?;
        let total_shares = self
            .total_shares
            .checked_add(shares)
            .ok_or(VaultError::Overflow)?;

        self.total_assets = total_assets;
        self.total_shares = total_shares;
        Ok(shares)
    }

    /// Removes `shares` from the supply and returns the assets they were
    /// worth. The caller must already have burned them from a holder.
    fn withdraw(&mut self, shares: Amount) -> Result<Amount, VaultError> {
        if shares > self.total_shares {
            return Err(VaultError::Overflow);
        }
        let assets = self.preview_redeem(shares);
        self.total_assets = self
            .total_assets
            .checked_sub(assets)
            .ok_or(VaultError::Overflow)?;
        self.total_shares -= shares;
        Ok(assets)
    }

    /// Asset-only increase of the pool: every outstanding share becomes
    /// worth proportionally more.
    pub fn inject_yield(&mut self, assets: Amount) -> Result<(), VaultError> {
        self.total_assets = self
            .total_assets
            .checked_add(assets)
            .ok_or(VaultError::Overflow)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Vault
// ---------------------------------------------------------------------------

/// The accounting engine proper: totals plus who owns the shares.
///
/// Invariant: `shares.total() == state.total_shares` after every public
/// call. Each entry point validates before it mutates, so an `Err` return
/// leaves the vault exactly as it was.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    state: VaultState,
    shares: ShareLedger,
}

impl Vault {
    pub fn new() -> Self {
        Self::default()
    }

    /// A vault pre-seeded with assets that back no shares.
    pub fn seeded(assets: Amount) -> Self {
        Self {
            state: VaultState::seeded(assets),
            shares: ShareLedger::new(),
        }
    }

    pub fn state(&self) -> VaultState {
        self.state
    }

    pub fn total_assets(&self) -> Amount {
        self.state.total_assets
    }

    /// Total share supply.
    pub fn total_supply(&self) -> Amount {
        self.state.total_shares
    }

    pub fn balance_of(&self, holder: &Address) -> Amount {
        self.shares.balance_of(holder)
    }

    pub fn preview_deposit(&self, assets: Amount) -> Result<Amount, VaultError> {
        self.state.preview_deposit(assets)
    }

    pub fn preview_redeem(&self, shares: Amount) -> Amount {
        self.state.preview_redeem(shares)
    }

    pub fn holders(&self) -> impl Iterator<Item = (&Address, &Amount)> {
        self.shares.iter()
    }

    /// Deposits `assets` on behalf of `holder` and mints them shares.
    pub fn deposit(&mut self, holder: Address, assets: Amount) -> Result<Amount, VaultError> {
        let mut next = self.state;
        let minted = next.deposit(assets)?;
        self.shares.check_mint(&holder, minted)?;

        self.shares.mint(holder, minted)?;
        self.state = next;
        Ok(minted)
    }

    /// Burns `shares` from `holder` and returns the assets released.
    ///
    /// # Errors
    ///
    /// [`VaultError::InsufficientShares`] if `holder` owns fewer than `shares`.
    pub fn redeem(&mut self, holder: Address, shares: Amount) -> Result<Amount, VaultError> {
        if shares == 0 {
            return Err(VaultError::ZeroAmount);
        }
        self.shares.check_burn(&holder, shares)?;

        let mut next = self.state;
        let assets = next.withdraw(shares)?;

        self.shares.burn(holder, shares)?;
        self.state = next;
        Ok(assets)
    }

    /// Moves shares between holders. Totals are untouched.
    pub fn transfer(&mut self, from: Address, to: Address, shares: Amount) -> Result<(), VaultError> {
        self.shares.transfer(from, to, shares)?;
        Ok(())
    }

    pub fn inject_yield(&mut self, assets: Amount) -> Result<(), VaultError> {
        self.state.inject_yield(assets)
    }
}
