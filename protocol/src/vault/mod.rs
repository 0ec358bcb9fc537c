//! # Vault
//!
//! Share accounting for a single-asset pool. Depositors receive shares in
//! proportion to what they bring; redeemers receive assets in proportion to
//! the shares they burn. See [`accounting`] for the rounding rules.

pub mod accounting;
pub mod math;
pub mod shares;

pub use accounting::{Vault, VaultError, VaultState};
pub use math::mul_div_floor;
pub use shares::{ShareError, ShareLedger};
