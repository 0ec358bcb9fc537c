// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Stake Across Protocol — Core Library
//!
//! Stake Across lets a user deposit a token on one chain and hold vault shares
//! for it on another. A **Sender** escrows the deposit and ships a message
//! across a relay; a **Vault Protocol** endpoint on the far side applies that
//! message exactly once and mints shares. Redemption runs the other way.
//!
//! This crate holds everything both endpoints share and nothing that is
//! specific to either role:
//!
//! - **types** — Addresses, message IDs, chain selectors, amounts.
//! - **message** — The cross-chain envelope and its fixed wire layout.
//! - **ledger** — Durable, append-only record of inbound messages (sled).
//! - **vault** — Share accounting. Pure, no I/O.
//! - **transport** — The relay seam, plus an in-memory router for tests and
//!   the devnet.
//! - **config** — Reference networks, funding constants, endpoint config.
//!
//! The endpoints themselves live in `stake-across-contracts`.
//!
//! ## Ground Rules
//!
//! 1. Every amount is checked. Overflow is an error, never a wrap.
//! 2. Rounding always goes against the caller.
//! 3. A message ID is applied at most once, no matter how often it arrives.

pub mod config;
pub mod ledger;
pub mod message;
pub mod transport;
pub mod types;
pub mod vault;

pub use message::CrossChainMessage;
pub use types::{Address, Amount, ChainSelector, MessageId, TokenAmount};
