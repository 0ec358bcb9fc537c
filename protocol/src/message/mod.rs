//! # Message Envelope
//!
//! The payload every cross-chain message carries, and the codec that puts it
//! on the wire. Sender and vault live on different chains and are compiled
//! separately, so the layout is fixed and documented in [`codec`] rather than
//! derived from a serializer's defaults.

pub mod codec;

mod error;

pub use codec::{decode, encode, ENCODED_LEN, WORD_SIZE};
pub use error::DecodeError;

use serde::{Deserialize, Serialize};

use crate::types::{Address, Amount, ChainSelector};

/// The decoded cross-chain payload.
///
/// Outbound deposits carry the depositor's account in `depositor`; outbound
/// redemptions reuse the same field for the receiver of the released funds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossChainMessage {
    /// Chain the message originated on.
    pub source_chain_selector: ChainSelector,
    /// Component that emitted the message.
    pub sender: Address,
    /// End-user account the message acts on behalf of.
    pub depositor: Address,
    /// Asset moved alongside the message.
    pub token: Address,
    /// Amount of `token`, in its smallest denomination.
    pub amount: Amount,
}

impl CrossChainMessage {
    /// The all-zero detail, returned by reads for unknown message IDs.
    pub const fn zero() -> Self {
        Self {
            source_chain_selector: ChainSelector(0),
            sender: Address::ZERO,
            depositor: Address::ZERO,
            token: Address::ZERO,
            amount: 0,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::zero()
    }

    /// Shorthand for [`encode`].
    pub fn encode(&self) -> Vec<u8> {
        encode(self)
    }
}
