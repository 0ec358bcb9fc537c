//! # Transport Interface
//!
//! The cross-chain relay is an external collaborator. Endpoints only see it
//! through two seams:
//!
//! - [`Transport`], which an endpoint calls to quote a fee and hand off an
//!   outbound message. A successful `send` returns the transport-assigned
//!   [`MessageId`]; it says nothing about whether delivery will happen.
//! - [`MessageReceiver`], which the transport calls on the destination
//!   endpoint. The transport passes its own identity as `caller` so the
//!   endpoint can refuse callbacks from anyone else.
//!
//! Delivery may be delayed, reordered, duplicated or dropped. Nothing in this
//! interface blocks waiting for the other side.
//!
//! [`memory::InMemoryRouter`] is the only implementation shipped here. It
//! drives the devnet and the integration tests.

pub mod memory;

pub use memory::{
    DeliveryReport, DeliveryStatus, FailedDelivery, InMemoryRouter, RouterConfig, RouterStats,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Address, Amount, ChainSelector, MessageId, TokenAmount};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why the transport refused an outbound message. Every variant is a
/// synchronous rejection: nothing was enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("unknown destination chain {0}")]
    UnknownDestination(ChainSelector),

    #[error("unknown source chain {0}")]
    UnknownSource(ChainSelector),

    #[error("receiver must not be the zero address")]
    ZeroReceiver,

    #[error("fee token {0} is not accepted on this chain")]
    UnsupportedFeeToken(Address),

    #[error("empty payload")]
    EmptyPayload,

    #[error("transport rejected message: {0}")]
    Rejected(String),
}

/// Why a receiver refused a delivery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct DeliveryError {
    pub reason: String,
    /// Whether redelivering the same message could succeed later.
    pub retryable: bool,
}

impl DeliveryError {
    pub fn terminal(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            retryable: false,
        }
    }

    pub fn retryable(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            retryable: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Requests & Deliveries
// ---------------------------------------------------------------------------

/// Everything an endpoint hands the transport for one outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRequest {
    pub source_chain: ChainSelector,
    /// The sending endpoint's identity.
    pub sender: Address,
    pub destination_chain: ChainSelector,
    pub receiver: Address,
    /// Encoded envelope.
    pub payload: Vec<u8>,
    pub fee_token: Address,
    /// Tokens moved in custody alongside the payload.
    pub token_transfers: Vec<TokenAmount>,
    /// Execution budget hint for the destination callback.
    pub gas_limit: u64,
}

/// A message as presented to the destination endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundDelivery {
    pub id: MessageId,
    pub source_chain: ChainSelector,
    pub sender: Address,
    pub payload: Vec<u8>,
    pub token_transfers: Vec<TokenAmount>,
}

/// What a receiver did with a delivery it accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InboundOutcome {
    /// First delivery; state changed.
    Applied,
    /// Already processed; discarded without effect.
    Duplicate,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Outbound side of the relay.
pub trait Transport: Send + Sync {
    /// Fee, in the request's fee token, that `send` would charge.
    fn fee(&self, request: &SendRequest) -> Result<Amount, TransportError>;

    /// Accepts a message for relay. Accepted sends cannot be cancelled.
    fn send(&self, request: SendRequest) -> Result<MessageId, TransportError>;
}

/// Destination side of the relay.
pub trait MessageReceiver: Send + Sync {
    /// Delivery callback. `caller` is the identity of whoever invokes it;
    /// receivers must reject anyone but their trusted transport endpoint.
    fn on_message_received(
        &self,
        caller: Address,
        delivery: &InboundDelivery,
    ) -> Result<InboundOutcome, DeliveryError>;
}
