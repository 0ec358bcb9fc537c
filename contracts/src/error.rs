//! Endpoint error type and its failure taxonomy.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use stake_across_protocol::ledger::LedgerError;
use stake_across_protocol::message::DecodeError;
use stake_across_protocol::transport::{DeliveryError, TransportError};
use stake_across_protocol::vault::VaultError;
use stake_across_protocol::{Address, Amount, ChainSelector};

// ---------------------------------------------------------------------------
// Holding
// ---------------------------------------------------------------------------

/// Something an endpoint can hold in escrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Holding {
    Token(Address),
    /// The chain's native gas currency.
    Native,
}

impl fmt::Display for Holding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Holding::Token(token) => write!(f, "token {token}"),
            Holding::Native => f.write_str("native currency"),
        }
    }
}

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// How a failure should be treated by whoever sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The input is wrong and will stay wrong. Never retried.
    Validation,
    /// The caller is not allowed to do this. No state changed.
    Authorization,
    /// Not enough balance, shares or allowance right now. The call failed;
    /// the caller may try again once the situation changes.
    Resource,
    /// The relay refused the message.
    Transport,
    /// Persistence failed. Redelivering the same message may succeed.
    Storage,
}

// ---------------------------------------------------------------------------
// EndpointError
// ---------------------------------------------------------------------------

/// Every way an endpoint operation can fail. A failed operation leaves the
/// endpoint's state exactly as it was.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// The decoded message breaks an invariant (unknown asset, zero amount,
    /// mismatched origin, unbacked amount).
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("malformed payload: {0}")]
    Decode(#[from] DecodeError),

    #[error("destination chain {0} is not allowed")]
    UnsupportedDestination(ChainSelector),

    #[error("asset {0} is not recognized by this endpoint")]
    UnsupportedAsset(Address),

    #[error("{caller} is not authorized")]
    Unauthorized { caller: Address },

    #[error("insufficient {holding}: available {available}, requested {requested}")]
    InsufficientBalance {
        holding: Holding,
        available: Amount,
        requested: Amount,
    },

    #[error("insufficient shares: {holder} holds {available}, requested {requested}")]
    InsufficientShares {
        holder: Address,
        available: Amount,
        requested: Amount,
    },

    #[error("insufficient yield allowance: available {available}, requested {requested}")]
    InsufficientAllowance { available: Amount, requested: Amount },

    #[error("nothing to withdraw: {0} balance is zero")]
    NothingToWithdraw(Holding),

    #[error("amount must be greater than zero")]
    ZeroAmount,

    #[error("arithmetic overflow")]
    Overflow,

    /// The vault refused an operation for a reason other than the above.
    #[error("vault error: {0}")]
    Vault(VaultError),

    #[error("transport rejected message: {0}")]
    TransportRejected(#[from] TransportError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("snapshot error: {0}")]
    Snapshot(String),
}

impl EndpointError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EndpointError::InvalidMessage(_)
            | EndpointError::Decode(_)
            | EndpointError::UnsupportedDestination(_)
            | EndpointError::UnsupportedAsset(_)
            | EndpointError::ZeroAmount => ErrorKind::Validation,
            EndpointError::Unauthorized { .. } => ErrorKind::Authorization,
            EndpointError::InsufficientBalance { .. }
            | EndpointError::InsufficientShares { .. }
            | EndpointError::InsufficientAllowance { .. }
            | EndpointError::NothingToWithdraw(_)
            | EndpointError::Overflow => ErrorKind::Resource,
            EndpointError::TransportRejected(_) => ErrorKind::Transport,
            EndpointError::Vault(_) | EndpointError::Ledger(_) | EndpointError::Snapshot(_) => {
                ErrorKind::Storage
            }
        }
    }

    /// Whether delivering the same inbound message again could succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Storage
    }
}

impl From<VaultError> for EndpointError {
    fn from(e: VaultError) -> Self {
        match e {
            VaultError::InsufficientShares {
                holder,
                available,
                requested,
            } => EndpointError::InsufficientShares {
                holder,
                available,
                requested,
            },
            VaultError::ZeroAmount => EndpointError::ZeroAmount,
            VaultError::Overflow => EndpointError::Overflow,
            other => EndpointError::Vault(other),
        }
    }
}

impl From<EndpointError> for DeliveryError {
    fn from(e: EndpointError) -> Self {
        if e.is_retryable() {
            DeliveryError::retryable(e.to_string())
        } else {
            DeliveryError::terminal(e.to_string())
        }
    }
}

pub type EndpointResult<T> = Result<T, EndpointError>;
