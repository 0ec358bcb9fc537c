//! # Stake Across Endpoints
//!
//! The two deployable components of Stake Across, built on one generic
//! [`CrossChainEndpoint`]:
//!
//! - **Sender** — escrows a local deposit and ships it across chains.
//! - **Vault Protocol** — applies inbound deposits exactly once, mints
//!   shares, and sends assets back on redemption.
//! - **Custody** — escrow bookkeeping and the owner-only withdrawal gate
//!   both of them use.
//!
//! ## Design Principles
//!
//! 1. All monetary operations are checked. Overflow is an error.
//! 2. Every mutation runs on a copy of the state and is swapped in only when
//!    it fully succeeded, under the endpoint's single lock.
//! 3. An inbound message ID is applied at most once, across restarts.
//! 4. Privileged operations name the caller explicitly and check it against
//!    the owner fixed at construction.

pub mod custody;
pub mod endpoint;
pub mod error;
pub mod sender;
pub mod vault_protocol;

pub use custody::{Escrow, OwnerGuard};
pub use endpoint::{CrossChainEndpoint, EndpointRole, EndpointState, OutboundRecord};
pub use error::{EndpointError, EndpointResult, ErrorKind, Holding};
pub use sender::{Sender, SenderRole, SenderState, TransferRequest};
pub use vault_protocol::{
    Dispatch, ProtocolRole, ProtocolState, RedeemReceipt, RedeemRequest, StrandedRelease,
    VaultProtocol,
};
