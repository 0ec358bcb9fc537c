//! # Message Ledger
//!
//! Durable, append-only record of every inbound message an endpoint has
//! accepted, keyed by the transport-assigned [`MessageId`]. The ledger is what
//! makes delivery idempotent: before applying anything, an endpoint asks the
//! ledger whether the ID was already processed.
//!
//! ## Record Lifecycle
//!
//! ```text
//!   (absent) ──record_pending──▶ processed=false ──commit_processed──▶ processed=true
//!                                       │
//!                                discard_pending (apply failed)
//!                                       ▼
//!                                   (absent)
//! ```
//!
//! A processed record is never rewritten or removed. A pending record is
//! invisible to [`MessageLedger::message_detail`] and only shows up in
//! [`MessageLedger::pending_messages`], which is the operator's view of
//! messages interrupted mid-apply.
//!
//! ## Snapshots
//!
//! The ledger also stores one opaque snapshot of the owning endpoint's state.
//! `commit_processed` writes the processed flag and the new snapshot in one
//! sled transaction, so a restart never sees a processed message whose
//! effects were lost, nor effects without the processed flag.

pub mod db;

pub use db::MessageLedger;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::CrossChainMessage;
use crate::types::MessageId;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// `commit_processed` or `discard_pending` on an ID that was never recorded.
    #[error("message {0} is not in the ledger")]
    UnknownMessage(MessageId),

    /// A processed record cannot be recorded, committed or discarded again.
    #[error("message {0} was already processed")]
    AlreadyProcessed(MessageId),

    /// A pending record exists for this ID with a different payload.
    #[error("message {0} conflicts with an existing pending record")]
    Conflict(MessageId),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

// ---------------------------------------------------------------------------
// MessageRecord
// ---------------------------------------------------------------------------

/// One ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: MessageId,
    pub message: CrossChainMessage,
    /// Flips false to true exactly once.
    pub processed: bool,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl MessageRecord {
    pub fn pending(id: MessageId, message: CrossChainMessage) -> Self {
        Self {
            id,
            message,
            processed: false,
            received_at: Utc::now(),
            processed_at: None,
        }
    }
}
