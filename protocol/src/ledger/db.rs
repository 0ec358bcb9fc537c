//! sled-backed [`MessageLedger`].
//!
//! | Tree        | Key                  | Value                   |
//! |-------------|----------------------|-------------------------|
//! | `messages`  | `message_id` (32B)   | `bincode(MessageRecord)`|
//! | `snapshots` | `"state"`            | opaque endpoint state   |

use chrono::Utc;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use std::path::Path;
use tracing::debug;

use super::{LedgerError, LedgerResult, MessageRecord};
use crate::message::CrossChainMessage;
use crate::types::MessageId;

const SNAPSHOT_KEY: &[u8] = b"state";

fn encode_record(record: &MessageRecord) -> LedgerResult<Vec<u8>> {
    bincode::serialize(record).map_err(|e| LedgerError::Serialization(e.to_string()))
}

fn decode_record(bytes: &[u8]) -> LedgerResult<MessageRecord> {
    bincode::deserialize(bytes).map_err(|e| LedgerError::Serialization(e.to_string()))
}

/// Persistent message ledger for one endpoint.
///
/// Cheap to clone; clones share the same sled handle. Writers are expected
/// to be serialized by the owning endpoint's lock, which is what makes the
/// check-then-insert in [`record_pending`](Self::record_pending) safe.
#[derive(Debug, Clone)]
pub struct MessageLedger {
    db: Db,
    messages: Tree,
    snapshots: Tree,
}

impl MessageLedger {
    /// Open or create a ledger at the given directory.
    pub fn open<P: AsRef<Path>>(path: P) -> LedgerResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// In-memory ledger, removed on drop. For tests and ephemeral devnets.
    pub fn open_temporary() -> LedgerResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> LedgerResult<Self> {
        let messages = db.open_tree("messages")?;
        let snapshots = db.open_tree("snapshots")?;
        Ok(Self {
            db,
            messages,
            snapshots,
        })
    }

    // -- Reads --------------------------------------------------------------

    /// The raw record, pending or processed.
    pub fn get(&self, id: &MessageId) -> LedgerResult<Option<MessageRecord>> {
        match self.messages.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(decode_record(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn is_processed(&self, id: &MessageId) -> LedgerResult<bool> {
        Ok(self.get(id)?.map(|r| r.processed).unwrap_or(false))
    }

    /// The decoded detail of a processed message, or the zero detail if the
    /// ID is unknown or still pending.
    pub fn message_detail(&self, id: &MessageId) -> LedgerResult<CrossChainMessage> {
        Ok(self
            .get(id)?
            .filter(|r| r.processed)
            .map(|r| r.message)
            .unwrap_or_else(CrossChainMessage::zero))
    }

    /// Records whose apply never completed, oldest first.
    pub fn pending_messages(&self) -> LedgerResult<Vec<MessageRecord>> {
        let mut pending = Vec::new();
        for entry in self.messages.iter() {
            let (_key, value) = entry?;
            let record = decode_record(&value)?;
            if !record.processed {
                pending.push(record);
            }
        }
        pending.sort_by_key(|r| r.received_at);
        Ok(pending)
    }

    /// Number of records, pending included.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    // -- Writes -------------------------------------------------------------

    /// Writes a `processed = false` record ahead of applying the message.
    ///
    /// Re-recording the same payload under the same ID is allowed and keeps
    /// the original `received_at`; this is the path a redelivery takes after
    /// a crash between record and commit.
    pub fn record_pending(
        &self,
        id: MessageId,
        message: CrossChainMessage,
    ) -> LedgerResult<MessageRecord> {
        if let Some(existing) = self.get(&id)? {
            if existing.processed {
                return Err(LedgerError::AlreadyProcessed(id));
            }
            if existing.message != message {
                return Err(LedgerError::Conflict(id));
            }
            debug!(message_id = %id, "pending record already present");
            return Ok(existing);
        }

        let record = MessageRecord::pending(id, message);
        self.messages
            .insert(id.as_bytes(), encode_record(&record)?)?;
        Ok(record)
    }

    /// Removes a pending record after its apply step failed.
    pub fn discard_pending(&self, id: &MessageId) -> LedgerResult<()> {
        match self.get(id)? {
            Some(record) if record.processed => Err(LedgerError::AlreadyProcessed(*id)),
            Some(_) => {
                self.messages.remove(id.as_bytes())?;
                Ok(())
            }
            None => Err(LedgerError::UnknownMessage(*id)),
        }
    }

    /// Marks `id` processed and stores `snapshot` in one transaction, then
    /// flushes.
    pub fn commit_processed(&self, id: &MessageId, snapshot: &[u8]) -> LedgerResult<MessageRecord> {
        let key = id.as_bytes();
        let outcome = (&self.messages, &self.snapshots).transaction(|(messages, snapshots)| {
            let bytes = messages
                .get(&key[..])?
                .ok_or(ConflictableTransactionError::Abort(LedgerError::UnknownMessage(*id)))?;
            let mut record = decode_record(&bytes).map_err(ConflictableTransactionError::Abort)?;
            if record.processed {
                return Err(ConflictableTransactionError::Abort(
                    LedgerError::AlreadyProcessed(*id),
                ));
            }
            record.processed = true;
            record.processed_at = Some(Utc::now());

            let encoded = encode_record(&record).map_err(ConflictableTransactionError::Abort)?;
            messages.insert(&key[..], encoded)?;
            snapshots.insert(SNAPSHOT_KEY, snapshot)?;
            Ok(record)
        });

        let record = outcome.map_err(|e| match e {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => LedgerError::Sled(e),
        })?;
        self.db.flush()?;
        Ok(record)
    }

    /// Stores a snapshot outside of any message commit (redeem, withdraw,
    /// funding).
    pub fn put_snapshot(&self, snapshot: &[u8]) -> LedgerResult<()> {
        self.snapshots.insert(SNAPSHOT_KEY, snapshot)?;
        self.db.flush()?;
        Ok(())
    }

    pub fn load_snapshot(&self) -> LedgerResult<Option<Vec<u8>>> {
        Ok(self.snapshots.get(SNAPSHOT_KEY)?.map(|v| v.to_vec()))
    }

    pub fn flush(&self) -> LedgerResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Address, ChainSelector};

    fn id(byte: u8) -> MessageId {
        MessageId::from_bytes([byte; 32])
    }

    fn message(amount: u128) -> CrossChainMessage {
        CrossChainMessage {
            source_chain_selector: ChainSelector(7),
            sender: Address::derive("sender"),
            depositor: Address::derive("depositor"),
            token: Address::derive("token"),
            amount,
        }
    }

    #[test]
    fn unknown_id_reads_as_zero_detail() {
        let ledger = MessageLedger::open_temporary().unwrap();
        assert!(ledger.message_detail(&id(1)).unwrap().is_zero());
        assert!(!ledger.is_processed(&id(1)).unwrap());
        assert!(ledger.is_empty());
    }

    #[test]
    fn pending_record_is_hidden_from_detail() {
        let ledger = MessageLedger::open_temporary().unwrap();
        ledger.record_pending(id(1), message(5)).unwrap();

        assert!(ledger.message_detail(&id(1)).unwrap().is_zero());
        let pending = ledger.pending_messages().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id(1));
    }

    #[test]
    fn commit_flips_processed_and_stores_snapshot() {
        let ledger = MessageLedger::open_temporary().unwrap();
        ledger.record_pending(id(1), message(5)).unwrap();
        let record = ledger.commit_processed(&id(1), b"snap-1").unwrap();

        assert!(record.processed);
        assert!(record.processed_at.is_some());
        assert_eq!(ledger.message_detail(&id(1)).unwrap(), message(5));
        assert_eq!(ledger.load_snapshot().unwrap(), Some(b"snap-1".to_vec()));
        assert!(ledger.pending_messages().unwrap().is_empty());
    }

    #[test]
    fn processed_record_is_immutable() {
        let ledger = MessageLedger::open_temporary().unwrap();
        ledger.record_pending(id(1), message(5)).unwrap();
        ledger.commit_processed(&id(1), b"a").unwrap();

        assert!(matches!(
            ledger.commit_processed(&id(1), b"b"),
            Err(LedgerError::AlreadyProcessed(_))
        ));
        assert!(matches!(
            ledger.record_pending(id(1), message(9)),
            Err(LedgerError::AlreadyProcessed(_))
        ));
        assert!(matches!(
            ledger.discard_pending(&id(1)),
            Err(LedgerError::AlreadyProcessed(_))
        ));
        // The aborted commit did not touch the snapshot.
        assert_eq!(ledger.load_snapshot().unwrap(), Some(b"a".to_vec()));
    }

    #[test]
    fn commit_of_unknown_id_fails() {
        let ledger = MessageLedger::open_temporary().unwrap();
        assert!(matches!(
            ledger.commit_processed(&id(3), b"x"),
            Err(LedgerError::UnknownMessage(_))
        ));
        assert_eq!(ledger.load_snapshot().unwrap(), None);
    }

    #[test]
    fn rerecording_pending_is_idempotent_but_conflicts_are_not() {
        let ledger = MessageLedger::open_temporary().unwrap();
        let first = ledger.record_pending(id(1), message(5)).unwrap();
        let again = ledger.record_pending(id(1), message(5)).unwrap();
        assert_eq!(first, again);
        assert!(matches!(
            ledger.record_pending(id(1), message(6)),
            Err(LedgerError::Conflict(_))
        ));
    }

    #[test]
    fn discard_removes_pending() {
        let ledger = MessageLedger::open_temporary().unwrap();
        ledger.record_pending(id(1), message(5)).unwrap();
        ledger.discard_pending(&id(1)).unwrap();
        assert!(ledger.get(&id(1)).unwrap().is_none());
        assert!(matches!(
            ledger.discard_pending(&id(1)),
            Err(LedgerError::UnknownMessage(_))
        ));
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let ledger = MessageLedger::open(dir.path()).unwrap();
            ledger.record_pending(id(1), message(5)).unwrap();
            ledger.commit_processed(&id(1), b"persisted").unwrap();
            ledger.record_pending(id(2), message(6)).unwrap();
            ledger.flush().unwrap();
        }
        let ledger = MessageLedger::open(dir.path()).unwrap();
        assert_eq!(ledger.len(), 2);
        assert!(ledger.is_processed(&id(1)).unwrap());
        assert_eq!(ledger.pending_messages().unwrap()[0].id, id(2));
        assert_eq!(ledger.load_snapshot().unwrap(), Some(b"persisted".to_vec()));
    }
}
