//! # Cross-Chain Endpoint
//!
//! Sender and Vault Protocol are the same machine with different inbound
//! rules. [`CrossChainEndpoint`] owns everything they share: configuration,
//! the owner guard, escrow, the message ledger and the transport handle. A
//! role type implementing [`EndpointRole`] supplies the role-specific state
//! and what an accepted inbound message does to it.
//!
//! ## Inbound Processing
//!
//! ```text
//! caller == router? ──no──▶ Unauthorized
//!        │
//! already processed? ──yes──▶ Duplicate (no effect)
//!        │
//! decode ──err──▶ Decode (terminal, nothing recorded)
//!        │
//! validate ──err──▶ InvalidMessage (terminal, nothing recorded)
//!        │
//! record pending ─▶ apply to a copy of state ─▶ commit processed + snapshot ─▶ swap
//!                          │ err                        │ err
//!                          └──── discard pending ◀──────┘
//! ```
//!
//! All of it runs under the endpoint's single lock, so from the outside the
//! apply step is indivisible: either the ledger says processed and the state
//! reflects the message, or neither.
//!
//! ## Persistence
//!
//! The whole [`EndpointState`] is snapshotted with bincode into the ledger's
//! snapshot tree after every mutation. Inbound applies write the snapshot in
//! the same transaction as the processed flag; everything else writes it
//! before the new state becomes visible. Outbound sends are the exception:
//! once the transport accepted a message the new state is kept even if the
//! snapshot write fails, because the send cannot be taken back.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use stake_across_protocol::config::EndpointConfig;
use stake_across_protocol::ledger::{MessageLedger, MessageRecord};
use stake_across_protocol::message::{decode, CrossChainMessage};
use stake_across_protocol::transport::{
    DeliveryError, InboundDelivery, InboundOutcome, MessageReceiver, SendRequest, Transport,
};
use stake_across_protocol::{Address, Amount, ChainSelector, MessageId, TokenAmount};

use crate::custody::{Escrow, OwnerGuard};
use crate::error::{EndpointError, EndpointResult, Holding};

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// What distinguishes one kind of endpoint from another.
pub trait EndpointRole: Send + Sync + 'static {
    /// Role-specific state, persisted with the rest of the endpoint.
    type State: Clone + Default + fmt::Debug + Serialize + DeserializeOwned + Send + Sync;

    /// Short name used in logs.
    const KIND: &'static str;

    /// Applies a validated inbound message. The delivered tokens have
    /// already been credited to escrow under the primary asset. Runs on a
    /// copy of the state; an `Err` discards the copy.
    fn apply_inbound(
        config: &EndpointConfig,
        id: &MessageId,
        message: &CrossChainMessage,
        state: &mut EndpointState<Self::State>,
    ) -> EndpointResult<()>;
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// An outbound message the transport accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundRecord {
    pub id: MessageId,
    pub destination_chain: ChainSelector,
    pub receiver: Address,
    pub message: CrossChainMessage,
    pub fee: Amount,
    pub gas_limit: u64,
    pub sent_at: DateTime<Utc>,
}

/// Everything an endpoint persists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(serialize = "S: Serialize", deserialize = "S: DeserializeOwned"))]
pub struct EndpointState<S> {
    pub escrow: Escrow,
    pub outbound: Vec<OutboundRecord>,
    pub role: S,
}

// ---------------------------------------------------------------------------
// CrossChainEndpoint
// ---------------------------------------------------------------------------

pub struct CrossChainEndpoint<R: EndpointRole> {
    config: EndpointConfig,
    guard: OwnerGuard,
    transport: Arc<dyn Transport>,
    ledger: MessageLedger,
    state: Mutex<EndpointState<R::State>>,
    _role: PhantomData<fn() -> R>,
}

impl<R: EndpointRole> fmt::Debug for CrossChainEndpoint<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrossChainEndpoint")
            .field("kind", &R::KIND)
            .field("name", &self.config.name)
            .field("identity", &self.config.identity)
            .field("chain", &self.config.chain_selector)
            .finish()
    }
}

impl<R: EndpointRole> CrossChainEndpoint<R> {
    /// Builds an endpoint over `ledger`, restoring state from its snapshot
    /// if one exists.
    ///
    /// Pending ledger records left by an interrupted apply are reported but
    /// not replayed; the transport's redelivery of those IDs completes them.
    pub fn open(
        config: EndpointConfig,
        transport: Arc<dyn Transport>,
        ledger: MessageLedger,
    ) -> EndpointResult<Self> {
        let state = match ledger.load_snapshot()? {
            Some(bytes) => bincode::deserialize(&bytes)
                .map_err(|e| EndpointError::Snapshot(e.to_string()))?,
            None => EndpointState::default(),
        };

        let pending = ledger.pending_messages()?;
        if !pending.is_empty() {
            warn!(
                endpoint = %config.name,
                pending = pending.len(),
                "ledger has messages interrupted before commit"
            );
        }
        info!(
            endpoint = %config.name,
            kind = R::KIND,
            identity = %config.identity,
            chain = %config.chain_selector,
            messages = ledger.len(),
            "endpoint opened"
        );

        Ok(Self {
            guard: OwnerGuard::new(config.owner),
            config,
            transport,
            ledger,
            state: Mutex::new(state),
            _role: PhantomData,
        })
    }

    // -- Reads --------------------------------------------------------------

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    pub fn identity(&self) -> Address {
        self.config.identity
    }

    pub fn owner(&self) -> Address {
        self.guard.owner()
    }

    pub fn chain_selector(&self) -> ChainSelector {
        self.config.chain_selector
    }

    /// `(source chain, sender, depositor, token, amount)` of a processed
    /// inbound message; the zero detail for unknown or unfinished IDs.
    pub fn message_detail(&self, id: &MessageId) -> EndpointResult<CrossChainMessage> {
        Ok(self.ledger.message_detail(id)?)
    }

    /// Inbound records whose apply never completed.
    pub fn pending_messages(&self) -> EndpointResult<Vec<MessageRecord>> {
        Ok(self.ledger.pending_messages()?)
    }

    pub fn outbound(&self) -> Vec<OutboundRecord> {
        self.state.lock().outbound.clone()
    }

    pub fn escrow(&self) -> Escrow {
        self.state.lock().escrow.clone()
    }

    pub fn escrow_balance(&self, holding: Holding) -> Amount {
        self.state.lock().escrow.balance(holding)
    }

    /// Copy of the full state.
    pub fn state(&self) -> EndpointState<R::State> {
        self.state.lock().clone()
    }

    // -- Funding & Custody --------------------------------------------------

    /// Transfers `amount` of `token` into escrow. Anyone may fund.
    pub fn fund_token(&self, token: Address, amount: Amount) -> EndpointResult<()> {
        if amount == 0 {
            return Err(EndpointError::ZeroAmount);
        }
        self.update(|state| state.escrow.credit(Holding::Token(token), amount))?;
        info!(endpoint = %self.config.name, %token, amount, "escrow funded");
        Ok(())
    }

    /// Sends native currency into escrow.
    pub fn fund_native(&self, amount: Amount) -> EndpointResult<()> {
        if amount == 0 {
            return Err(EndpointError::ZeroAmount);
        }
        self.update(|state| state.escrow.credit(Holding::Native, amount))?;
        info!(endpoint = %self.config.name, amount, "native escrow funded");
        Ok(())
    }

    /// Sweeps the whole escrowed balance of `token` to the owner.
    ///
    /// On a vault this includes the assets backing outstanding shares.
    pub fn withdraw_token(&self, caller: Address, token: Address) -> EndpointResult<Amount> {
        self.withdraw(caller, Holding::Token(token))
    }

    /// Sweeps the whole native balance to the owner.
    pub fn withdraw_native(&self, caller: Address) -> EndpointResult<Amount> {
        self.withdraw(caller, Holding::Native)
    }

    fn withdraw(&self, caller: Address, holding: Holding) -> EndpointResult<Amount> {
        if let Err(e) = self.guard.authorize(caller) {
            warn!(endpoint = %self.config.name, %caller, %holding, "unauthorized withdrawal");
            return Err(e);
        }
        let amount = self.update(|state| state.escrow.sweep(holding))?;
        info!(endpoint = %self.config.name, %holding, amount, to = %caller, "escrow withdrawn");
        Ok(amount)
    }

    // -- Inbound ------------------------------------------------------------

    /// Delivery callback.
    pub fn receive(
        &self,
        caller: Address,
        delivery: &InboundDelivery,
    ) -> EndpointResult<InboundOutcome> {
        let id = delivery.id;
        if caller != self.config.router {
            warn!(endpoint = %self.config.name, message_id = %id, %caller, "delivery from untrusted caller");
            return Err(EndpointError::Unauthorized { caller });
        }

        let mut state = self.state.lock();

        if self.ledger.is_processed(&id)? {
            debug!(endpoint = %self.config.name, message_id = %id, "duplicate delivery discarded");
            return Ok(InboundOutcome::Duplicate);
        }

        let message = decode(&delivery.payload)
            .map_err(EndpointError::from)
            .and_then(|m| self.validate_inbound(delivery, &m).map(|()| m))
            .map_err(|e| {
                warn!(endpoint = %self.config.name, message_id = %id, error = %e, "inbound message rejected");
                e
            })?;

        self.ledger.record_pending(id, message)?;

        let mut next = state.clone();
        let prepared = self
            .apply_inbound(&mut next, &id, &message)
            .and_then(|()| snapshot_bytes(&next));
        let snapshot = match prepared {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.abandon(&id);
                warn!(endpoint = %self.config.name, message_id = %id, error = %e, "inbound apply failed");
                return Err(e);
            }
        };

        if let Err(e) = self.ledger.commit_processed(&id, &snapshot) {
            self.abandon(&id);
            error!(endpoint = %self.config.name, message_id = %id, error = %e, "ledger commit failed");
            return Err(e.into());
        }
        *state = next;

        info!(
            endpoint = %self.config.name,
            message_id = %id,
            source = %message.source_chain_selector,
            depositor = %message.depositor,
            amount = message.amount,
            "inbound message applied"
        );
        Ok(InboundOutcome::Applied)
    }

    fn validate_inbound(
        &self,
        delivery: &InboundDelivery,
        message: &CrossChainMessage,
    ) -> EndpointResult<()> {
        if message.source_chain_selector != delivery.source_chain
            || message.sender != delivery.sender
        {
            return Err(EndpointError::InvalidMessage(
                "payload origin does not match the delivering route".to_string(),
            ));
        }
        if !self.config.is_recognized_asset(&message.token) {
            return Err(EndpointError::InvalidMessage(format!(
                "unrecognized asset {}",
                message.token
            )));
        }
        if message.amount == 0 {
            return Err(EndpointError::InvalidMessage("zero amount".to_string()));
        }

        let mut delivered: Amount = 0;
        for transfer in delivery
            .token_transfers
            .iter()
            .filter(|t| t.token == message.token)
        {
            delivered = delivered
                .checked_add(transfer.amount)
                .ok_or(EndpointError::Overflow)?;
        }
        if delivered != message.amount {
            return Err(EndpointError::InvalidMessage(format!(
                "amount {} not matched by delivered tokens ({delivered})",
                message.amount
            )));
        }
        Ok(())
    }

    fn apply_inbound(
        &self,
        next: &mut EndpointState<R::State>,
        id: &MessageId,
        message: &CrossChainMessage,
    ) -> EndpointResult<()> {
        let asset = self.primary_asset()?;
        next.escrow.credit(Holding::Token(asset), message.amount)?;
        R::apply_inbound(&self.config, id, message, next)
    }

    fn abandon(&self, id: &MessageId) {
        if let Err(e) = self.ledger.discard_pending(id) {
            error!(endpoint = %self.config.name, message_id = %id, error = %e, "could not discard pending record");
        }
    }

    // -- Helpers for roles --------------------------------------------------

    pub(crate) fn primary_asset(&self) -> EndpointResult<Address> {
        self.config
            .primary_asset()
            .ok_or_else(|| EndpointError::InvalidMessage("endpoint has no asset configured".into()))
    }

    pub(crate) fn authorize_owner(&self, caller: Address) -> EndpointResult<()> {
        self.guard.authorize(caller)
    }

    pub(crate) fn ensure_destination(&self, destination: ChainSelector) -> EndpointResult<()> {
        if !self.config.is_allowed_destination(destination) {
            return Err(EndpointError::UnsupportedDestination(destination));
        }
        Ok(())
    }

    /// Runs `f` against a copy of the state, persists the copy, then makes
    /// it current. Any error leaves the state untouched.
    pub(crate) fn update<T>(
        &self,
        f: impl FnOnce(&mut EndpointState<R::State>) -> EndpointResult<T>,
    ) -> EndpointResult<T> {
        let mut state = self.state.lock();
        let mut next = state.clone();
        let out = f(&mut next)?;
        self.ledger.put_snapshot(&snapshot_bytes(&next)?)?;
        *state = next;
        Ok(out)
    }

    pub(crate) fn read<T>(&self, f: impl FnOnce(&EndpointState<R::State>) -> T) -> T {
        f(&self.state.lock())
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, EndpointState<R::State>> {
        self.state.lock()
    }

    /// Makes `next` current after an irrevocable send.
    pub(crate) fn commit_after_send(
        &self,
        state: &mut EndpointState<R::State>,
        next: EndpointState<R::State>,
    ) {
        *state = next;
        let persisted = snapshot_bytes(state)
            .and_then(|bytes| self.ledger.put_snapshot(&bytes).map_err(EndpointError::from));
        if let Err(e) = persisted {
            error!(endpoint = %self.config.name, error = %e, "snapshot after send failed; state kept in memory");
        }
    }

    /// Builds the transport request for `message`, sending `message.amount`
    /// of `message.token` along with it.
    pub(crate) fn request_for(
        &self,
        destination: ChainSelector,
        receiver: Address,
        message: &CrossChainMessage,
        gas_limit: u64,
    ) -> SendRequest {
        SendRequest {
            source_chain: self.config.chain_selector,
            sender: self.config.identity,
            destination_chain: destination,
            receiver,
            payload: message.encode(),
            fee_token: self.config.fee_token,
            token_transfers: vec![TokenAmount {
                token: message.token,
                amount: message.amount,
            }],
            gas_limit,
        }
    }

    /// Quotes the fee for `request` and debits it from fee-token escrow.
    pub(crate) fn charge_fee(
        &self,
        next: &mut EndpointState<R::State>,
        request: &SendRequest,
    ) -> EndpointResult<Amount> {
        let fee = self.transport.fee(request)?;
        next.escrow.debit(Holding::Token(self.config.fee_token), fee)?;
        Ok(fee)
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }
}

impl<R: EndpointRole> MessageReceiver for CrossChainEndpoint<R> {
    fn on_message_received(
        &self,
        caller: Address,
        delivery: &InboundDelivery,
    ) -> Result<InboundOutcome, DeliveryError> {
        self.receive(caller, delivery).map_err(DeliveryError::from)
    }
}

fn snapshot_bytes<S: Serialize>(state: &S) -> EndpointResult<Vec<u8>> {
    bincode::serialize(state).map_err(|e| EndpointError::Snapshot(e.to_string()))
}
