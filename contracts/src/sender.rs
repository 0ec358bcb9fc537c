//! # Sender
//!
//! Source-chain endpoint. Takes a local deposit out of escrow, pays the relay
//! fee and ships one cross-chain message per call to the vault on the
//! destination chain.
//!
//! The sender also receives the return trip: a redemption on the vault
//! sends the released assets back here, where they are paid out to the
//! receiver named in the message.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use stake_across_protocol::config::{EndpointConfig, DEFAULT_GAS_LIMIT};
use stake_across_protocol::message::CrossChainMessage;
use stake_across_protocol::{Address, Amount, ChainSelector, MessageId};

use crate::endpoint::{CrossChainEndpoint, EndpointRole, EndpointState, OutboundRecord};
use crate::error::{EndpointError, EndpointResult, Holding};

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct SenderRole;

/// Sender-specific persisted state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderState {
    /// Assets released to each receiver by return-trip messages.
    pub payouts: BTreeMap<Address, Amount>,
}

impl EndpointRole for SenderRole {
    type State = SenderState;
    const KIND: &'static str = "sender";

    fn apply_inbound(
        config: &EndpointConfig,
        _id: &MessageId,
        message: &CrossChainMessage,
        state: &mut EndpointState<SenderState>,
    ) -> EndpointResult<()> {
        let asset = config
            .primary_asset()
            .ok_or_else(|| EndpointError::InvalidMessage("sender has no asset".into()))?;
        state.escrow.debit(Holding::Token(asset), message.amount)?;

        let paid = state.role.payouts.entry(message.depositor).or_insert(0);
        *paid = paid
            .checked_add(message.amount)
            .ok_or(EndpointError::Overflow)?;
        Ok(())
    }
}

pub type Sender = CrossChainEndpoint<SenderRole>;

// ---------------------------------------------------------------------------
// Transfers
// ---------------------------------------------------------------------------

/// Arguments of [`Sender::initiate_transfer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub destination_chain: ChainSelector,
    /// The vault endpoint on the destination chain.
    pub receiver: Address,
    pub token: Address,
    pub amount: Amount,
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
}

fn default_gas_limit() -> u64 {
    DEFAULT_GAS_LIMIT
}

impl TransferRequest {
    pub fn new(
        destination_chain: ChainSelector,
        receiver: Address,
        token: Address,
        amount: Amount,
    ) -> Self {
        Self {
            destination_chain,
            receiver,
            token,
            amount,
            gas_limit: DEFAULT_GAS_LIMIT,
        }
    }
}

impl CrossChainEndpoint<SenderRole> {
    /// Escrows `amount` of `token` from `caller` and ships it to the vault.
    ///
    /// Returns the transport-assigned message ID. Acceptance by the
    /// transport is not delivery; poll the vault's ledger for the outcome.
    ///
    /// # Errors
    ///
    /// - [`EndpointError::ZeroAmount`], [`EndpointError::UnsupportedAsset`],
    ///   [`EndpointError::UnsupportedDestination`] on bad input.
    /// - [`EndpointError::InsufficientBalance`] if the escrow (or, in pull
    ///   mode, the caller's deposit) does not cover `amount`, or the fee
    ///   token escrow does not cover the fee.
    /// - [`EndpointError::TransportRejected`] if the transport refuses.
    ///
    /// On any error the escrow is unchanged.
    pub fn initiate_transfer(
        &self,
        caller: Address,
        request: TransferRequest,
    ) -> EndpointResult<MessageId> {
        if request.amount == 0 {
            return Err(EndpointError::ZeroAmount);
        }
        self.ensure_destination(request.destination_chain)?;
        if !self.config().is_recognized_asset(&request.token) {
            return Err(EndpointError::UnsupportedAsset(request.token));
        }

        let mut state = self.lock();
        let mut next = state.clone();
        next.escrow.spend(
            self.config().funding_mode,
            caller,
            request.token,
            request.amount,
        )?;

        let message = CrossChainMessage {
            source_chain_selector: self.chain_selector(),
            sender: self.identity(),
            depositor: caller,
            token: request.token,
            amount: request.amount,
        };
        let send = self.request_for(
            request.destination_chain,
            request.receiver,
            &message,
            request.gas_limit,
        );
        let fee = self.charge_fee(&mut next, &send)?;
        let id = self.transport().send(send)?;

        next.outbound.push(OutboundRecord {
            id,
            destination_chain: request.destination_chain,
            receiver: request.receiver,
            message,
            fee,
            gas_limit: request.gas_limit,
            sent_at: Utc::now(),
        });
        self.commit_after_send(&mut state, next);

        info!(
            endpoint = %self.config().name,
            message_id = %id,
            depositor = %caller,
            destination = %request.destination_chain,
            amount = request.amount,
            fee,
            "transfer sent"
        );
        Ok(id)
    }

    /// Pull-mode funding: credits `amount` of `token` to escrow and to
    /// `caller`'s spendable sub-balance.
    pub fn deposit_for_transfer(
        &self,
        caller: Address,
        token: Address,
        amount: Amount,
    ) -> EndpointResult<()> {
        if amount == 0 {
            return Err(EndpointError::ZeroAmount);
        }
        if !self.config().is_recognized_asset(&token) {
            return Err(EndpointError::UnsupportedAsset(token));
        }
        self.update(|state| state.escrow.deposit_for(caller, token, amount))?;
        info!(endpoint = %self.config().name, depositor = %caller, %token, amount, "deposit escrowed");
        Ok(())
    }

    /// Unspent pull-mode deposit of `caller`.
    pub fn deposit_of(&self, caller: &Address, token: &Address) -> Amount {
        self.read(|state| state.escrow.deposit_of(caller, token))
    }

    /// Total released to `receiver` by return-trip messages.
    pub fn payouts_to(&self, receiver: &Address) -> Amount {
        self.read(|state| state.role.payouts.get(receiver).copied().unwrap_or(0))
    }
}
