//! # Vault Protocol
//!
//! Destination-chain endpoint. Every inbound deposit message mints vault
//! shares to the depositor named in it; a local redemption burns shares and
//! sends the released assets back across chains.
//!
//! ## Redemption Ordering
//!
//! Shares are burned before the release message is handed to the transport.
//! If the transport then refuses the message, the burn stands: the assets
//! stay in escrow and the redemption is recorded as a [`StrandedRelease`] for
//! an operator to settle. The opposite order would let a holder keep shares
//! whose assets were already on their way out.
//!
//! ## Yield
//!
//! Yield is not generated here. The owner approves an allowance (the
//! reference deployment approves 5 BnM from the deployer) and then pulls
//! from it with [`VaultProtocol::inject_yield`], which raises total assets
//! without minting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use stake_across_protocol::config::{
    EndpointConfig, DEFAULT_GAS_LIMIT, SHARE_TOKEN_DECIMALS, SHARE_TOKEN_NAME, SHARE_TOKEN_SYMBOL,
};
use stake_across_protocol::message::CrossChainMessage;
use stake_across_protocol::vault::{Vault, VaultState};
use stake_across_protocol::{Address, Amount, ChainSelector, MessageId};

use crate::endpoint::{CrossChainEndpoint, EndpointRole, EndpointState, OutboundRecord};
use crate::error::{EndpointError, EndpointResult, Holding};

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct ProtocolRole;

/// A redemption whose shares were burned but whose release never left.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrandedRelease {
    pub holder: Address,
    pub receiver: Address,
    pub destination_chain: ChainSelector,
    pub shares: Amount,
    pub assets: Amount,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// Vault-specific persisted state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolState {
    pub vault: Vault,
    /// What the owner may still pull in as yield.
    pub yield_allowance: Amount,
    /// Total yield injected so far.
    pub yield_injected: Amount,
    pub stranded: Vec<StrandedRelease>,
}

impl EndpointRole for ProtocolRole {
    type State = ProtocolState;
    const KIND: &'static str = "vault";

    fn apply_inbound(
        config: &EndpointConfig,
        id: &MessageId,
        message: &CrossChainMessage,
        state: &mut EndpointState<ProtocolState>,
    ) -> EndpointResult<()> {
        let shares = state.role.vault.deposit(message.depositor, message.amount)?;
        if shares == 0 {
            warn!(
                endpoint = %config.name,
                message_id = %id,
                depositor = %message.depositor,
                amount = message.amount,
                "deposit too small to mint a share"
            );
        }
        info!(
            endpoint = %config.name,
            message_id = %id,
            depositor = %message.depositor,
            shares,
            total_assets = state.role.vault.total_assets(),
            total_shares = state.role.vault.total_supply(),
            "shares minted"
        );
        Ok(())
    }
}

pub type VaultProtocol = CrossChainEndpoint<ProtocolRole>;

// ---------------------------------------------------------------------------
// Redemption
// ---------------------------------------------------------------------------

/// Arguments of [`VaultProtocol::request_cross_chain_redeem`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemRequest {
    pub shares: Amount,
    pub destination_chain: ChainSelector,
    /// Who receives the released assets on the destination chain. Travels
    /// in the message's depositor field.
    pub receiver: Address,
    /// The endpoint on the destination chain the release is addressed to.
    pub destination_endpoint: Address,
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
}

fn default_gas_limit() -> u64 {
    DEFAULT_GAS_LIMIT
}

/// What happened to the release message after the burn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum Dispatch {
    Sent { message_id: MessageId },
    Stranded { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemReceipt {
    pub shares_burned: Amount,
    pub assets: Amount,
    pub dispatch: Dispatch,
}

impl CrossChainEndpoint<ProtocolRole> {
    // -- Reads --------------------------------------------------------------

    /// The staked asset.
    pub fn asset(&self) -> EndpointResult<Address> {
        self.primary_asset()
    }

    pub fn symbol(&self) -> &'static str {
        SHARE_TOKEN_SYMBOL
    }

    pub fn name(&self) -> &'static str {
        SHARE_TOKEN_NAME
    }

    pub fn decimals(&self) -> u8 {
        SHARE_TOKEN_DECIMALS
    }

    pub fn total_assets(&self) -> Amount {
        self.read(|state| state.role.vault.total_assets())
    }

    pub fn total_supply(&self) -> Amount {
        self.read(|state| state.role.vault.total_supply())
    }

    pub fn vault_state(&self) -> VaultState {
        self.read(|state| state.role.vault.state())
    }

    pub fn balance_of(&self, holder: &Address) -> Amount {
        self.read(|state| state.role.vault.balance_of(holder))
    }

    pub fn preview_redeem(&self, shares: Amount) -> Amount {
        self.read(|state| state.role.vault.preview_redeem(shares))
    }

    pub fn yield_allowance(&self) -> Amount {
        self.read(|state| state.role.yield_allowance)
    }

    /// Redemptions burned but never dispatched.
    pub fn stranded_releases(&self) -> Vec<StrandedRelease> {
        self.read(|state| state.role.stranded.clone())
    }

    // -- Writes -------------------------------------------------------------

    /// Burns `shares` from `caller` and sends the released assets to
    /// `request.receiver` on `request.destination_chain`.
    ///
    /// # Errors
    ///
    /// Everything up to the burn is checked first and leaves state untouched:
    /// zero shares or a zero payout, a disallowed destination,
    /// [`EndpointError::InsufficientShares`], a fee the transport will not
    /// quote, or escrow that cannot cover the fee or the assets.
    ///
    /// A transport refusal after the burn is not an error: the receipt comes
    /// back with [`Dispatch::Stranded`].
    pub fn request_cross_chain_redeem(
        &self,
        caller: Address,
        request: RedeemRequest,
    ) -> EndpointResult<RedeemReceipt> {
        if request.shares == 0 {
            return Err(EndpointError::ZeroAmount);
        }
        self.ensure_destination(request.destination_chain)?;
        let asset = self.primary_asset()?;

        let mut state = self.lock();
        let mut next = state.clone();

        let assets = next.role.vault.redeem(caller, request.shares)?;
        if assets == 0 {
            return Err(EndpointError::ZeroAmount);
        }

        let message = CrossChainMessage {
            source_chain_selector: self.chain_selector(),
            sender: self.identity(),
            depositor: request.receiver,
            token: asset,
            amount: assets,
        };
        let send = self.request_for(
            request.destination_chain,
            request.destination_endpoint,
            &message,
            request.gas_limit,
        );
        let fee = self.charge_fee(&mut next, &send)?;
        next.escrow.debit(Holding::Token(asset), assets)?;

        let dispatch = match self.transport().send(send) {
            Ok(id) => {
                next.outbound.push(OutboundRecord {
                    id,
                    destination_chain: request.destination_chain,
                    receiver: request.destination_endpoint,
                    message,
                    fee,
                    gas_limit: request.gas_limit,
                    sent_at: Utc::now(),
                });
                info!(
                    endpoint = %self.config().name,
                    message_id = %id,
                    holder = %caller,
                    receiver = %request.receiver,
                    shares = request.shares,
                    assets,
                    "redemption sent"
                );
                Dispatch::Sent { message_id: id }
            }
            Err(e) => {
                // Nothing left escrow; only the burn is final.
                next.escrow.credit(Holding::Token(asset), assets)?;
                next.escrow
                    .credit(Holding::Token(self.config().fee_token), fee)?;
                next.role.stranded.push(StrandedRelease {
                    holder: caller,
                    receiver: request.receiver,
                    destination_chain: request.destination_chain,
                    shares: request.shares,
                    assets,
                    reason: e.to_string(),
                    at: Utc::now(),
                });
                warn!(
                    endpoint = %self.config().name,
                    holder = %caller,
                    shares = request.shares,
                    assets,
                    error = %e,
                    "redemption burned but release was rejected"
                );
                Dispatch::Stranded {
                    reason: e.to_string(),
                }
            }
        };
        self.commit_after_send(&mut state, next);

        Ok(RedeemReceipt {
            shares_burned: request.shares,
            assets,
            dispatch,
        })
    }

    /// Moves shares between holders.
    pub fn transfer_shares(&self, caller: Address, to: Address, shares: Amount) -> EndpointResult<()> {
        self.update(|state| Ok(state.role.vault.transfer(caller, to, shares)?))
    }

    /// Sets how much yield the owner may inject.
    pub fn approve_yield(&self, caller: Address, allowance: Amount) -> EndpointResult<()> {
        self.authorize_owner(caller)?;
        self.update(|state| {
            state.role.yield_allowance = allowance;
            Ok(())
        })?;
        info!(endpoint = %self.config().name, allowance, "yield allowance approved");
        Ok(())
    }

    /// Pulls `amount` of the asset from the yield allowance into the vault.
    /// Raises total assets; mints nothing.
    pub fn inject_yield(&self, caller: Address, amount: Amount) -> EndpointResult<()> {
        self.authorize_owner(caller)?;
        if amount == 0 {
            return Err(EndpointError::ZeroAmount);
        }
        let asset = self.primary_asset()?;

        self.update(|state| {
            let available = state.role.yield_allowance;
            if available < amount {
                return Err(EndpointError::InsufficientAllowance {
                    available,
                    requested: amount,
                });
            }
            state.role.yield_allowance = available - amount;
            state.role.yield_injected = state
                .role
                .yield_injected
                .checked_add(amount)
                .ok_or(EndpointError::Overflow)?;
            state.role.vault.inject_yield(amount)?;
            state.escrow.credit(Holding::Token(asset), amount)
        })?;

        info!(
            endpoint = %self.config().name,
            amount,
            total_assets = self.total_assets(),
            "yield injected"
        );
        Ok(())
    }
}
