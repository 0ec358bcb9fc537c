//! Shared fixtures: a Fuji sender and a Sepolia vault wired through an
//! in-memory router, funded the way the reference deployment funds them.

#![allow(dead_code)]

use std::sync::Arc;

use stake_across_contracts::{Sender, TransferRequest, VaultProtocol};
use stake_across_protocol::config::{
    network_by_name, EndpointConfig, FundingMode, FUJI_BNM_TOKEN, FUJI_CHAIN_SELECTOR,
    FUJI_LINK_TOKEN, FUJI_ROUTER, PROTOCOL_FEE_FUNDING, PROTOCOL_NATIVE_FUNDING,
    PROTOCOL_YIELD_ALLOWANCE, SENDER_ASSET_FUNDING, SENDER_FEE_FUNDING, SEPOLIA_BNM_TOKEN,
    SEPOLIA_CHAIN_SELECTOR, SEPOLIA_LINK_TOKEN, SEPOLIA_ROUTER,
};
use stake_across_protocol::ledger::MessageLedger;
use stake_across_protocol::message::CrossChainMessage;
use stake_across_protocol::transport::{InMemoryRouter, InboundDelivery, RouterConfig, Transport};
use stake_across_protocol::{Address, Amount, MessageId, TokenAmount};

pub const E18: Amount = 1_000_000_000_000_000_000;

pub fn owner() -> Address {
    Address::derive("deployer")
}

pub fn sender_identity() -> Address {
    Address::derive("fuji-sender")
}

pub fn vault_identity() -> Address {
    Address::derive("sepolia-vault")
}

pub fn sender_config(mode: FundingMode) -> EndpointConfig {
    let fuji = network_by_name("fuji").expect("fuji");
    EndpointConfig::for_network(&fuji, "sender", sender_identity(), owner())
        .allow_destination(SEPOLIA_CHAIN_SELECTOR)
        .recognize_asset(SEPOLIA_BNM_TOKEN)
        .with_funding_mode(mode)
}

pub fn vault_config() -> EndpointConfig {
    let sepolia = network_by_name("sepolia").expect("sepolia");
    EndpointConfig::for_network(&sepolia, "vault", vault_identity(), owner())
        .allow_destination(FUJI_CHAIN_SELECTOR)
        .recognize_asset(FUJI_BNM_TOKEN)
}

pub struct Harness {
    pub router: Arc<InMemoryRouter>,
    pub sender: Arc<Sender>,
    pub vault: Arc<VaultProtocol>,
}

pub struct HarnessBuilder {
    router: RouterConfig,
    mode: FundingMode,
    sender_ledger: Option<MessageLedger>,
    vault_ledger: Option<MessageLedger>,
    vault_transport: Option<Arc<dyn Transport>>,
    fund: bool,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            router: RouterConfig::default(),
            mode: FundingMode::Prefunded,
            sender_ledger: None,
            vault_ledger: None,
            vault_transport: None,
            fund: true,
        }
    }

    pub fn router(mut self, config: RouterConfig) -> Self {
        self.router = config;
        self
    }

    pub fn funding_mode(mut self, mode: FundingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn ledgers(mut self, sender: MessageLedger, vault: MessageLedger) -> Self {
        self.sender_ledger = Some(sender);
        self.vault_ledger = Some(vault);
        self
    }

    pub fn vault_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.vault_transport = Some(transport);
        self
    }

    pub fn unfunded(mut self) -> Self {
        self.fund = false;
        self
    }

    pub fn build_with_router(self, router: Arc<InMemoryRouter>) -> Harness {
        let sender_ledger = self
            .sender_ledger
            .unwrap_or_else(|| MessageLedger::open_temporary().expect("ledger"));
        let vault_ledger = self
            .vault_ledger
            .unwrap_or_else(|| MessageLedger::open_temporary().expect("ledger"));
        let vault_transport: Arc<dyn Transport> =
            self.vault_transport.unwrap_or_else(|| router.clone() as Arc<dyn Transport>);

        let sender = Arc::new(
            Sender::open(sender_config(self.mode), router.clone(), sender_ledger).expect("sender"),
        );
        let vault = Arc::new(
            VaultProtocol::open(vault_config(), vault_transport, vault_ledger).expect("vault"),
        );
        router.register_receiver(FUJI_CHAIN_SELECTOR, sender_identity(), sender.clone());
        router.register_receiver(SEPOLIA_CHAIN_SELECTOR, vault_identity(), vault.clone());

        if self.fund {
            sender.fund_token(FUJI_BNM_TOKEN, SENDER_ASSET_FUNDING).unwrap();
            sender.fund_token(FUJI_LINK_TOKEN, SENDER_FEE_FUNDING).unwrap();
            vault.fund_token(SEPOLIA_LINK_TOKEN, PROTOCOL_FEE_FUNDING).unwrap();
            vault.fund_native(PROTOCOL_NATIVE_FUNDING).unwrap();
            vault.approve_yield(owner(), PROTOCOL_YIELD_ALLOWANCE).unwrap();
        }

        Harness {
            router,
            sender,
            vault,
        }
    }

    pub fn build(self) -> Harness {
        let router = Arc::new(InMemoryRouter::with_reference_networks(self.router.clone()));
        self.build_with_router(router)
    }
}

pub fn harness() -> Harness {
    HarnessBuilder::new().build()
}

/// A transfer of `amount` Fuji BnM to the vault.
pub fn transfer(amount: Amount) -> TransferRequest {
    TransferRequest::new(SEPOLIA_CHAIN_SELECTOR, vault_identity(), FUJI_BNM_TOKEN, amount)
}

/// A hand-built delivery to the vault, as if relayed from the sender.
pub fn deposit_delivery(id_byte: u8, depositor: Address, amount: Amount) -> InboundDelivery {
    let message = CrossChainMessage {
        source_chain_selector: FUJI_CHAIN_SELECTOR,
        sender: sender_identity(),
        depositor,
        token: FUJI_BNM_TOKEN,
        amount,
    };
    InboundDelivery {
        id: MessageId::from_bytes([id_byte; 32]),
        source_chain: FUJI_CHAIN_SELECTOR,
        sender: sender_identity(),
        payload: message.encode(),
        token_transfers: vec![TokenAmount {
            token: FUJI_BNM_TOKEN,
            amount,
        }],
    }
}

/// The identity the vault trusts for deliveries.
pub fn vault_router() -> Address {
    SEPOLIA_ROUTER
}

pub fn sender_router() -> Address {
    FUJI_ROUTER
}

/// Fee the default router charges for one envelope.
pub fn message_fee() -> Amount {
    let config = RouterConfig::default();
    config.base_fee + config.fee_per_byte * stake_across_protocol::message::ENCODED_LEN as Amount
}

/// A redemption of `shares` back to `receiver` on Fuji via the sender.
pub fn redeem(shares: Amount, receiver: Address) -> stake_across_contracts::RedeemRequest {
    stake_across_contracts::RedeemRequest {
        shares,
        destination_chain: FUJI_CHAIN_SELECTOR,
        receiver,
        destination_endpoint: sender_identity(),
        gas_limit: stake_across_protocol::config::DEFAULT_GAS_LIMIT,
    }
}
