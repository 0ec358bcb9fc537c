//! # Protocol Configuration & Constants
//!
//! Every magic number in Stake Across lives here: the reference networks and
//! their token/router addresses, share token metadata, the reference funding
//! amounts used by the devnet setup flows, and the per-component
//! [`EndpointConfig`] that gets injected at construction time.
//!
//! Nothing in this module is ambient state. Components receive their owner,
//! trusted transport endpoint and recognized assets as explicit values, so a
//! test can stand up two vaults with different owners side by side.

use serde::{Deserialize, Serialize};

use crate::types::{address_literal, Address, Amount, ChainSelector};

// ---------------------------------------------------------------------------
// Units
// ---------------------------------------------------------------------------

/// One whole token in an 18-decimal denomination. Both LINK and CCIP-BnM
/// use 18 decimals, as does native ETH/AVAX.
pub const ONE_TOKEN: Amount = 1_000_000_000_000_000_000;

/// Gas limit hint attached to every outbound message by the reference flows.
/// Large enough for the vault's receive path with room to spare.
pub const DEFAULT_GAS_LIMIT: u64 = 600_000;

/// Version of the five-word message envelope layout. Never sent on the wire;
/// reported by the node so peers can confirm they agree on it.
pub const ENVELOPE_LAYOUT_VERSION: u8 = 1;

// ---------------------------------------------------------------------------
// Share Token
// ---------------------------------------------------------------------------

/// Human-readable name of the vault share token.
pub const SHARE_TOKEN_NAME: &str = "Stake Across Vault Share";

/// Ticker of the vault share token. Returned by `symbol()`.
pub const SHARE_TOKEN_SYMBOL: &str = "saBnM";

/// Shares use the same precision as the underlying asset.
pub const SHARE_TOKEN_DECIMALS: u8 = 18;

// ---------------------------------------------------------------------------
// Reference Networks
// ---------------------------------------------------------------------------

/// Sepolia hosts the vault protocol in the reference deployment.
pub const SEPOLIA_CHAIN_SELECTOR: ChainSelector = ChainSelector(16_015_286_601_757_825_753);

/// Avalanche Fuji hosts the sender in the reference deployment.
pub const FUJI_CHAIN_SELECTOR: ChainSelector = ChainSelector(14_767_482_510_784_806_043);

pub const SEPOLIA_ROUTER: Address = address_literal("0x0bf3de8c5d3e8a2b34d2beeb17abfcebaf363a59");
pub const SEPOLIA_LINK_TOKEN: Address =
    address_literal("0x779877A7B0D9E8603169DdbD7836e478b4624789");
pub const SEPOLIA_BNM_TOKEN: Address = address_literal("0xFd57b4ddBf88a4e07fF4e34C487b99af2Fe82a05");

pub const FUJI_ROUTER: Address = address_literal("0xf694e193200268f9a4868e4aa017a0118c9a8177");
pub const FUJI_LINK_TOKEN: Address = address_literal("0x0b9d5D9136855f6FEc3c0993feE6E9CE8a297846");
pub const FUJI_BNM_TOKEN: Address = address_literal("0xd21341536c5cf5eb1bcb58f6723ce26e8d8e90e4");

// ---------------------------------------------------------------------------
// Reference Funding
// ---------------------------------------------------------------------------

/// Asset pre-funded into the sender at setup (1.5 BnM).
pub const SENDER_ASSET_FUNDING: Amount = 3 * ONE_TOKEN / 2;

/// Fee token pre-funded into the sender at setup (5 LINK).
pub const SENDER_FEE_FUNDING: Amount = 5 * ONE_TOKEN;

/// Fee token pre-funded into the protocol at setup (1 LINK).
pub const PROTOCOL_FEE_FUNDING: Amount = ONE_TOKEN;

/// Native currency sent to the protocol at setup (0.5 ETH).
pub const PROTOCOL_NATIVE_FUNDING: Amount = ONE_TOKEN / 2;

/// Asset the deployer approves the protocol to pull for simulated yield (5 BnM).
pub const PROTOCOL_YIELD_ALLOWANCE: Amount = 5 * ONE_TOKEN;

// ---------------------------------------------------------------------------
// NetworkConfig
// ---------------------------------------------------------------------------

/// Static description of one chain the protocol is deployed on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Short name used on the command line (`sepolia`, `fuji`).
    pub name: String,
    /// Chain selector used by the transport.
    pub chain_selector: ChainSelector,
    /// Address of the transport router on this chain.
    pub router: Address,
    /// Token used to pay relay fees (LINK).
    pub fee_token: Address,
    /// The staked asset on this chain (CCIP-BnM).
    pub asset_token: Address,
    /// Symbol of the chain's native gas currency.
    pub native_currency_symbol: String,
}

/// The two reference networks.
pub fn networks() -> Vec<NetworkConfig> {
    vec![
        NetworkConfig {
            name: "sepolia".to_string(),
            chain_selector: SEPOLIA_CHAIN_SELECTOR,
            router: SEPOLIA_ROUTER,
            fee_token: SEPOLIA_LINK_TOKEN,
            asset_token: SEPOLIA_BNM_TOKEN,
            native_currency_symbol: "ETH".to_string(),
        },
        NetworkConfig {
            name: "fuji".to_string(),
            chain_selector: FUJI_CHAIN_SELECTOR,
            router: FUJI_ROUTER,
            fee_token: FUJI_LINK_TOKEN,
            asset_token: FUJI_BNM_TOKEN,
            native_currency_symbol: "AVAX".to_string(),
        },
    ]
}

/// Looks up a reference network by its short name (case-insensitive).
pub fn network_by_name(name: &str) -> Option<NetworkConfig> {
    networks()
        .into_iter()
        .find(|n| n.name.eq_ignore_ascii_case(name))
}

/// Looks up a reference network by chain selector.
pub fn network_by_selector(selector: ChainSelector) -> Option<NetworkConfig> {
    networks()
        .into_iter()
        .find(|n| n.chain_selector == selector)
}

// ---------------------------------------------------------------------------
// EndpointConfig
// ---------------------------------------------------------------------------

/// How a component's asset escrow is funded before an outbound transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundingMode {
    /// The component's shared escrow backs any caller's transfer. This is
    /// how the reference deployment works (the contract is topped up
    /// directly from the token contract) and is only suitable for demos.
    #[default]
    Prefunded,
    /// Each caller must deposit into a personal sub-balance first; a
    /// transfer may only spend what the caller deposited.
    PullFromDepositor,
}

/// Construction-time configuration of one cross-chain endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Label used in logs and the node API.
    pub name: String,
    /// This component's own identity, stamped into outbound messages as the
    /// sender address.
    pub identity: Address,
    /// The only identity allowed to sweep escrow or inject yield.
    pub owner: Address,
    /// Chain this component lives on.
    pub chain_selector: ChainSelector,
    /// The transport endpoint trusted to invoke the delivery callback.
    pub router: Address,
    /// Token used to pay relay fees.
    pub fee_token: Address,
    /// Assets this component accepts in inbound messages and outbound transfers.
    pub assets: Vec<Address>,
    /// Chains this component may send to.
    pub allowed_destinations: Vec<ChainSelector>,
    #[serde(default)]
    pub funding_mode: FundingMode,
}

impl EndpointConfig {
    /// Builds a config for a component deployed on a reference network,
    /// recognizing that network's asset and allowing no destinations yet.
    pub fn for_network(
        network: &NetworkConfig,
        name: impl Into<String>,
        identity: Address,
        owner: Address,
    ) -> Self {
        Self {
            name: name.into(),
            identity,
            owner,
            chain_selector: network.chain_selector,
            router: network.router,
            fee_token: network.fee_token,
            assets: vec![network.asset_token],
            allowed_destinations: Vec::new(),
            funding_mode: FundingMode::default(),
        }
    }

    /// Adds an allowed destination chain.
    pub fn allow_destination(mut self, destination: ChainSelector) -> Self {
        if !self.allowed_destinations.contains(&destination) {
            self.allowed_destinations.push(destination);
        }
        self
    }

    /// Accepts `token` in inbound messages as well. The relay delivers the
    /// counterpart chain's asset under its source-chain address; it is held
    /// here as the primary asset.
    pub fn recognize_asset(mut self, token: Address) -> Self {
        if !self.assets.contains(&token) {
            self.assets.push(token);
        }
        self
    }

    pub fn with_funding_mode(mut self, mode: FundingMode) -> Self {
        self.funding_mode = mode;
        self
    }

    pub fn is_recognized_asset(&self, token: &Address) -> bool {
        self.assets.contains(token)
    }

    pub fn is_allowed_destination(&self, destination: ChainSelector) -> bool {
        self.allowed_destinations.contains(&destination)
    }

    /// The primary asset. Vault components hold exactly one.
    pub fn primary_asset(&self) -> Option<Address> {
        self.assets.first().copied()
    }
}
