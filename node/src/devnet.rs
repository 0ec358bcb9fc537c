//! # Devnet
//!
//! A Fuji [`Sender`] and a Sepolia [`VaultProtocol`] joined by one
//! [`InMemoryRouter`], set up and funded the way the reference deployment
//! is, plus the scripted flows the operator tooling runs against them:
//! transfer, read-message, yield, redeem and withdraw.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use stake_across_contracts::{
    CrossChainEndpoint, EndpointError, EndpointResult, EndpointRole, ErrorKind, Escrow, Holding,
    RedeemReceipt, RedeemRequest, Sender, StrandedRelease, TransferRequest, VaultProtocol,
};
use stake_across_protocol::config::{
    network_by_name, EndpointConfig, FundingMode, NetworkConfig, DEFAULT_GAS_LIMIT,
    ENVELOPE_LAYOUT_VERSION, FUJI_CHAIN_SELECTOR, ONE_TOKEN, PROTOCOL_FEE_FUNDING,
    PROTOCOL_NATIVE_FUNDING, PROTOCOL_YIELD_ALLOWANCE, SENDER_ASSET_FUNDING, SENDER_FEE_FUNDING,
    SEPOLIA_CHAIN_SELECTOR,
};
use stake_across_protocol::ledger::MessageLedger;
use stake_across_protocol::message::CrossChainMessage;
use stake_across_protocol::transport::{
    DeliveryReport, FailedDelivery, InMemoryRouter, RouterConfig, RouterStats,
};
use stake_across_protocol::vault::VaultState;
use stake_across_protocol::types::deserialize_amount;
use stake_across_protocol::{Address, Amount, MessageId};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Contents of the `--config` TOML file. Every field has a default. Amounts
/// above what a TOML integer holds are written as decimal strings.
///
/// ```toml
/// deployer = "deployer"
/// second_account = "0x1111111111111111111111111111111111111111"
/// funding_mode = "pull_from_depositor"
/// transfer_amount = 1000000000000000000
/// yield_amount = "25000000000000000000000"
///
/// [router]
/// seed = 42
/// reorder = true
/// duplicate_probability = 0.25
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DevnetConfig {
    /// Owner of both endpoints. A `0x` address, or a label to derive one from.
    pub deployer: String,
    /// The second depositor of the transfer flow.
    pub second_account: String,
    pub funding_mode: FundingMode,
    /// What the deployer sends in the transfer flow; the second account
    /// sends half of it.
    #[serde(deserialize_with = "deserialize_amount")]
    pub transfer_amount: Amount,
    /// Yield injected by the simulation before redeeming.
    #[serde(deserialize_with = "deserialize_amount")]
    pub yield_amount: Amount,
    /// How often `run` drains the router queue.
    pub delivery_interval_ms: u64,
    pub router: RouterConfig,
}

impl Default for DevnetConfig {
    fn default() -> Self {
        Self {
            deployer: "deployer".to_string(),
            second_account: "second-account".to_string(),
            funding_mode: FundingMode::Prefunded,
            transfer_amount: ONE_TOKEN,
            yield_amount: ONE_TOKEN,
            delivery_interval_ms: 1_000,
            router: RouterConfig::default(),
        }
    }
}

impl DevnetConfig {
    /// Reads `path`, or returns the defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    pub fn deployer_address(&self) -> Address {
        resolve_identity(&self.deployer)
    }

    pub fn second_address(&self) -> Address {
        resolve_identity(&self.second_account)
    }
}

/// `0x`-prefixed hex parses as an address; anything else is a label.
fn resolve_identity(value: &str) -> Address {
    value
        .parse()
        .unwrap_or_else(|_| Address::derive(value))
}

// ---------------------------------------------------------------------------
// Devnet
// ---------------------------------------------------------------------------

const SENDER_LABEL: &str = "fuji-sender";
const VAULT_LABEL: &str = "sepolia-vault";

/// Both endpoints and the router between them.
pub struct Devnet {
    config: DevnetConfig,
    fuji: NetworkConfig,
    sepolia: NetworkConfig,
    router: Arc<InMemoryRouter>,
    sender: Arc<Sender>,
    vault: Arc<VaultProtocol>,
}

/// Ledger directories under a data dir.
pub fn ledger_paths(data_dir: &Path) -> (PathBuf, PathBuf) {
    (data_dir.join("fuji-sender"), data_dir.join("sepolia-vault"))
}

fn open_ledger(path: Option<PathBuf>) -> Result<MessageLedger> {
    match path {
        Some(path) => {
            std::fs::create_dir_all(&path)
                .with_context(|| format!("failed to create ledger directory {}", path.display()))?;
            MessageLedger::open(&path)
                .with_context(|| format!("failed to open ledger at {}", path.display()))
        }
        None => MessageLedger::open_temporary().context("failed to open temporary ledger"),
    }
}

impl Devnet {
    /// Opens both endpoints. With a `data_dir` the ledgers (and with them
    /// all endpoint state) persist across runs.
    pub fn open(config: DevnetConfig, data_dir: Option<&Path>) -> Result<Self> {
        let fuji = network_by_name("fuji").context("fuji is a reference network")?;
        let sepolia = network_by_name("sepolia").context("sepolia is a reference network")?;
        let owner = config.deployer_address();

        let sender_config =
            EndpointConfig::for_network(&fuji, "fuji-sender", Address::derive(SENDER_LABEL), owner)
                .allow_destination(SEPOLIA_CHAIN_SELECTOR)
                .recognize_asset(sepolia.asset_token)
                .with_funding_mode(config.funding_mode);
        let vault_config = EndpointConfig::for_network(
            &sepolia,
            "sepolia-vault",
            Address::derive(VAULT_LABEL),
            owner,
        )
        .allow_destination(FUJI_CHAIN_SELECTOR)
        .recognize_asset(fuji.asset_token);

        let (sender_path, vault_path) = match data_dir {
            Some(dir) => {
                let (s, v) = ledger_paths(dir);
                (Some(s), Some(v))
            }
            None => (None, None),
        };

        let router = Arc::new(InMemoryRouter::with_reference_networks(config.router.clone()));
        let sender = Arc::new(
            Sender::open(sender_config, router.clone(), open_ledger(sender_path)?)
                .context("failed to open the Fuji sender")?,
        );
        let vault = Arc::new(
            VaultProtocol::open(vault_config, router.clone(), open_ledger(vault_path)?)
                .context("failed to open the Sepolia vault")?,
        );
        router.register_receiver(fuji.chain_selector, sender.identity(), sender.clone());
        router.register_receiver(sepolia.chain_selector, vault.identity(), vault.clone());

        Ok(Self {
            config,
            fuji,
            sepolia,
            router,
            sender,
            vault,
        })
    }

    pub fn config(&self) -> &DevnetConfig {
        &self.config
    }

    pub fn router(&self) -> &InMemoryRouter {
        &self.router
    }

    pub fn sender(&self) -> &Sender {
        &self.sender
    }

    pub fn vault(&self) -> &VaultProtocol {
        &self.vault
    }

    pub fn deployer(&self) -> Address {
        self.config.deployer_address()
    }

    pub fn second_account(&self) -> Address {
        self.config.second_address()
    }

    /// True when neither endpoint has ever been funded or used.
    pub fn is_fresh(&self) -> bool {
        self.sender.escrow() == Escrow::default()
            && self.sender.outbound().is_empty()
            && self.vault.escrow() == Escrow::default()
            && self.vault.total_supply() == 0
    }

    // -- Setup --------------------------------------------------------------

    /// Reference funding: the sender gets 1.5 BnM and 5 LINK, the vault
    /// 1 LINK and 0.5 native plus a 5 BnM yield allowance from the deployer.
    ///
    /// In pull mode the sender's asset is not prefunded; depositors bring
    /// their own through [`Devnet::transfer`].
    pub fn setup(&self) -> EndpointResult<()> {
        if self.config.funding_mode == FundingMode::Prefunded {
            self.sender
                .fund_token(self.fuji.asset_token, SENDER_ASSET_FUNDING)?;
        }
        self.sender
            .fund_token(self.fuji.fee_token, SENDER_FEE_FUNDING)?;
        self.vault
            .fund_token(self.sepolia.fee_token, PROTOCOL_FEE_FUNDING)?;
        self.vault.fund_native(PROTOCOL_NATIVE_FUNDING)?;
        self.vault
            .approve_yield(self.deployer(), PROTOCOL_YIELD_ALLOWANCE)?;
        tracing::info!(mode = ?self.config.funding_mode, "reference funding applied");
        Ok(())
    }

    /// Runs [`Devnet::setup`] unless persisted state says it already ran.
    pub fn setup_if_fresh(&self) -> EndpointResult<bool> {
        if !self.is_fresh() {
            tracing::info!("endpoints restored from ledger; skipping setup");
            return Ok(false);
        }
        self.setup()?;
        Ok(true)
    }

    // -- Flows --------------------------------------------------------------

    /// Sends `amount` of Fuji BnM from `depositor` to the vault. In pull
    /// mode the depositor's tokens are escrowed first.
    pub fn transfer(&self, depositor: Address, amount: Amount) -> EndpointResult<MessageId> {
        if self.config.funding_mode == FundingMode::PullFromDepositor {
            self.sender
                .deposit_for_transfer(depositor, self.fuji.asset_token, amount)?;
        }
        self.sender.initiate_transfer(
            depositor,
            TransferRequest::new(
                self.sepolia.chain_selector,
                self.vault.identity(),
                self.fuji.asset_token,
                amount,
            ),
        )
    }

    /// The reference transfer flow: the deployer sends `transfer_amount`,
    /// the second account half of it, as two separate messages.
    pub fn run_transfer_flow(&self) -> EndpointResult<Vec<MessageId>> {
        let amount = self.config.transfer_amount;
        Ok(vec![
            self.transfer(self.deployer(), amount)?,
            self.transfer(self.second_account(), amount / 2)?,
        ])
    }

    /// Drains the router queue.
    pub fn deliver(&self) -> Vec<DeliveryReport> {
        let reports = self.router.deliver_all();
        if !reports.is_empty() {
            tracing::debug!(delivered = reports.len(), "router queue drained");
        }
        reports
    }

    /// Burns `shares` of `holder` and releases the assets to `receiver` on
    /// Fuji through the sender.
    pub fn redeem(
        &self,
        holder: Address,
        shares: Amount,
        receiver: Address,
    ) -> EndpointResult<RedeemReceipt> {
        self.vault.request_cross_chain_redeem(
            holder,
            RedeemRequest {
                shares,
                destination_chain: self.fuji.chain_selector,
                receiver,
                destination_endpoint: self.sender.identity(),
                gas_limit: DEFAULT_GAS_LIMIT,
            },
        )
    }

    /// Owner pulls `amount` from the yield allowance into the vault.
    pub fn inject_yield(&self, amount: Amount) -> EndpointResult<()> {
        self.vault.inject_yield(self.deployer(), amount)
    }

    /// Inbound message detail on `chain` (`fuji` or `sepolia`). `None` for
    /// an unknown chain name.
    pub fn message_detail(
        &self,
        chain: &str,
        id: &MessageId,
    ) -> Option<EndpointResult<CrossChainMessage>> {
        if chain.eq_ignore_ascii_case(&self.fuji.name) {
            Some(self.sender.message_detail(id))
        } else if chain.eq_ignore_ascii_case(&self.sepolia.name) {
            Some(self.vault.message_detail(id))
        } else {
            None
        }
    }

    /// Sweeps native, BnM and LINK out of both endpoints to `caller`.
    ///
    /// Every holding is attempted. A failure on one does not stop the rest,
    /// so the report says exactly what moved and what did not. Empty
    /// holdings are skipped.
    pub fn withdraw_all(&self, caller: Address) -> WithdrawalReport {
        let mut report = WithdrawalReport::default();
        for holding in [
            Holding::Native,
            Holding::Token(self.fuji.asset_token),
            Holding::Token(self.fuji.fee_token),
        ] {
            report.record(&self.sender.config().name, holding, sweep(&self.sender, caller, holding));
        }
        for holding in [
            Holding::Token(self.sepolia.fee_token),
            Holding::Native,
            Holding::Token(self.sepolia.asset_token),
        ] {
            report.record(&self.vault.config().name, holding, sweep(&self.vault, caller, holding));
        }
        report
    }

    // -- Reporting ----------------------------------------------------------

    pub fn status(&self) -> DevnetStatus {
        DevnetStatus {
            envelope_layout_version: ENVELOPE_LAYOUT_VERSION,
            funding_mode: self.config.funding_mode,
            vault: self.vault.vault_state(),
            router: self.router.stats(),
            sender_outbound: self.sender.outbound().len(),
            vault_outbound: self.vault.outbound().len(),
            stranded_releases: self.vault.stranded_releases().len(),
        }
    }

    /// Everything an operator needs to find stuck messages.
    pub fn reconciliation(&self) -> EndpointResult<Reconciliation> {
        Ok(Reconciliation {
            sender_pending: self
                .sender
                .pending_messages()?
                .into_iter()
                .map(|r| r.id)
                .collect(),
            vault_pending: self
                .vault
                .pending_messages()?
                .into_iter()
                .map(|r| r.id)
                .collect(),
            stranded: self.vault.stranded_releases(),
            failed_deliveries: self.router.failed_deliveries(),
        })
    }
}

impl Drop for Devnet {
    fn drop(&mut self) {
        // The router holds the endpoints and they hold the router.
        self.router.clear_receivers();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevnetStatus {
    pub envelope_layout_version: u8,
    pub funding_mode: FundingMode,
    pub vault: VaultState,
    pub router: RouterStats,
    pub sender_outbound: usize,
    pub vault_outbound: usize,
    pub stranded_releases: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub sender_pending: Vec<MessageId>,
    pub vault_pending: Vec<MessageId>,
    pub stranded: Vec<StrandedRelease>,
    pub failed_deliveries: Vec<FailedDelivery>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub endpoint: String,
    pub holding: Holding,
    pub amount: Amount,
}

/// A holding that could not be swept. Its balance is untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalFailure {
    pub endpoint: String,
    pub holding: Holding,
    pub kind: ErrorKind,
    pub error: String,
}

/// Outcome of [`Devnet::withdraw_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalReport {
    pub swept: Vec<Withdrawal>,
    pub failed: Vec<WithdrawalFailure>,
}

impl WithdrawalReport {
    fn record(&mut self, endpoint: &str, holding: Holding, result: EndpointResult<Amount>) {
        match result {
            Ok(amount) => self.swept.push(Withdrawal {
                endpoint: endpoint.to_string(),
                holding,
                amount,
            }),
            Err(EndpointError::NothingToWithdraw(_)) => {}
            Err(e) => {
                tracing::warn!(endpoint, %holding, error = %e, "sweep failed");
                self.failed.push(WithdrawalFailure {
                    endpoint: endpoint.to_string(),
                    holding,
                    kind: e.kind(),
                    error: e.to_string(),
                });
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Total swept out of `holding` across both endpoints.
    pub fn total(&self, holding: Holding) -> Amount {
        self.swept
            .iter()
            .filter(|w| w.holding == holding)
            .map(|w| w.amount)
            .sum()
    }
}

fn sweep<R: EndpointRole>(
    endpoint: &CrossChainEndpoint<R>,
    caller: Address,
    holding: Holding,
) -> EndpointResult<Amount> {
    match holding {
        Holding::Native => endpoint.withdraw_native(caller),
        Holding::Token(token) => endpoint.withdraw_token(caller, token),
    }
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

/// Outcome of [`simulate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationReport {
    pub transfers: Vec<MessageId>,
    pub deposits_seen: Vec<CrossChainMessage>,
    pub after_deposits: VaultState,
    pub after_yield: VaultState,
    pub redemption: RedeemReceipt,
    pub paid_out: Amount,
    pub withdrawals: WithdrawalReport,
    pub status: DevnetStatus,
}

/// Runs the whole reference sequence on a fresh devnet: setup, both
/// transfers, delivery, yield, a full redemption by the deployer back to
/// Fuji, delivery of the release, and the final sweep.
pub fn simulate(devnet: &Devnet) -> Result<SimulationReport> {
    devnet.setup().context("setup failed")?;

    let transfers = devnet
        .run_transfer_flow()
        .context("transfer flow failed")?;
    devnet.deliver();

    let deposits_seen = transfers
        .iter()
        .map(|id| devnet.vault().message_detail(id))
        .collect::<EndpointResult<Vec<_>>>()
        .context("reading message details failed")?;
    let after_deposits = devnet.vault().vault_state();

    let asset = devnet.vault().asset().context("vault has no asset")?;
    tracing::info!(
        %asset,
        symbol = devnet.vault().symbol(),
        total_assets = after_deposits.total_assets,
        total_shares = after_deposits.total_shares,
        "deposits applied"
    );

    if devnet.config().yield_amount > 0 {
        devnet
            .inject_yield(devnet.config().yield_amount)
            .context("yield injection failed")?;
    }
    let after_yield = devnet.vault().vault_state();

    let deployer = devnet.deployer();
    let shares = devnet.vault().balance_of(&deployer);
    tracing::info!(
        shares,
        preview = devnet.vault().preview_redeem(shares),
        "redeeming deployer position"
    );
    let redemption = devnet
        .redeem(deployer, shares, deployer)
        .context("redemption failed")?;
    devnet.deliver();
    let paid_out = devnet.sender().payouts_to(&deployer);

    let withdrawals = devnet.withdraw_all(deployer);
    if let Some(failure) = withdrawals.failed.first() {
        anyhow::bail!(
            "withdrawal from {} ({}) failed: {}",
            failure.endpoint,
            failure.holding,
            failure.error
        );
    }

    Ok(SimulationReport {
        transfers,
        deposits_seen,
        after_deposits,
        after_yield,
        redemption,
        paid_out,
        withdrawals,
        status: devnet.status(),
    })
}
