//! Integration tests for the vault protocol endpoint: inbound deposits,
//! share accounting, redemption and yield.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use common::*;
use stake_across_contracts::{Dispatch, EndpointError, ErrorKind, Holding};
use stake_across_protocol::config::{
    PROTOCOL_FEE_FUNDING, PROTOCOL_YIELD_ALLOWANCE, SEPOLIA_BNM_TOKEN, SEPOLIA_LINK_TOKEN,
};
use stake_across_protocol::transport::{
    DeliveryStatus, InMemoryRouter, RouterConfig, SendRequest, Transport, TransportError,
};
use stake_across_protocol::{Address, Amount, MessageId};

// ---------------------------------------------------------------------------
// Inbound Deposits
// ---------------------------------------------------------------------------

#[test]
fn two_depositor_reference_scenario() {
    let h = harness();
    h.sender.fund_token(stake_across_protocol::config::FUJI_BNM_TOKEN, E18 / 2).unwrap();
    let d1 = owner();
    let d2 = Address::derive("second-account");

    let first = h.sender.initiate_transfer(d1, transfer(3 * E18 / 2)).unwrap();
    let second = h.sender.initiate_transfer(d2, transfer(E18 / 2)).unwrap();
    let reports = h.router.deliver_all();
    assert!(reports.iter().all(|r| r.status == DeliveryStatus::Applied));

    assert_eq!(h.vault.balance_of(&d1), 1_500_000_000_000_000_000);
    assert_eq!(h.vault.balance_of(&d2), 500_000_000_000_000_000);
    assert_eq!(h.vault.total_assets(), 2 * E18);
    assert_eq!(h.vault.total_supply(), 2 * E18);

    let detail = h.vault.message_detail(&first).unwrap();
    assert_eq!(detail.depositor, d1);
    assert_eq!(detail.amount, 3 * E18 / 2);
    assert_eq!(detail.sender, sender_identity());
    assert_eq!(h.vault.message_detail(&second).unwrap().depositor, d2);
}

#[test]
fn unknown_message_reads_as_zero() {
    let h = harness();
    let detail = h.vault.message_detail(&MessageId::from_bytes([9; 32])).unwrap();
    assert!(detail.is_zero());
}

#[test]
fn inbound_deposit_backs_shares_with_escrow() {
    let h = harness();
    h.vault
        .receive(vault_router(), &deposit_delivery(1, owner(), 7 * E18))
        .unwrap();
    assert_eq!(h.vault.escrow_balance(Holding::Token(SEPOLIA_BNM_TOKEN)), 7 * E18);
    assert_eq!(h.vault.total_assets(), 7 * E18);
}

#[test]
fn reads_expose_share_token_metadata() {
    let h = harness();
    assert_eq!(h.vault.asset().unwrap(), SEPOLIA_BNM_TOKEN);
    assert_eq!(h.vault.symbol(), "saBnM");
    assert_eq!(h.vault.decimals(), 18);
    assert_eq!(h.vault.preview_redeem(E18), 0);
}

// ---------------------------------------------------------------------------
// Redemption
// ---------------------------------------------------------------------------

#[test]
fn full_redeem_round_trip_returns_exact_assets() {
    let h = harness();
    let depositor = owner();
    h.vault
        .receive(vault_router(), &deposit_delivery(1, depositor, 1_234_567))
        .unwrap();

    let receipt = h
        .vault
        .request_cross_chain_redeem(depositor, redeem(1_234_567, depositor))
        .unwrap();
    assert_eq!(receipt.assets, 1_234_567);
    assert!(matches!(receipt.dispatch, Dispatch::Sent { .. }));
    assert_eq!(h.vault.total_assets(), 0);
    assert_eq!(h.vault.total_supply(), 0);
    assert_eq!(
        h.vault.escrow_balance(Holding::Token(SEPOLIA_LINK_TOKEN)),
        PROTOCOL_FEE_FUNDING - message_fee()
    );
}

#[test]
fn redeem_more_than_held_fails_without_burn() {
    let h = harness();
    let holder = owner();
    h.vault
        .receive(vault_router(), &deposit_delivery(1, holder, 100))
        .unwrap();
    let before = h.vault.state();

    let err = h
        .vault
        .request_cross_chain_redeem(holder, redeem(101, holder))
        .unwrap_err();
    assert!(matches!(
        err,
        EndpointError::InsufficientShares {
            available: 100,
            requested: 101,
            ..
        }
    ));
    assert_eq!(err.kind(), ErrorKind::Resource);
    assert_eq!(h.vault.state(), before);
    assert_eq!(h.router.in_flight(), 0);
}

#[test]
fn redeem_of_zero_shares_is_refused() {
    let h = harness();
    h.vault
        .receive(vault_router(), &deposit_delivery(1, owner(), 3))
        .unwrap();
    assert!(matches!(
        h.vault.request_cross_chain_redeem(owner(), redeem(0, owner())),
        Err(EndpointError::ZeroAmount)
    ));
}

#[test]
fn redeem_without_fee_funds_does_not_burn() {
    let h = HarnessBuilder::new().unfunded().build();
    let holder = owner();
    h.vault
        .receive(vault_router(), &deposit_delivery(1, holder, E18))
        .unwrap();

    let err = h
        .vault
        .request_cross_chain_redeem(holder, redeem(E18, holder))
        .unwrap_err();
    assert!(matches!(
        err,
        EndpointError::InsufficientBalance {
            holding: Holding::Token(SEPOLIA_LINK_TOKEN),
            ..
        }
    ));
    assert_eq!(h.vault.balance_of(&holder), E18);
}

#[test]
fn redeem_after_asset_sweep_is_refused() {
    let h = harness();
    let holder = owner();
    h.vault
        .receive(vault_router(), &deposit_delivery(1, holder, E18))
        .unwrap();
    h.vault.withdraw_token(owner(), SEPOLIA_BNM_TOKEN).unwrap();

    assert!(matches!(
        h.vault.request_cross_chain_redeem(holder, redeem(E18, holder)),
        Err(EndpointError::InsufficientBalance {
            holding: Holding::Token(SEPOLIA_BNM_TOKEN),
            ..
        })
    ));
    assert_eq!(h.vault.balance_of(&holder), E18);
}

/// Quotes like the router but refuses sends while `offline` is set.
struct FlakyRelay {
    inner: Arc<InMemoryRouter>,
    offline: AtomicBool,
}

impl Transport for FlakyRelay {
    fn fee(&self, request: &SendRequest) -> Result<Amount, TransportError> {
        self.inner.fee(request)
    }

    fn send(&self, request: SendRequest) -> Result<MessageId, TransportError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(TransportError::Rejected("relay offline".into()));
        }
        self.inner.send(request)
    }
}

#[test]
fn rejected_release_after_burn_is_recorded_as_stranded() {
    let router = Arc::new(InMemoryRouter::with_reference_networks(RouterConfig::default()));
    let relay = Arc::new(FlakyRelay {
        inner: router.clone(),
        offline: AtomicBool::new(true),
    });
    let h = HarnessBuilder::new()
        .vault_transport(relay)
        .build_with_router(router);
    let holder = owner();
    let receiver = Address::derive("receiver");
    h.vault
        .receive(vault_router(), &deposit_delivery(1, holder, E18))
        .unwrap();
    let escrow_before = h.vault.escrow();

    let receipt = h
        .vault
        .request_cross_chain_redeem(holder, redeem(E18 / 4, receiver))
        .unwrap();

    assert!(matches!(receipt.dispatch, Dispatch::Stranded { .. }));
    // The burn is final.
    assert_eq!(h.vault.balance_of(&holder), 3 * E18 / 4);
    assert_eq!(h.vault.total_assets(), 3 * E18 / 4);
    // Nothing left escrow.
    assert_eq!(h.vault.escrow(), escrow_before);

    let stranded = h.vault.stranded_releases();
    assert_eq!(stranded.len(), 1);
    assert_eq!(stranded[0].assets, E18 / 4);
    assert_eq!(stranded[0].receiver, receiver);
    assert!(stranded[0].reason.contains("relay offline"));
}

#[test]
fn share_transfer_moves_claim() {
    let h = harness();
    let a = owner();
    let b = Address::derive("b");
    h.vault
        .receive(vault_router(), &deposit_delivery(1, a, 10))
        .unwrap();
    h.vault.transfer_shares(a, b, 4).unwrap();
    assert_eq!(h.vault.balance_of(&a), 6);
    assert_eq!(h.vault.balance_of(&b), 4);
    assert!(h.vault.transfer_shares(b, a, 5).is_err());
}

// ---------------------------------------------------------------------------
// Yield
// ---------------------------------------------------------------------------

#[test]
fn yield_raises_share_price_without_minting() {
    let h = harness();
    let holder = owner();
    h.vault
        .receive(vault_router(), &deposit_delivery(1, holder, E18))
        .unwrap();

    h.vault.inject_yield(owner(), E18).unwrap();

    assert_eq!(h.vault.total_supply(), E18);
    assert_eq!(h.vault.total_assets(), 2 * E18);
    assert_eq!(h.vault.preview_redeem(E18), 2 * E18);
    assert_eq!(h.vault.escrow_balance(Holding::Token(SEPOLIA_BNM_TOKEN)), 2 * E18);
    assert_eq!(h.vault.yield_allowance(), PROTOCOL_YIELD_ALLOWANCE - E18);
}

#[test]
fn yield_is_limited_by_allowance_and_owner() {
    let h = harness();
    assert!(matches!(
        h.vault.inject_yield(owner(), PROTOCOL_YIELD_ALLOWANCE + 1),
        Err(EndpointError::InsufficientAllowance { .. })
    ));
    assert!(matches!(
        h.vault.inject_yield(Address::derive("mallory"), 1),
        Err(EndpointError::Unauthorized { .. })
    ));
    assert!(matches!(
        h.vault.approve_yield(Address::derive("mallory"), 1),
        Err(EndpointError::Unauthorized { .. })
    ));
    assert_eq!(h.vault.total_assets(), 0);
}

#[test]
fn later_depositor_gets_fewer_shares_after_yield() {
    let h = harness();
    h.vault
        .receive(vault_router(), &deposit_delivery(1, owner(), 100))
        .unwrap();
    h.vault.inject_yield(owner(), 200).unwrap();

    let late = Address::derive("late");
    h.vault
        .receive(vault_router(), &deposit_delivery(2, late, 150))
        .unwrap();
    // 150 * 100 / 300
    assert_eq!(h.vault.balance_of(&late), 50);
    assert!(h.vault.preview_redeem(50) <= 150);
}
