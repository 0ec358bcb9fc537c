//! Integration tests for the owner-gated withdrawal guard on both endpoints.

mod common;

use common::*;
use stake_across_contracts::{EndpointError, ErrorKind, Holding};
use stake_across_protocol::config::{
    FUJI_BNM_TOKEN, FUJI_LINK_TOKEN, PROTOCOL_FEE_FUNDING, PROTOCOL_NATIVE_FUNDING,
    SENDER_ASSET_FUNDING, SENDER_FEE_FUNDING, SEPOLIA_LINK_TOKEN,
};
use stake_across_protocol::Address;

#[test]
fn non_owner_withdrawal_is_unauthorized_and_changes_nothing() {
    let h = harness();
    let mallory = Address::derive("mallory");
    let sender_before = h.sender.escrow();
    let vault_before = h.vault.escrow();

    let err = h.sender.withdraw_token(mallory, FUJI_BNM_TOKEN).unwrap_err();
    assert!(matches!(err, EndpointError::Unauthorized { caller } if caller == mallory));
    assert_eq!(err.kind(), ErrorKind::Authorization);
    assert!(matches!(
        h.vault.withdraw_native(mallory),
        Err(EndpointError::Unauthorized { .. })
    ));

    assert_eq!(h.sender.escrow(), sender_before);
    assert_eq!(h.vault.escrow(), vault_before);
}

#[test]
fn owner_sweeps_sender_balances() {
    let h = harness();
    h.sender.fund_native(1_000).unwrap();

    assert_eq!(h.sender.withdraw_native(owner()).unwrap(), 1_000);
    assert_eq!(
        h.sender.withdraw_token(owner(), FUJI_BNM_TOKEN).unwrap(),
        SENDER_ASSET_FUNDING
    );
    assert_eq!(
        h.sender.withdraw_token(owner(), FUJI_LINK_TOKEN).unwrap(),
        SENDER_FEE_FUNDING
    );
    assert_eq!(h.sender.escrow().tokens().count(), 0);
}

#[test]
fn owner_sweeps_protocol_balances() {
    let h = harness();
    assert_eq!(
        h.vault.withdraw_token(owner(), SEPOLIA_LINK_TOKEN).unwrap(),
        PROTOCOL_FEE_FUNDING
    );
    assert_eq!(h.vault.withdraw_native(owner()).unwrap(), PROTOCOL_NATIVE_FUNDING);
    assert_eq!(h.vault.escrow_balance(Holding::Native), 0);
}

#[test]
fn empty_sweep_reports_nothing_to_withdraw() {
    let h = harness();
    h.vault.withdraw_native(owner()).unwrap();
    let err = h.vault.withdraw_native(owner()).unwrap_err();
    assert!(matches!(err, EndpointError::NothingToWithdraw(Holding::Native)));
    assert_eq!(err.kind(), ErrorKind::Resource);
}

#[test]
fn funding_requires_positive_amount() {
    let h = harness();
    assert!(matches!(
        h.sender.fund_token(FUJI_BNM_TOKEN, 0),
        Err(EndpointError::ZeroAmount)
    ));
    assert!(matches!(h.vault.fund_native(0), Err(EndpointError::ZeroAmount)));
}
