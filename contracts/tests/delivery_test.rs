//! Delivery semantics: duplicates, reordering, untrusted callers and
//! malformed payloads.

mod common;

use common::*;
use proptest::prelude::*;
use stake_across_contracts::{EndpointError, ErrorKind};
use stake_across_protocol::config::{FUJI_BNM_TOKEN, FUJI_CHAIN_SELECTOR, SEPOLIA_BNM_TOKEN};
use stake_across_protocol::message::{CrossChainMessage, DecodeError};
use stake_across_protocol::transport::{
    DeliveryStatus, InboundDelivery, InboundOutcome, RouterConfig,
};
use stake_across_protocol::{Address, Amount, MessageId, TokenAmount};

// ---------------------------------------------------------------------------
// Idempotency
// ---------------------------------------------------------------------------

#[test]
fn second_delivery_is_a_noop() {
    let h = harness();
    let delivery = deposit_delivery(1, owner(), E18);

    assert_eq!(
        h.vault.receive(vault_router(), &delivery).unwrap(),
        InboundOutcome::Applied
    );
    let state_once = h.vault.state();
    let detail_once = h.vault.message_detail(&delivery.id).unwrap();

    assert_eq!(
        h.vault.receive(vault_router(), &delivery).unwrap(),
        InboundOutcome::Duplicate
    );
    assert_eq!(h.vault.state(), state_once);
    assert_eq!(h.vault.message_detail(&delivery.id).unwrap(), detail_once);
}

#[test]
fn router_redelivery_is_discarded() {
    let h = harness();
    let id = h.sender.initiate_transfer(owner(), transfer(E18)).unwrap();
    h.router.deliver_all();
    let supply = h.vault.total_supply();

    assert!(h.router.redeliver(&id));
    let reports = h.router.deliver_all();
    assert_eq!(reports[0].status, DeliveryStatus::Duplicate);
    assert_eq!(h.vault.total_supply(), supply);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// However the router shuffles and repeats deliveries, the vault ends up
    /// exactly where in-order, exactly-once delivery would leave it.
    #[test]
    fn reordered_duplicated_delivery_converges(
        seed in any::<u64>(),
        amounts in proptest::collection::vec(1..1_000_000u128, 1..8),
    ) {
        let config = RouterConfig {
            seed,
            reorder: true,
            duplicate_probability: 0.5,
            ..RouterConfig::default()
        };
        let h = HarnessBuilder::new().router(config).build();
        let total: Amount = amounts.iter().sum();

        let mut depositors = Vec::new();
        for (i, amount) in amounts.iter().enumerate() {
            let depositor = Address::derive(&format!("depositor-{i}"));
            h.sender.initiate_transfer(depositor, transfer(*amount)).unwrap();
            depositors.push((depositor, *amount));
        }
        h.router.deliver_all();

        // No yield, no redemption: every deposit mints 1:1.
        prop_assert_eq!(h.vault.total_assets(), total);
        prop_assert_eq!(h.vault.total_supply(), total);
        for (depositor, amount) in depositors {
            prop_assert_eq!(h.vault.balance_of(&depositor), amount);
        }
        for record in h.sender.outbound() {
            prop_assert!(!h.vault.message_detail(&record.id).unwrap().is_zero());
        }
        prop_assert!(h.vault.pending_messages().unwrap().is_empty());
    }
}

// ---------------------------------------------------------------------------
// Authorization
// ---------------------------------------------------------------------------

#[test]
fn delivery_from_untrusted_caller_is_refused() {
    let h = harness();
    let delivery = deposit_delivery(1, owner(), E18);

    let err = h
        .vault
        .receive(Address::derive("impostor"), &delivery)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
    // The Fuji router is a real router, just not this vault's.
    assert!(h.vault.receive(sender_router(), &delivery).is_err());

    assert_eq!(h.vault.total_supply(), 0);
    assert!(h.vault.message_detail(&delivery.id).unwrap().is_zero());
}

// ---------------------------------------------------------------------------
// Malformed & Invalid Messages
// ---------------------------------------------------------------------------

#[test]
fn truncated_payload_fails_decode_and_mutates_nothing() {
    let h = harness();
    let mut delivery = deposit_delivery(1, owner(), E18);
    delivery.payload.truncate(100);
    let before = h.vault.state();

    let err = h.vault.receive(vault_router(), &delivery).unwrap_err();
    assert!(matches!(
        err,
        EndpointError::Decode(DecodeError::Truncated { got: 100, .. })
    ));
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(!err.is_retryable());
    assert_eq!(h.vault.state(), before);
    assert!(h.vault.pending_messages().unwrap().is_empty());
    assert!(h.vault.message_detail(&delivery.id).unwrap().is_zero());
}

#[test]
fn nonzero_padding_is_malformed() {
    let h = harness();
    let mut delivery = deposit_delivery(1, owner(), E18);
    delivery.payload[0] = 0xff;

    let err = h.vault.receive(vault_router(), &delivery).unwrap_err();
    assert!(matches!(err, EndpointError::Decode(DecodeError::MalformedField { .. })));
}

fn delivery_with(message: CrossChainMessage, transferred: Amount) -> InboundDelivery {
    InboundDelivery {
        id: MessageId::from_bytes([7; 32]),
        source_chain: FUJI_CHAIN_SELECTOR,
        sender: sender_identity(),
        payload: message.encode(),
        token_transfers: vec![TokenAmount {
            token: message.token,
            amount: transferred,
        }],
    }
}

fn base_message(amount: Amount) -> CrossChainMessage {
    CrossChainMessage {
        source_chain_selector: FUJI_CHAIN_SELECTOR,
        sender: sender_identity(),
        depositor: owner(),
        token: FUJI_BNM_TOKEN,
        amount,
    }
}

#[test]
fn zero_amount_message_is_invalid() {
    let h = harness();
    let err = h
        .vault
        .receive(vault_router(), &delivery_with(base_message(0), 0))
        .unwrap_err();
    assert!(matches!(err, EndpointError::InvalidMessage(_)));
}

#[test]
fn unrecognized_token_is_invalid() {
    let h = harness();
    let message = CrossChainMessage {
        token: Address::derive("shitcoin"),
        ..base_message(E18)
    };
    let err = h
        .vault
        .receive(vault_router(), &delivery_with(message, E18))
        .unwrap_err();
    assert!(matches!(err, EndpointError::InvalidMessage(_)));
    assert_eq!(h.vault.total_assets(), 0);
}

#[test]
fn amount_not_backed_by_tokens_is_invalid() {
    let h = harness();
    let err = h
        .vault
        .receive(vault_router(), &delivery_with(base_message(E18), E18 - 1))
        .unwrap_err();
    assert!(matches!(err, EndpointError::InvalidMessage(_)));
}

#[test]
fn spoofed_origin_is_invalid() {
    let h = harness();
    let message = CrossChainMessage {
        sender: Address::derive("someone-else"),
        ..base_message(E18)
    };
    let err = h
        .vault
        .receive(vault_router(), &delivery_with(message, E18))
        .unwrap_err();
    assert!(matches!(err, EndpointError::InvalidMessage(_)));
}

#[test]
fn vault_recognizes_its_own_asset_too() {
    let h = harness();
    let message = CrossChainMessage {
        token: SEPOLIA_BNM_TOKEN,
        ..base_message(5)
    };
    h.vault
        .receive(vault_router(), &delivery_with(message, 5))
        .unwrap();
    assert_eq!(h.vault.total_supply(), 5);
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

const THREADS: u8 = 8;
const PER_THREAD: u8 = 16;

fn concurrent_deposit(thread: u8, i: u8) -> (Address, InboundDelivery) {
    let depositor = Address::derive(&format!("depositor-{thread}-{i}"));
    let id_byte = thread * PER_THREAD + i + 1;
    let amount = Amount::from(id_byte) * 1_000;
    (depositor, deposit_delivery(id_byte, depositor, amount))
}

#[test]
fn concurrent_deliveries_and_redemption_keep_totals_consistent() {
    let h = harness();
    let redeemer = Address::derive("redeemer");
    h.vault
        .receive(vault_router(), &deposit_delivery(250, redeemer, E18))
        .unwrap();

    let applied = std::sync::atomic::AtomicUsize::new(0);
    std::thread::scope(|scope| {
        for thread in 0..THREADS {
            let (vault, applied) = (&h.vault, &applied);
            scope.spawn(move || {
                // Each message goes out twice: once from its own thread, once
                // from the neighbour, so duplicates race the first copy.
                let neighbour = (thread + 1) % THREADS;
                for i in 0..PER_THREAD {
                    for source in [thread, neighbour] {
                        let (_, delivery) = concurrent_deposit(source, i);
                        match vault.receive(vault_router(), &delivery).unwrap() {
                            InboundOutcome::Applied => {
                                applied.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                            }
                            InboundOutcome::Duplicate => {}
                        }
                    }
                }
            });
        }
        scope.spawn(|| {
            let receipt = h
                .vault
                .request_cross_chain_redeem(redeemer, redeem(E18 / 2, redeemer))
                .unwrap();
            assert_eq!(receipt.assets, E18 / 2);
        });
    });

    let count = usize::from(THREADS) * usize::from(PER_THREAD);
    assert_eq!(applied.into_inner(), count);

    let mut deposited: Amount = 0;
    let mut balances: Amount = h.vault.balance_of(&redeemer);
    for thread in 0..THREADS {
        for i in 0..PER_THREAD {
            let (depositor, delivery) = concurrent_deposit(thread, i);
            let amount = delivery.token_transfers[0].amount;
            deposited += amount;
            assert_eq!(h.vault.balance_of(&depositor), amount);
            balances += h.vault.balance_of(&depositor);
            assert!(!h.vault.message_detail(&delivery.id).unwrap().is_zero());
        }
    }

    // No yield: every deposit and the redemption convert 1:1.
    let expected = deposited + E18 / 2;
    assert_eq!(h.vault.balance_of(&redeemer), E18 / 2);
    assert_eq!(h.vault.total_supply(), expected);
    assert_eq!(h.vault.total_assets(), expected);
    assert_eq!(balances, expected);
    assert!(h.vault.pending_messages().unwrap().is_empty());
}
