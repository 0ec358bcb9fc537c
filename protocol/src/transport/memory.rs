//! In-process cross-chain router.
//!
//! Holds every accepted message in a queue until someone calls
//! [`InMemoryRouter::deliver_next`] or [`InMemoryRouter::deliver_all`], which
//! is how delay is modelled. On top of that it can:
//!
//! - pick the next message at random instead of FIFO (`reorder`),
//! - deliver a message a second time after it was applied
//!   (`duplicate_probability`, or explicitly via [`InMemoryRouter::redeliver`]),
//! - lose a message outright ([`InMemoryRouter::drop_next`]).
//!
//! All randomness comes from a seeded `StdRng`, so a failing scenario
//! replays exactly.
//!
//! Deliveries the receiver rejects as retryable are re-queued up to
//! `max_attempts`; terminal rejections and exhausted retries land in
//! [`InMemoryRouter::failed_deliveries`].

use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{
    DeliveryError, InboundDelivery, InboundOutcome, MessageReceiver, SendRequest, Transport,
    TransportError,
};
use crate::config::{networks, ONE_TOKEN};
use crate::types::{deserialize_amount, Address, Amount, ChainSelector, MessageId};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Flat fee per message, in the source chain's fee token.
    #[serde(deserialize_with = "deserialize_amount")]
    pub base_fee: Amount,
    /// Additional fee per payload byte.
    #[serde(deserialize_with = "deserialize_amount")]
    pub fee_per_byte: Amount,
    /// Seed for reordering and duplication.
    pub seed: u64,
    /// Deliver in random order instead of FIFO.
    pub reorder: bool,
    /// Chance that an applied message is delivered once more later.
    pub duplicate_probability: f64,
    /// Delivery attempts before a retryable failure becomes permanent.
    pub max_attempts: u32,
    /// Sent messages kept for [`InMemoryRouter::redeliver`]. The oldest are
    /// forgotten first.
    pub history_limit: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            base_fee: ONE_TOKEN / 10,
            fee_per_byte: 1_000_000_000_000,
            seed: 0,
            reorder: false,
            duplicate_probability: 0.0,
            max_attempts: 3,
            history_limit: 1_024,
        }
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum DeliveryStatus {
    Applied,
    Duplicate,
    /// Rejected as retryable; back in the queue.
    Retrying(String),
    /// Moved to the failed list.
    Failed(String),
}

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub id: MessageId,
    pub destination_chain: ChainSelector,
    pub receiver: Address,
    pub status: DeliveryStatus,
}

/// A message the router gave up on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedDelivery {
    pub id: MessageId,
    pub destination_chain: ChainSelector,
    pub receiver: Address,
    pub reason: String,
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterStats {
    pub sent: u64,
    pub applied: u64,
    pub duplicates: u64,
    pub failed: u64,
    pub dropped: u64,
    pub in_flight: u64,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct ChainRoute {
    router: Address,
    fee_token: Address,
}

#[derive(Debug, Clone)]
struct Envelope {
    delivery: InboundDelivery,
    destination_chain: ChainSelector,
    receiver: Address,
    attempts: u32,
    /// Set on the copy queued by duplication, so it is duplicated only once.
    replay: bool,
}

struct RouterState {
    chains: HashMap<ChainSelector, ChainRoute>,
    queue: VecDeque<Envelope>,
    history: HashMap<MessageId, Envelope>,
    history_order: VecDeque<MessageId>,
    failed: Vec<FailedDelivery>,
    fees_collected: HashMap<Address, Amount>,
    rng: StdRng,
    nonce: u64,
    stats: RouterStats,
}

/// Simulated cross-chain router connecting endpoints in one process.
pub struct InMemoryRouter {
    config: RouterConfig,
    state: Mutex<RouterState>,
    receivers: RwLock<HashMap<(ChainSelector, Address), Arc<dyn MessageReceiver>>>,
}

impl InMemoryRouter {
    pub fn new(config: RouterConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            state: Mutex::new(RouterState {
                chains: HashMap::new(),
                queue: VecDeque::new(),
                history: HashMap::new(),
                history_order: VecDeque::new(),
                failed: Vec::new(),
                fees_collected: HashMap::new(),
                rng,
                nonce: 0,
                stats: RouterStats::default(),
            }),
            receivers: RwLock::new(HashMap::new()),
        }
    }

    /// A router that already knows the Sepolia and Fuji routes.
    pub fn with_reference_networks(config: RouterConfig) -> Self {
        let router = Self::new(config);
        for network in networks() {
            router.add_chain(network.chain_selector, network.router, network.fee_token);
        }
        router
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Makes a chain reachable. `router` is the identity presented to
    /// receivers on that chain; `fee_token` is the only token accepted for
    /// fees on messages originating there.
    pub fn add_chain(&self, selector: ChainSelector, router: Address, fee_token: Address) {
        self.state
            .lock()
            .chains
            .insert(selector, ChainRoute { router, fee_token });
    }

    pub fn router_address(&self, chain: ChainSelector) -> Option<Address> {
        self.state.lock().chains.get(&chain).map(|c| c.router)
    }

    pub fn register_receiver(
        &self,
        chain: ChainSelector,
        address: Address,
        receiver: Arc<dyn MessageReceiver>,
    ) {
        self.receivers.write().insert((chain, address), receiver);
    }

    /// Forgets every receiver. Queued messages then fail as retryable.
    pub fn clear_receivers(&self) {
        self.receivers.write().clear();
    }

    pub fn in_flight(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn stats(&self) -> RouterStats {
        let state = self.state.lock();
        RouterStats {
            in_flight: state.queue.len() as u64,
            ..state.stats
        }
    }

    pub fn failed_deliveries(&self) -> Vec<FailedDelivery> {
        self.state.lock().failed.clone()
    }

    /// Fees collected so far, per fee token.
    pub fn fees_collected(&self, fee_token: &Address) -> Amount {
        self.state
            .lock()
            .fees_collected
            .get(fee_token)
            .copied()
            .unwrap_or(0)
    }

    /// IDs currently queued, in queue order.
    pub fn queued_ids(&self) -> Vec<MessageId> {
        self.state
            .lock()
            .queue
            .iter()
            .map(|e| e.delivery.id)
            .collect()
    }

    /// Loses the message at the head of the queue.
    pub fn drop_next(&self) -> Option<MessageId> {
        let mut state = self.state.lock();
        let envelope = state.queue.pop_front()?;
        state.stats.dropped += 1;
        warn!(message_id = %envelope.delivery.id, "message dropped in transit");
        Some(envelope.delivery.id)
    }

    /// Queues another copy of a previously sent message. `false` if the
    /// message is unknown or has aged out of the history.
    pub fn redeliver(&self, id: &MessageId) -> bool {
        let mut state = self.state.lock();
        match state.history.get(id).cloned() {
            Some(mut envelope) => {
                envelope.attempts = 0;
                envelope.replay = true;
                state.queue.push_back(envelope);
                true
            }
            None => false,
        }
    }

    /// Delivers one queued message. `None` if the queue is empty.
    pub fn deliver_next(&self) -> Option<DeliveryReport> {
        let (envelope, caller) = {
            let mut state = self.state.lock();
            if state.queue.is_empty() {
                return None;
            }
            let index = if self.config.reorder {
                let len = state.queue.len();
                state.rng.gen_range(0..len)
            } else {
                0
            };
            let envelope = state.queue.remove(index)?;
            let caller = state
                .chains
                .get(&envelope.destination_chain)
                .map(|c| c.router)
                .unwrap_or(Address::ZERO);
            (envelope, caller)
        };

        let receiver = self
            .receivers
            .read()
            .get(&(envelope.destination_chain, envelope.receiver))
            .cloned();

        // The receiver runs without the router lock held.
        let result = match receiver {
            Some(receiver) => receiver.on_message_received(caller, &envelope.delivery),
            None => Err(DeliveryError::retryable("no receiver registered")),
        };

        Some(self.settle(envelope, result))
    }

    /// Delivers until the queue is empty.
    pub fn deliver_all(&self) -> Vec<DeliveryReport> {
        let mut reports = Vec::new();
        while let Some(report) = self.deliver_next() {
            reports.push(report);
        }
        reports
    }

    fn settle(
        &self,
        mut envelope: Envelope,
        result: Result<InboundOutcome, DeliveryError>,
    ) -> DeliveryReport {
        let id = envelope.delivery.id;
        let mut state = self.state.lock();
        envelope.attempts += 1;

        let status = match result {
            Ok(InboundOutcome::Applied) => {
                state.stats.applied += 1;
                debug!(message_id = %id, "delivered");
                let p = self.config.duplicate_probability.clamp(0.0, 1.0);
                if !envelope.replay && p > 0.0 && state.rng.gen_bool(p) {
                    let mut copy = envelope.clone();
                    copy.replay = true;
                    copy.attempts = 0;
                    state.queue.push_back(copy);
                    debug!(message_id = %id, "duplicate queued");
                }
                DeliveryStatus::Applied
            }
            Ok(InboundOutcome::Duplicate) => {
                state.stats.duplicates += 1;
                DeliveryStatus::Duplicate
            }
            Err(e) if e.retryable && envelope.attempts < self.config.max_attempts => {
                debug!(message_id = %id, attempts = envelope.attempts, reason = %e, "delivery will be retried");
                state.queue.push_back(envelope.clone());
                DeliveryStatus::Retrying(e.reason)
            }
            Err(e) => {
                warn!(message_id = %id, attempts = envelope.attempts, reason = %e, "delivery failed permanently");
                state.stats.failed += 1;
                state.failed.push(FailedDelivery {
                    id,
                    destination_chain: envelope.destination_chain,
                    receiver: envelope.receiver,
                    reason: e.reason.clone(),
                    attempts: envelope.attempts,
                });
                DeliveryStatus::Failed(e.reason)
            }
        };

        DeliveryReport {
            id,
            destination_chain: envelope.destination_chain,
            receiver: envelope.receiver,
            status,
        }
    }

    fn quote(&self, request: &SendRequest) -> Result<Amount, TransportError> {
        let bytes = request.payload.len() as Amount;
        self.config
            .fee_per_byte
            .checked_mul(bytes)
            .and_then(|f| f.checked_add(self.config.base_fee))
            .ok_or_else(|| TransportError::Rejected("fee overflow".to_string()))
    }

    fn validate(state: &RouterState, request: &SendRequest) -> Result<(), TransportError> {
        let source = state
            .chains
            .get(&request.source_chain)
            .ok_or(TransportError::UnknownSource(request.source_chain))?;
        if !state.chains.contains_key(&request.destination_chain) {
            return Err(TransportError::UnknownDestination(request.destination_chain));
        }
        if request.receiver.is_zero() {
            return Err(TransportError::ZeroReceiver);
        }
        if request.fee_token != source.fee_token {
            return Err(TransportError::UnsupportedFeeToken(request.fee_token));
        }
        if request.payload.is_empty() {
            return Err(TransportError::EmptyPayload);
        }
        Ok(())
    }
}

fn derive_message_id(request: &SendRequest, nonce: u64) -> MessageId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&request.source_chain.value().to_be_bytes());
    hasher.update(request.sender.as_bytes());
    hasher.update(&nonce.to_be_bytes());
    hasher.update(&request.payload);
    MessageId::from_bytes(*hasher.finalize().as_bytes())
}

impl Transport for InMemoryRouter {
    fn fee(&self, request: &SendRequest) -> Result<Amount, TransportError> {
        Self::validate(&self.state.lock(), request)?;
        self.quote(request)
    }

    fn send(&self, request: SendRequest) -> Result<MessageId, TransportError> {
        let fee = self.quote(&request)?;
        let mut state = self.state.lock();
        Self::validate(&state, &request)?;
        let collected = state
            .fees_collected
            .get(&request.fee_token)
            .copied()
            .unwrap_or(0)
            .checked_add(fee)
            .ok_or_else(|| TransportError::Rejected("collected fee overflow".to_string()))?;

        state.nonce += 1;
        let id = derive_message_id(&request, state.nonce);
        let envelope = Envelope {
            delivery: InboundDelivery {
                id,
                source_chain: request.source_chain,
                sender: request.sender,
                payload: request.payload,
                token_transfers: request.token_transfers,
            },
            destination_chain: request.destination_chain,
            receiver: request.receiver,
            attempts: 0,
            replay: false,
        };

        state.fees_collected.insert(request.fee_token, collected);
        state.history.insert(id, envelope.clone());
        state.history_order.push_back(id);
        while state.history_order.len() > self.config.history_limit {
            if let Some(oldest) = state.history_order.pop_front() {
                state.history.remove(&oldest);
            }
        }
        state.queue.push_back(envelope);
        state.stats.sent += 1;

        info!(
            message_id = %id,
            source = %request.source_chain,
            destination = %request.destination_chain,
            fee,
            "message accepted"
        );
        Ok(id)
    }
}
