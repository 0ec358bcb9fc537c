//! # REST API
//!
//! The axum router in front of a [`Devnet`]. All handlers share state
//! through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                       | Description                              |
//! |--------|----------------------------|------------------------------------------|
//! | GET    | `/health`                  | Liveness probe                           |
//! | GET    | `/status`                  | Devnet summary                           |
//! | GET    | `/vault`                   | Share token metadata and vault totals    |
//! | GET    | `/balances/:holder`        | Shares of a holder and what they redeem  |
//! | GET    | `/preview-redeem/:shares`  | Assets a share amount would release      |
//! | GET    | `/messages/:chain/:id`     | Processed inbound message detail         |
//! | GET    | `/reconciliation`          | Pending, stranded and failed messages    |
//! | POST   | `/transfer`                | Send a deposit from Fuji to the vault    |
//! | POST   | `/redeem`                  | Burn shares and release assets to Fuji   |
//! | POST   | `/yield`                   | Owner injects yield from the allowance   |
//! | POST   | `/withdraw`                | Owner sweeps both endpoints              |
//! | POST   | `/flush`                   | Deliver everything queued in the router  |
//!
//! The devnet has no signatures: write requests name their caller, and the
//! endpoints check that caller as they would on-chain.

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use stake_across_contracts::{EndpointError, ErrorKind, RedeemReceipt};
use stake_across_protocol::message::CrossChainMessage;
use stake_across_protocol::transport::DeliveryReport;
use stake_across_protocol::vault::VaultState;
use stake_across_protocol::{Address, Amount, MessageId};

use crate::devnet::{Devnet, DevnetStatus, Reconciliation, WithdrawalReport};
use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared by all handlers. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    pub devnet: Arc<Devnet>,
    pub metrics: SharedMetrics,
}

impl AppState {
    fn observe(&self) {
        self.metrics.observe(&self.devnet);
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/vault", get(vault_handler))
        .route("/balances/:holder", get(balance_handler))
        .route("/preview-redeem/:shares", get(preview_redeem_handler))
        .route("/messages/:chain/:id", get(message_handler))
        .route("/reconciliation", get(reconciliation_handler))
        .route("/transfer", post(transfer_handler))
        .route("/redeem", post(redeem_handler))
        .route("/yield", post(yield_handler))
        .route("/withdraw", post(withdraw_handler))
        .route("/flush", post(flush_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Body of every non-2xx response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// `validation`, `authorization`, `resource`, `transport` or `storage`
    /// for endpoint errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Endpoint(EndpointError),
}

impl From<EndpointError> for ApiError {
    fn from(e: EndpointError) -> Self {
        ApiError::Endpoint(e)
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Authorization => StatusCode::FORBIDDEN,
        ErrorKind::Resource => StatusCode::CONFLICT,
        ErrorKind::Transport => StatusCode::BAD_GATEWAY,
        ErrorKind::Storage => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(error) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse { error, kind: None },
            ),
            ApiError::NotFound(error) => (StatusCode::NOT_FOUND, ErrorResponse { error, kind: None }),
            ApiError::Endpoint(e) => {
                let kind = e.kind();
                if kind == ErrorKind::Storage {
                    tracing::error!(error = %e, "storage failure serving request");
                }
                (
                    status_for(kind),
                    ErrorResponse {
                        error: e.to_string(),
                        kind: Some(format!("{kind:?}").to_lowercase()),
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn parse_address(raw: &str) -> Result<Address, ApiError> {
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid address {raw:?}: {e}")))
}

// ---------------------------------------------------------------------------
// Request & Response Types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    #[serde(flatten)]
    pub devnet: DevnetStatus,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VaultResponse {
    pub asset: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    #[serde(flatten)]
    pub totals: VaultState,
    pub yield_allowance: Amount,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub holder: Address,
    pub shares: Amount,
    pub redeemable_assets: Amount,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PreviewResponse {
    pub shares: Amount,
    pub assets: Amount,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message_id: MessageId,
    /// False for unknown or unfinished messages; the detail is then zero.
    pub processed: bool,
    #[serde(flatten)]
    pub detail: CrossChainMessage,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransferBody {
    pub depositor: Address,
    pub amount: Amount,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransferResponse {
    pub message_id: MessageId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RedeemBody {
    pub holder: Address,
    pub shares: Amount,
    /// Defaults to the holder.
    #[serde(default)]
    pub receiver: Option<Address>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct YieldBody {
    pub caller: Address,
    pub amount: Amount,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WithdrawBody {
    pub caller: Address,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`. Liveness only; `/status` has the detail.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: state.version.clone(),
        devnet: state.devnet.status(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

async fn vault_handler(State(state): State<AppState>) -> ApiResult<VaultResponse> {
    let vault = state.devnet.vault();
    Ok(Json(VaultResponse {
        asset: vault.asset()?,
        name: vault.name().to_string(),
        symbol: vault.symbol().to_string(),
        decimals: vault.decimals(),
        totals: vault.vault_state(),
        yield_allowance: vault.yield_allowance(),
    }))
}

async fn balance_handler(
    Path(holder): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<BalanceResponse> {
    let holder = parse_address(&holder)?;
    let vault = state.devnet.vault();
    let shares = vault.balance_of(&holder);
    Ok(Json(BalanceResponse {
        holder,
        shares,
        redeemable_assets: vault.preview_redeem(shares),
    }))
}

async fn preview_redeem_handler(
    Path(shares): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<PreviewResponse> {
    let shares: Amount = shares
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid share amount {shares:?}")))?;
    Ok(Json(PreviewResponse {
        shares,
        assets: state.devnet.vault().preview_redeem(shares),
    }))
}

/// `GET /messages/:chain/:id`. Unknown IDs are not an error: they come
/// back unprocessed with the zero detail.
async fn message_handler(
    Path((chain, id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> ApiResult<MessageResponse> {
    let message_id: MessageId = id
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid message id {id:?}: {e}")))?;
    let detail = state
        .devnet
        .message_detail(&chain, &message_id)
        .ok_or_else(|| ApiError::NotFound(format!("unknown chain {chain:?}")))??;
    Ok(Json(MessageResponse {
        message_id,
        processed: !detail.is_zero(),
        detail,
    }))
}

async fn reconciliation_handler(State(state): State<AppState>) -> ApiResult<Reconciliation> {
    Ok(Json(state.devnet.reconciliation()?))
}

async fn transfer_handler(
    State(state): State<AppState>,
    Json(body): Json<TransferBody>,
) -> ApiResult<TransferResponse> {
    let message_id = state.devnet.transfer(body.depositor, body.amount)?;
    state.observe();
    Ok(Json(TransferResponse { message_id }))
}

async fn redeem_handler(
    State(state): State<AppState>,
    Json(body): Json<RedeemBody>,
) -> ApiResult<RedeemReceipt> {
    let receiver = body.receiver.unwrap_or(body.holder);
    let receipt = state.devnet.redeem(body.holder, body.shares, receiver)?;
    state.observe();
    Ok(Json(receipt))
}

async fn yield_handler(
    State(state): State<AppState>,
    Json(body): Json<YieldBody>,
) -> ApiResult<VaultState> {
    state.devnet.vault().inject_yield(body.caller, body.amount)?;
    state.observe();
    Ok(Json(state.devnet.vault().vault_state()))
}

async fn withdraw_handler(
    State(state): State<AppState>,
    Json(body): Json<WithdrawBody>,
) -> ApiResult<WithdrawalReport> {
    if body.caller != state.devnet.deployer() {
        return Err(EndpointError::Unauthorized {
            caller: body.caller,
        }
        .into());
    }
    let report = state.devnet.withdraw_all(body.caller);
    state.observe();
    Ok(Json(report))
}

async fn flush_handler(State(state): State<AppState>) -> Json<Vec<DeliveryReport>> {
    let reports = state.devnet.deliver();
    state.observe();
    Json(reports)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
