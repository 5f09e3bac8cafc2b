//! # REST + WebSocket API
//!
//! Builds the axum router that exposes the node's HTTP interface. Every
//! handler shares one contract instance behind a mutex; a contract call
//! holds the lock for its whole duration, so calls are serialized exactly
//! as they would be inside a block.
//!
//! ## Endpoints
//!
//! | Method | Path                             | Description                       |
//! |--------|----------------------------------|-----------------------------------|
//! | GET    | `/health`                        | Liveness probe                    |
//! | GET    | `/status`                        | Node and contract summary         |
//! | POST   | `/rpc`                           | JSON-RPC 2.0 gateway              |
//! | GET    | `/ws`                            | WebSocket for blocks and events   |
//! | GET    | `/wallets/:wallet`               | Balances, passkeys, and requests  |
//! | GET    | `/wallets/:wallet/pending/:id`   | One withdrawal request            |
//! | GET    | `/events?from=N`                 | Contract event log                |
//!
//! ## Error codes
//!
//! Contract failures come back as JSON-RPC errors whose `code` is the
//! contract's own numeric code (100s for the authenticator, 200s for the
//! vault). Transport-level failures use the standard negative codes.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use warden_contracts::{
    AuthError, BatchOperation, ErrorCode, EventRecord, Passkey, PasskeyAssertion,
    PendingWithdrawal, ProtocolStats, UserLimits, VaultError, Warden,
};
use warden_protocol::crypto::{MessageDigest, PasskeySignature};
use warden_protocol::identity::{CredentialId, Principal};
use warden_protocol::ledger::{Asset, InMemoryLedger, TokenId, TransferError};

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// The contract instance the node hosts.
pub type SharedWarden = Arc<Mutex<Warden<InMemoryLedger>>>;

/// Shared application state available to all request handlers.
///
/// Cheap to clone: everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// Network identifier. Always "devnet" for now.
    pub network: String,
    pub warden: SharedWarden,
    /// Broadcast channel for live blocks and contract events.
    pub event_tx: broadcast::Sender<NodeEvent>,
    pub metrics: SharedMetrics,
}

impl AppState {
    /// Runs one contract call under the lock, fans its events out to
    /// WebSocket subscribers, and records metrics.
    fn call<T, E, F>(&self, method: &str, f: F) -> Result<serde_json::Value, JsonRpcError>
    where
        T: Serialize,
        E: IntoRpcError,
        F: FnOnce(&mut Warden<InMemoryLedger>) -> Result<T, E>,
    {
        let started = Instant::now();
        let mut warden = self.warden.lock();
        let before = warden.events().len() as u64;
        let result = f(&mut *warden);

        for record in warden.events_since(before) {
            // Nobody listening is not an error.
            let _ = self.event_tx.send(NodeEvent::Contract {
                record: record.clone(),
            });
        }
        self.metrics
            .observe_stats(&warden.stats(), warden.block_height());
        drop(warden);

        self.metrics.record_call(method, result.is_ok());
        self.metrics
            .call_latency_seconds
            .observe(started.elapsed().as_secs_f64());

        match result {
            Ok(value) => to_json(value),
            Err(err) => Err(err.into_rpc_error()),
        }
    }
}

/// Advances the host by one block and announces it. Returns the new height.
pub fn produce_block(state: &AppState) -> u64 {
    let mut warden = state.warden.lock();
    let height = warden.host_mut().advance_blocks(1);
    state.metrics.observe_stats(&warden.stats(), height);
    drop(warden);

    state.metrics.blocks_produced_total.inc();
    let _ = state.event_tx.send(NodeEvent::NewBlock {
        height,
        timestamp: chrono::Utc::now().timestamp_millis(),
    });
    height
}

/// Events pushed to WebSocket subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeEvent {
    /// The host advanced one block.
    NewBlock { height: u64, timestamp: i64 },
    /// A committed contract call emitted an event.
    Contract { record: EventRecord },
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/rpc", post(rpc_handler))
        .route("/ws", get(ws_handler))
        .route("/wallets/:wallet", get(wallet_handler))
        .route("/wallets/:wallet/pending/:id", get(pending_handler))
        .route("/events", get(events_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// JSON-RPC Types
// ---------------------------------------------------------------------------

/// A JSON-RPC 2.0 request envelope.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version. Must be "2.0".
    pub jsonrpc: String,
    pub method: String,
    /// Named parameters object.
    pub params: Option<serde_json::Value>,
    /// Request identifier. Echoed back in the response.
    pub id: serde_json::Value,
}

/// A JSON-RPC 2.0 response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Protocol version. Always "2.0".
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: serde_json::Value,
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcError {
    fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

fn invalid_params(message: impl std::fmt::Display) -> JsonRpcError {
    JsonRpcError::new(-32602, format!("Invalid params: {}", message))
}

fn internal_error(message: impl std::fmt::Display) -> JsonRpcError {
    JsonRpcError::new(-32603, format!("Internal error: {}", message))
}

/// Contract errors carry their own stable codes onto the wire.
pub trait IntoRpcError {
    fn into_rpc_error(self) -> JsonRpcError;
}

fn contract_error<E: ErrorCode + std::fmt::Display>(err: &E) -> JsonRpcError {
    // Codes are small positive integers.
    JsonRpcError::new(err.code() as i32, err.to_string())
}

impl IntoRpcError for AuthError {
    fn into_rpc_error(self) -> JsonRpcError {
        contract_error(&self)
    }
}

impl IntoRpcError for VaultError {
    fn into_rpc_error(self) -> JsonRpcError {
        let mut error = contract_error(&self);
        error.data = match &self {
            VaultError::AuthenticationFailed(inner) => Some(json!({ "auth_code": inner.code() })),
            VaultError::InvalidOperation { index, .. } => Some(json!({ "index": index })),
            _ => None,
        };
        error
    }
}

impl IntoRpcError for TransferError {
    fn into_rpc_error(self) -> JsonRpcError {
        internal_error(self)
    }
}

fn to_json<T: Serialize>(value: T) -> Result<serde_json::Value, JsonRpcError> {
    serde_json::to_value(value).map_err(internal_error)
}

fn parse<T: DeserializeOwned>(params: serde_json::Value) -> Result<T, JsonRpcError> {
    serde_json::from_value(params).map_err(invalid_params)
}

fn decode_hex(field: &str, value: &str) -> Result<Vec<u8>, JsonRpcError> {
    let trimmed = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(trimmed).map_err(|e| invalid_params(format!("{}: {}", field, e)))
}

// ---------------------------------------------------------------------------
// JSON-RPC Parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WalletParams {
    wallet: Principal,
    #[serde(default)]
    token: Option<TokenId>,
}

#[derive(Debug, Deserialize)]
struct PasskeyParams {
    caller: Principal,
    credential_id: CredentialId,
    /// Hex SEC1 public key, on registration only.
    #[serde(default)]
    public_key: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdminRevokeParams {
    caller: Principal,
    wallet: Principal,
    credential_id: CredentialId,
}

#[derive(Debug, Deserialize)]
struct GetPasskeyParams {
    wallet: Principal,
    credential_id: CredentialId,
}

#[derive(Debug, Deserialize)]
struct VerifySignatureParams {
    caller: Principal,
    digest: MessageDigest,
    public_key: String,
    signature: PasskeySignature,
}

#[derive(Debug, Deserialize)]
struct AuthenticateParams {
    wallet: Principal,
    assertion: PasskeyAssertion,
    #[serde(default)]
    nonce: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct DepositParams {
    caller: Principal,
    amount: u64,
    #[serde(default)]
    token: Option<TokenId>,
}

#[derive(Debug, Deserialize)]
struct WithdrawParams {
    caller: Principal,
    amount: u64,
    recipient: Principal,
    #[serde(default)]
    token: Option<TokenId>,
    assertion: PasskeyAssertion,
}

#[derive(Debug, Deserialize)]
struct PendingParams {
    wallet: Principal,
    #[serde(default)]
    request_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct CancelParams {
    caller: Principal,
    request_id: u64,
    assertion: PasskeyAssertion,
}

#[derive(Debug, Deserialize)]
struct SetLimitsParams {
    caller: Principal,
    threshold: u64,
    lock_period: u64,
    assertion: PasskeyAssertion,
}

#[derive(Debug, Deserialize)]
struct BatchParams {
    caller: Principal,
    operations: Vec<BatchOperation>,
    assertion: PasskeyAssertion,
}

#[derive(Debug, Deserialize)]
struct FundParams {
    owner: Principal,
    amount: u64,
    #[serde(default)]
    token: Option<TokenId>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub from: Option<u64>,
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub network: String,
    pub block_height: u64,
    pub deployer: Principal,
    /// Principal holding custodied funds on the host.
    pub custody: Principal,
    pub default_threshold: u64,
    pub default_lock_period: u64,
    pub stats: ProtocolStats,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

/// Response payload for `GET /wallets/:wallet`.
#[derive(Debug, Serialize, Deserialize)]
pub struct WalletResponse {
    pub wallet: Principal,
    pub balance: u64,
    pub nonce: u64,
    pub limits: UserLimits,
    pub passkeys: Vec<Passkey>,
    pub pending: Vec<PendingWithdrawal>,
}

/// One withdrawal request plus its readiness at the current height.
#[derive(Debug, Serialize, Deserialize)]
pub struct PendingResponse {
    #[serde(flatten)]
    pub request: PendingWithdrawal,
    pub ready: bool,
    pub blocks_until_unlock: u64,
}

/// Result of `warden_withdraw`.
#[derive(Debug, Serialize, Deserialize)]
pub struct WithdrawResponse {
    /// `0` when the withdrawal executed immediately.
    pub request_id: u64,
    pub queued: bool,
}

/// Generic error body returned by REST endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn pending_view(warden: &Warden<InMemoryLedger>, wallet: &Principal, request_id: u64) -> Option<PendingResponse> {
    let request = warden.get_pending_withdrawal(wallet, request_id)?.clone();
    Some(PendingResponse {
        ready: warden.is_withdrawal_ready(wallet, request_id),
        blocks_until_unlock: warden.blocks_until_unlock(wallet, request_id).unwrap_or(0),
        request,
    })
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

/// `GET /status`: node and contract summary.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let warden = state.warden.lock();
    let resp = StatusResponse {
        version: state.version.clone(),
        network: state.network.clone(),
        block_height: warden.block_height(),
        deployer: warden.deployer().clone(),
        custody: warden.custody().clone(),
        default_threshold: warden.params().default_threshold,
        default_lock_period: warden.params().default_lock_period,
        stats: warden.stats(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    Json(resp)
}

/// `GET /wallets/:wallet`: everything the contract knows about a wallet.
/// Unknown wallets read as empty.
async fn wallet_handler(State(state): State<AppState>, Path(wallet): Path<String>) -> impl IntoResponse {
    let wallet = Principal::new(wallet);
    let warden = state.warden.lock();
    Json(WalletResponse {
        balance: warden.get_balance(&wallet),
        nonce: warden.get_nonce(&wallet),
        limits: warden.get_limits(&wallet),
        passkeys: warden.list_passkeys(&wallet).to_vec(),
        pending: warden.list_pending_withdrawals(&wallet).to_vec(),
        wallet,
    })
}

/// `GET /wallets/:wallet/pending/:id`: one request, or 404.
async fn pending_handler(
    State(state): State<AppState>,
    Path((wallet, request_id)): Path<(String, u64)>,
) -> impl IntoResponse {
    let wallet = Principal::new(wallet);
    let warden = state.warden.lock();
    match pending_view(&warden, &wallet, request_id) {
        Some(view) => (StatusCode::OK, Json(view)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("withdrawal request {} not found for {}", request_id, wallet),
            }),
        )
            .into_response(),
    }
}

/// `GET /events?from=N`: the contract event log from sequence `N`.
async fn events_handler(State(state): State<AppState>, Query(query): Query<EventsQuery>) -> impl IntoResponse {
    let warden = state.warden.lock();
    Json(warden.events_since(query.from.unwrap_or(0)).to_vec())
}

/// `POST /rpc`: JSON-RPC 2.0 gateway.
async fn rpc_handler(State(state): State<AppState>, Json(req): Json<JsonRpcRequest>) -> impl IntoResponse {
    if req.jsonrpc != "2.0" {
        return Json(JsonRpcResponse {
            jsonrpc: "2.0".into(),
            result: None,
            error: Some(JsonRpcError::new(
                -32600,
                "Invalid Request: jsonrpc must be \"2.0\"",
            )),
            id: req.id,
        });
    }

    let params = req.params.unwrap_or(serde_json::Value::Null);
    let (result, error) = match dispatch(&state, &req.method, params) {
        Ok(value) => (Some(value), None),
        Err(err) => (None, Some(err)),
    };

    Json(JsonRpcResponse {
        jsonrpc: "2.0".into(),
        result,
        error,
        id: req.id,
    })
}

/// Routes one JSON-RPC method to the contract.
fn dispatch(state: &AppState, method: &str, params: serde_json::Value) -> Result<serde_json::Value, JsonRpcError> {
    match method {
        // -- Node -----------------------------------------------------------
        "warden_version" => Ok(json!(state.version)),
        "warden_networkId" => Ok(json!(state.network)),
        "warden_blockHeight" => Ok(json!(state.warden.lock().block_height())),
        "warden_stats" => to_json(state.warden.lock().stats()),

        // -- Reads ----------------------------------------------------------
        "warden_getPasskeys" => {
            let p: WalletParams = parse(params)?;
            to_json(state.warden.lock().list_passkeys(&p.wallet))
        }
        "warden_getPasskey" => {
            let p: GetPasskeyParams = parse(params)?;
            to_json(state.warden.lock().get_passkey(&p.wallet, &p.credential_id))
        }
        "warden_getNonce" => {
            let p: WalletParams = parse(params)?;
            Ok(json!(state.warden.lock().get_nonce(&p.wallet)))
        }
        "warden_getBalance" => {
            let p: WalletParams = parse(params)?;
            let warden = state.warden.lock();
            let balance = match &p.token {
                Some(token) => warden.get_token_balance(&p.wallet, token),
                None => warden.get_balance(&p.wallet),
            };
            Ok(json!(balance))
        }
        "warden_getLimits" => {
            let p: WalletParams = parse(params)?;
            to_json(state.warden.lock().get_limits(&p.wallet))
        }
        "warden_getPending" => {
            let p: PendingParams = parse(params)?;
            let warden = state.warden.lock();
            match p.request_id {
                Some(id) => to_json(pending_view(&warden, &p.wallet, id)),
                None => to_json(warden.list_pending_withdrawals(&p.wallet)),
            }
        }
        "warden_getEvents" => {
            let q: EventsQuery = if params.is_null() {
                EventsQuery::default()
            } else {
                parse(params)?
            };
            to_json(state.warden.lock().events_since(q.from.unwrap_or(0)))
        }

        // -- Passkey registry -----------------------------------------------
        "warden_registerPasskey" => {
            let p: PasskeyParams = parse(params)?;
            let public_key = p
                .public_key
                .as_deref()
                .ok_or_else(|| invalid_params("missing public_key"))
                .and_then(|key| decode_hex("public_key", key))?;
            let name = p.name.ok_or_else(|| invalid_params("missing name"))?;
            state.call(method, |w| {
                w.register_passkey(&p.caller, p.credential_id, &public_key, &name)
                    .map(|()| true)
            })
        }
        "warden_revokePasskey" => {
            let p: PasskeyParams = parse(params)?;
            state.call(method, |w| {
                w.revoke_passkey(&p.caller, p.credential_id).map(|()| true)
            })
        }
        "warden_adminRevokePasskey" => {
            let p: AdminRevokeParams = parse(params)?;
            state.call(method, |w| {
                w.admin_revoke_passkey(&p.caller, &p.wallet, p.credential_id)
                    .map(|()| true)
            })
        }
        "warden_renamePasskey" => {
            let p: PasskeyParams = parse(params)?;
            let name = p.name.ok_or_else(|| invalid_params("missing name"))?;
            state.call(method, |w| {
                w.rename_passkey(&p.caller, p.credential_id, &name)
                    .map(|()| true)
            })
        }

        // -- Authenticator --------------------------------------------------
        "warden_verifySignature" => {
            let p: VerifySignatureParams = parse(params)?;
            let public_key = decode_hex("public_key", &p.public_key)?;
            state.call(method, |w| {
                w.verify_signature(&p.caller, &p.digest, &public_key, &p.signature)
                    .map(|()| true)
            })
        }
        "warden_authenticate" => {
            let p: AuthenticateParams = parse(params)?;
            state.call(method, |w| w.authenticate(&p.wallet, &p.assertion))
        }
        "warden_authenticateWithNonce" => {
            let p: AuthenticateParams = parse(params)?;
            let nonce = p.nonce.ok_or_else(|| invalid_params("missing nonce"))?;
            state.call(method, |w| {
                w.authenticate_with_nonce(&p.wallet, &p.assertion, nonce)
            })
        }

        // -- Vault ----------------------------------------------------------
        "warden_depositNative" => {
            let p: DepositParams = parse(params)?;
            state.call(method, |w| w.deposit_native(&p.caller, p.amount))
        }
        "warden_depositToken" => {
            let p: DepositParams = parse(params)?;
            let token = p.token.ok_or_else(|| invalid_params("missing token"))?;
            state.call(method, |w| w.deposit_token(&p.caller, &token, p.amount))
        }
        "warden_withdraw" => {
            let p: WithdrawParams = parse(params)?;
            state.call(method, |w| {
                w.withdraw(&p.caller, p.amount, &p.recipient, p.token.as_ref(), &p.assertion)
                    .map(|outcome| WithdrawResponse {
                        request_id: outcome.request_id(),
                        queued: outcome.request_id() != 0,
                    })
            })
        }
        "warden_executePending" => {
            let p: PendingParams = parse(params)?;
            let request_id = p
                .request_id
                .ok_or_else(|| invalid_params("missing request_id"))?;
            state.call(method, |w| {
                w.execute_pending(&p.wallet, request_id).map(|()| true)
            })
        }
        "warden_cancelPending" => {
            let p: CancelParams = parse(params)?;
            state.call(method, |w| {
                w.cancel_pending(&p.caller, p.request_id, &p.assertion)
                    .map(|()| true)
            })
        }
        "warden_setLimits" => {
            let p: SetLimitsParams = parse(params)?;
            state.call(method, |w| {
                w.set_limits(&p.caller, p.threshold, p.lock_period, &p.assertion)
            })
        }
        "warden_executeBatch" => {
            let p: BatchParams = parse(params)?;
            state.call(method, |w| {
                w.execute_batch(&p.caller, &p.operations, &p.assertion)
            })
        }

        // -- Devnet ---------------------------------------------------------
        "dev_fund" => {
            let p: FundParams = parse(params)?;
            let asset = Asset::from_token(p.token);
            tracing::info!(owner = %p.owner, %asset, amount = p.amount, "devnet faucet");
            state.call(method, |w| w.host_mut().mint(&asset, &p.owner, p.amount))
        }

        _ => Err(JsonRpcError::new(
            -32601,
            format!("Method not found: {}", method),
        )),
    }
}

/// `GET /ws`: WebSocket upgrade for live event streaming.
///
/// Clients receive JSON-encoded [`NodeEvent`] messages for each new block
/// and each committed contract event. Client messages are ignored.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Drives a single WebSocket connection, forwarding broadcast events
/// until the client disconnects or the channel is closed.
async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.event_tx.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(ev) => {
                        let payload = match serde_json::to_string(&ev) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!("failed to serialize ws event: {}", e);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("ws subscriber lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }
}
