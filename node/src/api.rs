//! # REST + WebSocket API
//!
//! Builds the axum router that exposes the node's HTTP interface. All
//! endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                                   | Description                        |
//! |--------|----------------------------------------|------------------------------------|
//! | GET    | `/health`                              | Liveness probe                     |
//! | GET    | `/status`                              | Node status summary                |
//! | GET    | `/ws`                                  | WebSocket for live committed events|
//! | GET    | `/events?from=&limit=`                 | Committed events, oldest first     |
//! | GET    | `/token`                               | Token metadata and supply handle   |
//! | POST   | `/token/mint`                          | Open faucet                        |
//! | POST   | `/token/operators`                     | Grant an operator                  |
//! | GET    | `/token/operators/:owner/:operator`    | Grant status                       |
//! | GET    | `/token/balances/:account`             | Balance handle                     |
//! | POST   | `/token/decrypt`                       | User decryption                    |
//! | GET    | `/bank/preview?term=&principal=`       | Interest preview                   |
//! | POST   | `/bank/deposits`                       | Open a deposit                     |
//! | GET    | `/bank/deposits/:id`                   | Deposit by id                      |
//! | POST   | `/bank/deposits/:id/withdraw`          | Settle a matured deposit           |
//! | GET    | `/bank/accounts/:owner/deposits`       | Deposits of one owner              |
//!
//! The caller of a mutating endpoint is taken from the request body. The
//! node sits behind a gateway that authenticates callers; it does not
//! verify signatures on mutations itself.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, Request, State,
    },
    http::{Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use termvault_contracts::{DepositId, DepositView, Term};
use termvault_protocol::fhe::{
    CiphertextHandle, HandleContractPair, ReencryptedValue, SignedDecryptRequest,
};
use termvault_protocol::identity::Address;

use crate::engine::{self, Engine, EngineError, EngineStatus, OperatorStatus, TokenInfo, WithdrawReceipt};
use crate::metrics::SharedMetrics;

/// Default page size for `/events`.
const DEFAULT_EVENT_PAGE: usize = 100;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone: everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub metrics: SharedMetrics,
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
        .route("/ws", get(ws_handler))
        .route("/events", get(events_handler))
        .route("/token", get(token_handler))
        .route("/token/mint", post(mint_handler))
        .route("/token/operators", post(set_operator_handler))
        .route("/token/operators/:owner/:operator", get(operator_handler))
        .route("/token/balances/:account", get(balance_handler))
        .route("/token/decrypt", post(decrypt_handler))
        .route("/bank/preview", get(preview_handler))
        .route("/bank/deposits", post(deposit_handler))
        .route("/bank/deposits/:id", get(deposit_by_id_handler))
        .route("/bank/deposits/:id/withdraw", post(withdraw_handler))
        .route("/bank/accounts/:owner/deposits", get(owner_deposits_handler))
        .layer(middleware::from_fn_with_state(state.clone(), track_latency))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn track_latency(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let timer = state.metrics.request_latency_seconds.start_timer();
    let resp = next.run(req).await;
    timer.observe_duration();
    resp
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Generic error body returned by REST endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

/// An [`EngineError`] on its way out as an HTTP response.
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0.kind() {
            "invalid_amount" | "invalid_term" | "invalid_expiry" | "invalid_request"
            | "amount_overflow" => StatusCode::BAD_REQUEST,
            "not_authorized" | "access_denied" => StatusCode::FORBIDDEN,
            "not_found" => StatusCode::NOT_FOUND,
            "insufficient_balance" | "deposit_locked" | "already_withdrawn" => {
                StatusCode::CONFLICT
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorResponse {
            error: self.0.to_string(),
            kind: self.0.kind().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> Response {
    let body = ErrorResponse {
        error: message.into(),
        kind: "invalid_request".into(),
    };
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct MintRequest {
    pub caller: Address,
    pub to: Address,
    pub amount: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HandleResponse {
    pub account: Address,
    pub handle: CiphertextHandle,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SetOperatorRequest {
    /// The holder granting the rights.
    pub caller: Address,
    pub operator: Address,
    /// Expiry timestamp. Defaults to one year from now.
    #[serde(default)]
    pub until: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DecryptRequest {
    pub request: SignedDecryptRequest,
    pub pairs: Vec<HandleContractPair>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DecryptResponse {
    pub values: Vec<ReencryptedValue>,
}

#[derive(Debug, Deserialize)]
pub struct PreviewQuery {
    /// Term code or alias.
    pub term: String,
    pub principal: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PreviewResponse {
    pub term: Term,
    pub term_label: String,
    pub months: u64,
    pub lock_duration_secs: u64,
    pub principal: u64,
    pub interest: u64,
    pub payout: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DepositRequest {
    pub caller: Address,
    pub principal: u64,
    pub term: u8,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WithdrawRequest {
    pub caller: Address,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OwnerDepositsResponse {
    pub owner: Address,
    pub deposits: Vec<DepositView>,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub from: u64,
    pub limit: Option<usize>,
}

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub engine: EngineStatus,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: 200 if the process is alive. Deliberately checks nothing
/// else; that belongs in `/status`.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        engine: state.engine.status(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

async fn token_handler(State(state): State<AppState>) -> Json<TokenInfo> {
    Json(state.engine.token_info())
}

/// `POST /token/mint`: open faucet. Returns the recipient's new balance handle.
async fn mint_handler(
    State(state): State<AppState>,
    Json(req): Json<MintRequest>,
) -> ApiResult<HandleResponse> {
    let handle = state.engine.mint(req.caller, req.to, req.amount)?;
    Ok(Json(HandleResponse {
        account: req.to,
        handle,
    }))
}

async fn set_operator_handler(
    State(state): State<AppState>,
    Json(req): Json<SetOperatorRequest>,
) -> ApiResult<OperatorStatus> {
    Ok(Json(state.engine.set_operator(
        req.caller,
        req.operator,
        req.until,
    )?))
}

async fn operator_handler(
    State(state): State<AppState>,
    Path((owner, operator)): Path<(Address, Address)>,
) -> Json<OperatorStatus> {
    Json(state.engine.operator_status(owner, operator))
}

async fn balance_handler(
    State(state): State<AppState>,
    Path(account): Path<Address>,
) -> Json<HandleResponse> {
    Json(HandleResponse {
        account,
        handle: state.engine.balance_handle(&account),
    })
}

/// `POST /token/decrypt`: re-encrypt handles to the requester's viewing key.
/// The plaintext never leaves the node unsealed.
async fn decrypt_handler(
    State(state): State<AppState>,
    Json(req): Json<DecryptRequest>,
) -> ApiResult<DecryptResponse> {
    let values = state.engine.user_decrypt(&req.request, &req.pairs)?;
    Ok(Json(DecryptResponse { values }))
}

async fn preview_handler(Query(q): Query<PreviewQuery>) -> Response {
    let term: Term = match q.term.parse() {
        Ok(term) => term,
        Err(e) => return bad_request(format!("{e}")),
    };
    match engine::preview(term, q.principal) {
        Ok(interest) => Json(PreviewResponse {
            term,
            term_label: term.label().to_string(),
            months: term.months(),
            lock_duration_secs: term.lock_duration_secs(),
            principal: q.principal,
            interest,
            payout: q.principal.saturating_add(interest),
        })
        .into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

async fn deposit_handler(
    State(state): State<AppState>,
    Json(req): Json<DepositRequest>,
) -> Result<(StatusCode, Json<DepositView>), ApiError> {
    let view = state.engine.deposit(req.caller, req.principal, req.term)?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn deposit_by_id_handler(
    State(state): State<AppState>,
    Path(id): Path<DepositId>,
) -> ApiResult<DepositView> {
    Ok(Json(state.engine.deposit_view(id)?))
}

async fn withdraw_handler(
    State(state): State<AppState>,
    Path(id): Path<DepositId>,
    Json(req): Json<WithdrawRequest>,
) -> ApiResult<WithdrawReceipt> {
    Ok(Json(state.engine.withdraw(req.caller, id)?))
}

async fn owner_deposits_handler(
    State(state): State<AppState>,
    Path(owner): Path<Address>,
) -> ApiResult<OwnerDepositsResponse> {
    let deposits = state.engine.user_deposits(&owner)?;
    Ok(Json(OwnerDepositsResponse { owner, deposits }))
}

async fn events_handler(
    State(state): State<AppState>,
    Query(q): Query<EventsQuery>,
) -> ApiResult<Vec<engine::SequencedEvent>> {
    let limit = q.limit.unwrap_or(DEFAULT_EVENT_PAGE);
    Ok(Json(state.engine.events_from(q.from, limit)?))
}

/// `GET /ws`: upgrades to a WebSocket that pushes every committed event as
/// JSON. Read-only from the server's side; client messages are ignored.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.engine.subscribe();

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
                        // Missed events can be re-read from /events.
                        tracing::warn!("ws subscriber lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
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

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use termvault_protocol::clock::{Clock, ManualClock};
    use termvault_protocol::config::SECONDS_PER_MONTH;
    use termvault_protocol::crypto::keys::AccountKeypair;
    use termvault_protocol::fhe::{DecryptionSession, NetworkKey};
    use termvault_protocol::storage::TermVaultDb;
    use tower::ServiceExt;

    use crate::metrics::NodeMetrics;

    const T0: u64 = 1_760_000_000;

    /// A router over a temporary database and a manual clock.
    fn test_router() -> (Router, AppState, ManualClock) {
        let clock = ManualClock::new(T0);
        let metrics = Arc::new(NodeMetrics::new().unwrap());
        let engine = Engine::open(
            TermVaultDb::open_temporary().unwrap(),
            NetworkKey::generate(),
            Arc::new(clock.clone()),
            metrics.clone(),
            None,
        )
        .unwrap();
        let state = AppState {
            engine: Arc::new(engine),
            metrics,
        };
        (create_router(state.clone()), state, clock)
    }

    fn account() -> (AccountKeypair, Address) {
        let key = AccountKeypair::generate();
        let addr = Address::from_public_key(&key.public_key());
        (key, addr)
    }

    /// Sends a GET request and returns the (status, body_bytes).
    async fn get(router: &Router, path: &str) -> (StatusCode, Vec<u8>) {
        let req = Request::builder().uri(path).body(Body::empty()).unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec();
        (status, body)
    }

    /// Sends a POST request with JSON body and returns (status, body_bytes).
    async fn post_json(
        router: &Router,
        path: &str,
        body: serde_json::Value,
    ) -> (StatusCode, Vec<u8>) {
        let req = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec();
        (status, body)
    }

    fn error_kind(body: &[u8]) -> String {
        let err: ErrorResponse = serde_json::from_slice(body).unwrap();
        err.kind
    }

    /// Reads `account`'s balance through `/token/decrypt`.
    async fn read_balance(router: &Router, key: &AccountKeypair, account: Address, now: u64) -> u64 {
        let (_, body) = get(router, "/token").await;
        let token: TokenInfo = serde_json::from_slice(&body).unwrap();

        let (_, body) = get(router, &format!("/token/balances/{account}")).await;
        let balance: HandleResponse = serde_json::from_slice(&body).unwrap();

        let session = DecryptionSession::new(key, vec![token.address], now, 1);
        let req = DecryptRequest {
            request: session.signed_request().clone(),
            pairs: vec![HandleContractPair {
                handle: balance.handle,
                contract: token.address,
            }],
        };
        let (status, body) =
            post_json(router, "/token/decrypt", serde_json::to_value(&req).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        let resp: DecryptResponse = serde_json::from_slice(&body).unwrap();
        session.open(&resp.values[0]).unwrap()
    }

    // -- Basics -------------------------------------------------------------

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let (router, _, _) = test_router();
        let (status, body) = get(&router, "/health").await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn status_reports_clock_and_empty_bank() {
        let (router, _, _) = test_router();
        let (status, body) = get(&router, "/status").await;

        assert_eq!(status, StatusCode::OK);
        let resp: StatusResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(resp.engine.now, T0);
        assert_eq!(resp.engine.deposit_count, 0);
        assert_eq!(resp.engine.event_count, 0);
    }

    // -- Preview ------------------------------------------------------------

    #[tokio::test]
    async fn preview_accepts_codes_and_aliases() {
        let (router, _, _) = test_router();

        let (status, body) = get(&router, "/bank/preview?term=1&principal=1000").await;
        assert_eq!(status, StatusCode::OK);
        let resp: PreviewResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(resp.interest, 60);
        assert_eq!(resp.payout, 1060);

        let (_, body) = get(&router, "/bank/preview?term=3y&principal=1000").await;
        let resp: PreviewResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(resp.interest, 360);
        assert_eq!(resp.months, 36);
    }

    #[tokio::test]
    async fn preview_rejects_unknown_term() {
        let (router, _, _) = test_router();
        let (status, body) = get(&router, "/bank/preview?term=7&principal=1000").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_kind(&body), "invalid_request");
    }

    // -- Full lifecycle -----------------------------------------------------

    #[tokio::test]
    async fn deposit_lifecycle_over_http() {
        let (router, state, clock) = test_router();
        let (alice_key, alice) = account();
        let bank = state.engine.status().bank_address;

        let (status, _) = post_json(
            &router,
            "/token/mint",
            serde_json::json!({ "caller": alice, "to": alice, "amount": 100 }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = post_json(
            &router,
            "/token/operators",
            serde_json::json!({ "caller": alice, "operator": bank }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let grant: OperatorStatus = serde_json::from_slice(&body).unwrap();
        assert!(grant.live);

        let (status, body) = post_json(
            &router,
            "/bank/deposits",
            serde_json::json!({ "caller": alice, "principal": 100, "term": 0 }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let view: DepositView = serde_json::from_slice(&body).unwrap();
        assert_eq!(view.id, 1);
        assert_eq!(view.maturity_timestamp, T0 + SECONDS_PER_MONTH);
        assert!(!view.matured);

        // Locked until maturity.
        let (status, body) = post_json(
            &router,
            "/bank/deposits/1/withdraw",
            serde_json::json!({ "caller": alice }),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(error_kind(&body), "deposit_locked");

        clock.advance(31 * 86_400);
        let (status, body) = post_json(
            &router,
            "/bank/deposits/1/withdraw",
            serde_json::json!({ "caller": alice }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let receipt: WithdrawReceipt = serde_json::from_slice(&body).unwrap();
        assert_eq!((receipt.principal, receipt.interest, receipt.payout), (100, 1, 101));

        let (status, body) = post_json(
            &router,
            "/bank/deposits/1/withdraw",
            serde_json::json!({ "caller": alice }),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(error_kind(&body), "already_withdrawn");

        assert_eq!(read_balance(&router, &alice_key, alice, clock.now()).await, 101);

        let (_, body) = get(&router, &format!("/bank/accounts/{alice}/deposits")).await;
        let listing: OwnerDepositsResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(listing.deposits.len(), 1);
        assert!(listing.deposits[0].withdrawn);

        let (_, body) = get(&router, "/events?from=0").await;
        let events: Vec<engine::SequencedEvent> = serde_json::from_slice(&body).unwrap();
        let json = serde_json::to_value(&events.last().unwrap().event).unwrap();
        assert_eq!(json["source"], "bank");
        assert_eq!(json["data"]["type"], "withdrawn");
    }

    // -- Error mapping ------------------------------------------------------

    #[tokio::test]
    async fn deposit_without_grant_is_forbidden() {
        let (router, _, _) = test_router();
        let (_, alice) = account();
        post_json(
            &router,
            "/token/mint",
            serde_json::json!({ "caller": alice, "to": alice, "amount": 10 }),
        )
        .await;

        let (status, body) = post_json(
            &router,
            "/bank/deposits",
            serde_json::json!({ "caller": alice, "principal": 10, "term": 0 }),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(error_kind(&body), "not_authorized");

        let (_, body) = get(&router, &format!("/bank/accounts/{alice}/deposits")).await;
        let listing: OwnerDepositsResponse = serde_json::from_slice(&body).unwrap();
        assert!(listing.deposits.is_empty());
    }

    #[tokio::test]
    async fn bad_inputs_map_to_400_404_409() {
        let (router, state, _) = test_router();
        let (_, alice) = account();
        let bank = state.engine.status().bank_address;
        post_json(
            &router,
            "/token/operators",
            serde_json::json!({ "caller": alice, "operator": bank }),
        )
        .await;

        let (status, body) = post_json(
            &router,
            "/token/mint",
            serde_json::json!({ "caller": alice, "to": alice, "amount": 0 }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_kind(&body), "invalid_amount");

        let (status, body) = post_json(
            &router,
            "/bank/deposits",
            serde_json::json!({ "caller": alice, "principal": 10, "term": 4 }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_kind(&body), "invalid_term");

        let (status, body) = post_json(
            &router,
            "/bank/deposits",
            serde_json::json!({ "caller": alice, "principal": 10, "term": 0 }),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(error_kind(&body), "insufficient_balance");

        let (status, body) = get(&router, "/bank/deposits/42").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(error_kind(&body), "not_found");
    }

    #[tokio::test]
    async fn operator_status_tracks_expiry() {
        let (router, _, clock) = test_router();
        let (_, alice) = account();
        let (_, bob) = account();

        post_json(
            &router,
            "/token/operators",
            serde_json::json!({ "caller": alice, "operator": bob, "until": T0 + 10 }),
        )
        .await;
        let path = format!("/token/operators/{alice}/{bob}");
        let (_, body) = get(&router, &path).await;
        let st: OperatorStatus = serde_json::from_slice(&body).unwrap();
        assert!(st.live);

        clock.advance(10);
        let (_, body) = get(&router, &path).await;
        let st: OperatorStatus = serde_json::from_slice(&body).unwrap();
        assert!(!st.live);
        assert_eq!(st.expiry, Some(T0 + 10));
    }

    #[tokio::test]
    async fn decrypt_of_someone_elses_balance_is_forbidden() {
        let (router, _, clock) = test_router();
        let (_, alice) = account();
        let (mallory_key, _) = account();
        post_json(
            &router,
            "/token/mint",
            serde_json::json!({ "caller": alice, "to": alice, "amount": 10 }),
        )
        .await;

        let (_, body) = get(&router, "/token").await;
        let token: TokenInfo = serde_json::from_slice(&body).unwrap();
        let (_, body) = get(&router, &format!("/token/balances/{alice}")).await;
        let balance: HandleResponse = serde_json::from_slice(&body).unwrap();

        let session = DecryptionSession::new(&mallory_key, vec![token.address], clock.now(), 1);
        let req = DecryptRequest {
            request: session.signed_request().clone(),
            pairs: vec![HandleContractPair {
                handle: balance.handle,
                contract: token.address,
            }],
        };
        let (status, body) =
            post_json(&router, "/token/decrypt", serde_json::to_value(&req).unwrap()).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(error_kind(&body), "access_denied");
    }

    #[tokio::test]
    async fn rejections_are_counted() {
        let (router, state, _) = test_router();
        let (_, alice) = account();
        post_json(
            &router,
            "/bank/deposits",
            serde_json::json!({ "caller": alice, "principal": 10, "term": 0 }),
        )
        .await;

        let text = state.metrics.encode().unwrap();
        assert!(text.contains("termvault_rejected_total{kind=\"not_authorized\"} 1"));
    }
}
