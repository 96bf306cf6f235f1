#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};

use backoffice_client::api::ApiClient;
use backoffice_client::config::AppConfig;
use backoffice_client::session::{RecordingNavigator, SessionManager};
use backoffice_client::store::MemoryStore;

pub const OPERATOR_EMAIL: &str = "ops@example.com";
pub const OPERATOR_PASSWORD: &str = "correct-horse";
pub const OPERATOR_TOKEN: &str = "operator-token";

/// How the mock answers `GET /api/client/dashboard`.
#[derive(Debug, Clone)]
pub enum DashboardMode {
    Ok,
    Unauthorized,
    Html,
    ServerError(&'static str),
    NotSuccessful(&'static str),
}

#[derive(Debug)]
struct MockState {
    dashboard_mode: DashboardMode,
    dashboard_calls: usize,
    dashboard_delay: Option<Duration>,
    tokens_seen: Vec<Option<String>>,
    last_query: HashMap<String, String>,
}

/// In-process backend speaking the dashboard and auth routes.
#[derive(Clone)]
pub struct MockBackend {
    pub base_url: String,
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub async fn start() -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let state = Arc::new(Mutex::new(MockState {
            dashboard_mode: DashboardMode::Ok,
            dashboard_calls: 0,
            dashboard_delay: None,
            tokens_seen: Vec::new(),
            last_query: HashMap::new(),
        }));

        let app = Router::new()
            .route("/api/auth/login", post(login))
            .route("/api/auth/admin/impersonate/:subject_id", post(impersonate))
            .route("/api/client/dashboard", get(dashboard))
            .route("/api/client/dashboard/transactions", get(transactions))
            .route("/api/client/dashboard/account/:id", get(account))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .context("failed to bind mock backend")?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self { base_url, state })
    }

    pub fn set_dashboard_mode(&self, mode: DashboardMode) {
        self.state.lock().dashboard_mode = mode;
    }

    pub fn set_dashboard_delay(&self, delay: Option<Duration>) {
        self.state.lock().dashboard_delay = delay;
    }

    pub fn dashboard_calls(&self) -> usize {
        self.state.lock().dashboard_calls
    }

    /// Bearer tokens presented to any route, in arrival order.
    pub fn tokens_seen(&self) -> Vec<Option<String>> {
        self.state.lock().tokens_seen.clone()
    }

    pub fn last_token(&self) -> Option<String> {
        self.state.lock().tokens_seen.last().cloned().flatten()
    }

    pub fn last_query(&self) -> HashMap<String, String> {
        self.state.lock().last_query.clone()
    }
}

/// One session context wired to the mock over an in-memory store.
pub struct Harness {
    pub store: MemoryStore,
    pub navigator: RecordingNavigator,
    pub session: SessionManager,
    pub api: ApiClient,
}

impl Harness {
    pub fn new(backend: &MockBackend) -> Result<Self> {
        Self::with_store(backend, MemoryStore::new())
    }

    /// A second context sharing `store` with another harness.
    pub fn with_store(backend: &MockBackend, store: MemoryStore) -> Result<Self> {
        let navigator = RecordingNavigator::new();
        let session = SessionManager::new(Arc::new(store.clone()), Arc::new(navigator.clone()));
        let config = AppConfig::for_base_url(&backend.base_url);
        let api = ApiClient::new(&config.api, session.clone())?;
        Ok(Self {
            store,
            navigator,
            session,
            api,
        })
    }

    pub async fn login(&self) -> Result<()> {
        self.api.login(OPERATOR_EMAIL, OPERATOR_PASSWORD).await?;
        Ok(())
    }
}

type Shared = State<Arc<Mutex<MockState>>>;

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

async fn login(State(state): Shared, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    state.lock().tokens_seen.push(bearer(&headers));

    if body["email"] == OPERATOR_EMAIL && body["password"] == OPERATOR_PASSWORD {
        Json(json!({
            "token": OPERATOR_TOKEN,
            "user": { "_id": "op-1", "name": "Olivia Ops", "email": OPERATOR_EMAIL }
        }))
        .into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "success": false, "message": "Invalid credentials" })),
        )
            .into_response()
    }
}

async fn impersonate(
    State(state): Shared,
    headers: HeaderMap,
    Path(subject_id): Path<String>,
) -> Response {
    let token = bearer(&headers);
    state.lock().tokens_seen.push(token.clone());

    if token.as_deref() != Some(OPERATOR_TOKEN) {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": { "message": "Admin access required" } })),
        )
            .into_response();
    }

    Json(json!({
        "token": format!("delegate-{}", subject_id),
        "user": {
            "_id": subject_id,
            "name": "Carla Client",
            "email": "carla@example.com"
        }
    }))
    .into_response()
}

async fn dashboard(State(state): Shared, headers: HeaderMap) -> Response {
    let (mode, delay, call) = {
        let mut state = state.lock();
        state.tokens_seen.push(bearer(&headers));
        state.dashboard_calls += 1;
        (
            state.dashboard_mode.clone(),
            state.dashboard_delay,
            state.dashboard_calls,
        )
    };

    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    match mode {
        DashboardMode::Ok => Json(json!({
            "success": true,
            "data": {
                "stats": {
                    "totalBalance": "12500.50",
                    "totalDeposits": "15000",
                    "totalWithdrawals": "2500",
                    "totalProfit": "0.50",
                    "activeAccounts": call,
                    "pendingTransactions": 1
                },
                "recentTransactions": [transaction_json("tx-1")],
                "activeAccounts": [account_json("acc-1")],
                "tradingPerformance": [
                    { "date": "2024-03-01", "balance": "12000", "profit": "0" }
                ]
            }
        }))
        .into_response(),
        DashboardMode::Unauthorized => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "success": false, "message": "Token expired" })),
        )
            .into_response(),
        DashboardMode::Html => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            "<!doctype html><html><body>Sign in</body></html>",
        )
            .into_response(),
        DashboardMode::ServerError(message) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "success": false, "message": message })),
        )
            .into_response(),
        DashboardMode::NotSuccessful(message) => {
            Json(json!({ "success": false, "message": message })).into_response()
        }
    }
}

async fn transactions(
    State(state): Shared,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    {
        let mut state = state.lock();
        state.tokens_seen.push(bearer(&headers));
        state.last_query = query;
    }

    Json(json!({
        "success": true,
        "data": [transaction_json("tx-1"), transaction_json("tx-2")]
    }))
    .into_response()
}

async fn account(State(state): Shared, headers: HeaderMap, Path(id): Path<String>) -> Response {
    state.lock().tokens_seen.push(bearer(&headers));

    if id == "missing" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "message": "Account not found" })),
        )
            .into_response();
    }

    Json(json!({ "success": true, "data": account_json(&id) })).into_response()
}

fn transaction_json(id: &str) -> Value {
    json!({
        "_id": id,
        "type": "deposit",
        "amount": "500.00",
        "currency": "USD",
        "status": "completed",
        "description": "Wire transfer",
        "createdAt": "2024-03-01T10:00:00Z"
    })
}

fn account_json(id: &str) -> Value {
    json!({
        "_id": id,
        "accountNumber": "MT-100200",
        "accountType": "standard",
        "currency": "USD",
        "balance": "12500.50",
        "equity": "12610.00",
        "leverage": 100,
        "status": "active"
    })
}
