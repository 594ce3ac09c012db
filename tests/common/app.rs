use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde_json::{json, Value};

use apicheck::services::basic_auth_header;

use super::factory::products;

pub const BEARER_TOKEN: &str = "gorest-test-token";
pub const CLIENT_ID: &str = "spotify-client";
pub const CLIENT_SECRET: &str = "spotify-secret";
pub const BASIC_USER: &str = "admin";
pub const BASIC_PASS: &str = "admin";

/// First identifier handed out by the users API
pub const FIRST_USER_ID: u64 = 8278256;

/// Behaviour switches for the stub APIs
#[derive(Debug, Clone)]
pub struct StubConfig {
    /// Token the users API requires; `None` accepts anonymous calls
    pub bearer_token: Option<String>,
    /// Keep answering 200 with the old body after a delete
    pub stale_after_delete: bool,
    /// Serve user ids as strings in the list endpoint
    pub corrupt_user_list: bool,
    pub token_status: u16,
    pub token_expires_in: Option<u64>,
    pub omit_access_token: bool,
    pub token_delay: Duration,
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            bearer_token: Some(BEARER_TOKEN.to_string()),
            stale_after_delete: false,
            corrupt_user_list: false,
            token_status: 200,
            token_expires_in: Some(3600),
            omit_access_token: false,
            token_delay: Duration::ZERO,
        }
    }
}

#[derive(Default)]
struct StubInner {
    users: Mutex<BTreeMap<u64, Value>>,
    deleted: Mutex<BTreeMap<u64, Value>>,
    next_id: AtomicU64,
    requests: Mutex<Vec<String>>,
    issued_tokens: Mutex<Vec<String>>,
    token_exchanges: AtomicUsize,
}

/// Shared state of one stub server, inspected by tests
#[derive(Clone)]
pub struct StubState {
    config: Arc<StubConfig>,
    inner: Arc<StubInner>,
}

impl StubState {
    fn log(&self, method: &str, path: &str) {
        self.inner
            .requests
            .lock()
            .unwrap()
            .push(format!("{} {}", method, path));
    }

    /// Every request served so far, as "METHOD path"
    pub fn requests(&self) -> Vec<String> {
        self.inner.requests.lock().unwrap().clone()
    }

    pub fn token_exchanges(&self) -> usize {
        self.inner.token_exchanges.load(Ordering::SeqCst)
    }

    pub fn user_count(&self) -> usize {
        self.inner.users.lock().unwrap().len()
    }

    pub fn user(&self, id: u64) -> Option<Value> {
        self.inner.users.lock().unwrap().get(&id).cloned()
    }

    fn bearer_ok(&self, headers: &HeaderMap) -> bool {
        match &self.config.bearer_token {
            None => true,
            Some(token) => header(headers, "authorization") == Some(format!("Bearer {}", token)),
        }
    }
}

/// A stub API server on an ephemeral local port
pub struct StubApp {
    pub base_url: String,
    pub state: StubState,
}

impl StubApp {
    pub async fn new() -> Self {
        Self::with_config(StubConfig::default()).await
    }

    pub async fn with_config(config: StubConfig) -> Self {
        let state = StubState {
            config: Arc::new(config),
            inner: Arc::new(StubInner {
                next_id: AtomicU64::new(FIRST_USER_ID),
                ..StubInner::default()
            }),
        };

        let router = Router::new()
            .route("/public/v2/users", post(create_user).get(list_users))
            .route(
                "/public/v2/users/{id}",
                get(get_user)
                    .put(update_user)
                    .patch(update_user)
                    .delete(delete_user),
            )
            .route("/products", get(list_products))
            .route("/basic_auth", get(basic_auth))
            .route("/api/token", post(token))
            .route("/v1/albums/{id}", get(album))
            .route("/echo/headers", get(echo_headers))
            .route("/slow", get(slow))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind stub listener");
        let addr = listener.local_addr().expect("Stub listener has no address");

        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("Stub server failed");
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// An address nothing listens on
pub async fn closed_port_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"message": "Authentication failed"})),
    )
        .into_response()
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"message": "Resource not found"})),
    )
        .into_response()
}

// ============ Users API ============

async fn create_user(
    State(state): State<StubState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Response {
    state.log("POST", "/public/v2/users");
    if !state.bearer_ok(&headers) {
        return unauthorized();
    }

    let id = state.inner.next_id.fetch_add(1, Ordering::SeqCst);
    let mut user = payload;
    user["id"] = json!(id);
    state.inner.users.lock().unwrap().insert(id, user.clone());

    (StatusCode::CREATED, Json(user)).into_response()
}

async fn list_users(State(state): State<StubState>, headers: HeaderMap) -> Response {
    state.log("GET", "/public/v2/users");
    if !state.bearer_ok(&headers) {
        return unauthorized();
    }

    let users: Vec<Value> = state
        .inner
        .users
        .lock()
        .unwrap()
        .values()
        .map(|user| {
            let mut user = user.clone();
            if state.config.corrupt_user_list {
                user["id"] = json!(user["id"].to_string());
            }
            user
        })
        .collect();

    Json(Value::Array(users)).into_response()
}

async fn get_user(
    State(state): State<StubState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.log("GET", &format!("/public/v2/users/{}", id));
    if !state.bearer_ok(&headers) {
        return unauthorized();
    }
    let Ok(id) = id.parse::<u64>() else {
        return not_found();
    };

    if let Some(user) = state.inner.users.lock().unwrap().get(&id) {
        return Json(user.clone()).into_response();
    }
    if state.config.stale_after_delete {
        if let Some(user) = state.inner.deleted.lock().unwrap().get(&id) {
            return Json(user.clone()).into_response();
        }
    }
    not_found()
}

async fn update_user(
    State(state): State<StubState>,
    method: Method,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Response {
    state.log(method.as_str(), &format!("/public/v2/users/{}", id));
    if !state.bearer_ok(&headers) {
        return unauthorized();
    }
    let Ok(id) = id.parse::<u64>() else {
        return not_found();
    };

    let mut users = state.inner.users.lock().unwrap();
    let Some(user) = users.get_mut(&id) else {
        return not_found();
    };
    if let (Some(target), Some(changes)) = (user.as_object_mut(), payload.as_object()) {
        for (key, value) in changes {
            target.insert(key.clone(), value.clone());
        }
    }

    Json(user.clone()).into_response()
}

async fn delete_user(
    State(state): State<StubState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.log("DELETE", &format!("/public/v2/users/{}", id));
    if !state.bearer_ok(&headers) {
        return unauthorized();
    }
    let Ok(id) = id.parse::<u64>() else {
        return not_found();
    };

    match state.inner.users.lock().unwrap().remove(&id) {
        Some(user) => {
            state.inner.deleted.lock().unwrap().insert(id, user);
            StatusCode::NO_CONTENT.into_response()
        }
        None => not_found(),
    }
}

// ============ Products API ============

async fn list_products(State(state): State<StubState>) -> Response {
    state.log("GET", "/products");
    Json(products()).into_response()
}

// ============ Basic auth demo ============

async fn basic_auth(State(state): State<StubState>, headers: HeaderMap) -> Response {
    state.log("GET", "/basic_auth");
    if header(&headers, "authorization") == Some(basic_auth_header(BASIC_USER, BASIC_PASS)) {
        "Congratulations! You must have the proper credentials.".into_response()
    } else {
        (StatusCode::UNAUTHORIZED, "Not authorized").into_response()
    }
}

// ============ OAuth2 token endpoint and protected API ============

async fn token(
    State(state): State<StubState>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.log("POST", "/api/token");
    let exchange = state.inner.token_exchanges.fetch_add(1, Ordering::SeqCst) + 1;

    if !state.config.token_delay.is_zero() {
        tokio::time::sleep(state.config.token_delay).await;
    }

    let basic_ok =
        header(&headers, "authorization") == Some(basic_auth_header(CLIENT_ID, CLIENT_SECRET));
    let grant_ok = form.get("grant_type").map(String::as_str) == Some("client_credentials");
    if !basic_ok || !grant_ok {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid_client"})),
        )
            .into_response();
    }

    let status = StatusCode::from_u16(state.config.token_status).unwrap_or(StatusCode::OK);
    if status != StatusCode::OK {
        return (status, Json(json!({"error": "server_error"}))).into_response();
    }

    if state.config.omit_access_token {
        return Json(json!({"token_type": "Bearer"})).into_response();
    }

    let access_token = format!("token-{}", exchange);
    state
        .inner
        .issued_tokens
        .lock()
        .unwrap()
        .push(access_token.clone());

    let mut body = json!({"access_token": access_token, "token_type": "Bearer"});
    if let Some(expires_in) = state.config.token_expires_in {
        body["expires_in"] = json!(expires_in);
    }
    Json(body).into_response()
}

async fn album(
    State(state): State<StubState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.log("GET", &format!("/v1/albums/{}", id));

    let presented = header(&headers, "authorization")
        .and_then(|value| value.strip_prefix("Bearer ").map(str::to_string));
    let known = presented
        .map(|token| state.inner.issued_tokens.lock().unwrap().contains(&token))
        .unwrap_or(false);
    if !known {
        return unauthorized();
    }

    Json(json!({
        "id": id,
        "name": "Ab-Soul Presents: Dramatically Different",
        "album_type": "album",
        "total_tracks": 12
    }))
    .into_response()
}

// ============ Diagnostics ============

async fn echo_headers(headers: HeaderMap) -> Response {
    let map: BTreeMap<String, String> = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect();
    Json(map).into_response()
}

async fn slow() -> Response {
    tokio::time::sleep(Duration::from_secs(5)).await;
    "too late".into_response()
}
