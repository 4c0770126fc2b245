//! In-process stand-in for the catalog REST service.
//!
//! Tokens: the server only accepts `VALID_AT_START` until the first renewal,
//! so the credential handed out by login is already expired and the first
//! authenticated request runs into a 401.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use educonnect_session::credentials::MemoryCredentialStore;
use educonnect_session::{CatalogClient, SessionConfig};
use parking_lot::Mutex;
use serde_json::{Value, json};

pub const VALID_AT_START: &str = "access-0";
pub const LOGIN_ACCESS: &str = "access-1";
pub const LOGIN_REFRESH: &str = "refresh-1";
pub const RENEWED_ACCESS: &str = "access-2";
pub const PASSWORD: &str = "secret";

const REFRESH_DELAY: Duration = Duration::from_millis(50);

pub struct MockApi {
    valid_token: Mutex<String>,
    pub refresh_calls: AtomicUsize,
    pub refresh_fails: AtomicBool,
    /// Reject every bearer token, renewed or not.
    pub reject_all: AtomicBool,
    /// Course list responses actually served (200).
    pub course_list_calls: AtomicUsize,
    pub saved_list_calls: AtomicUsize,
    /// Save requests that reached the handler, accepted or not.
    pub save_attempts: AtomicUsize,
    /// Body of the last accepted save.
    pub last_saved: Mutex<Option<Value>>,
    /// Credentials seen on endpoints that must be called anonymously.
    pub anonymous_with_auth: AtomicUsize,
    course_delay_ms: AtomicU64,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            valid_token: Mutex::new(VALID_AT_START.to_string()),
            refresh_calls: AtomicUsize::new(0),
            refresh_fails: AtomicBool::new(false),
            reject_all: AtomicBool::new(false),
            course_list_calls: AtomicUsize::new(0),
            saved_list_calls: AtomicUsize::new(0),
            save_attempts: AtomicUsize::new(0),
            last_saved: Mutex::new(None),
            anonymous_with_auth: AtomicUsize::new(0),
            course_delay_ms: AtomicU64::new(0),
        })
    }

    pub fn set_course_delay(&self, delay: Duration) {
        self.course_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// `Ok(true)` for a valid bearer, `Ok(false)` for none, 401 otherwise.
    fn authorize(&self, headers: &HeaderMap) -> Result<bool, Response> {
        match bearer(headers) {
            None => Ok(false),
            Some(token)
                if !self.reject_all.load(Ordering::SeqCst)
                    && token == self.valid_token.lock().as_str() =>
            {
                Ok(true)
            }
            Some(_) => Err(unauthorized()),
        }
    }

    fn require_auth(&self, headers: &HeaderMap) -> Result<(), Response> {
        if self.authorize(headers)? {
            Ok(())
        } else {
            Err(unauthorized())
        }
    }

    fn note_anonymous(&self, headers: &HeaderMap) {
        if headers.contains_key(AUTHORIZATION) {
            self.anonymous_with_auth.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"detail": "Given token not valid for any token type"})),
    )
        .into_response()
}

type Api = State<Arc<MockApi>>;

async fn login(State(api): Api, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    api.note_anonymous(&headers);
    if body["password"] != PASSWORD {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "No active account found with the given credentials"})),
        )
            .into_response();
    }
    Json(json!({
        "access": LOGIN_ACCESS,
        "refresh": LOGIN_REFRESH,
        "user": {"email": body["email"]},
    }))
    .into_response()
}

async fn register(State(api): Api, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    api.note_anonymous(&headers);
    (StatusCode::CREATED, Json(json!({"id": 7, "email": body["email"]}))).into_response()
}

async fn refresh(State(api): Api, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    api.note_anonymous(&headers);
    let n = api.refresh_calls.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(REFRESH_DELAY).await;

    if api.refresh_fails.load(Ordering::SeqCst) || body["refresh"] != LOGIN_REFRESH {
        return unauthorized();
    }

    let access = format!("access-{}", n + 2);
    *api.valid_token.lock() = access.clone();
    Json(json!({ "access": access })).into_response()
}

async fn profile(State(api): Api, headers: HeaderMap) -> Result<Response, Response> {
    api.require_auth(&headers)?;
    Ok(Json(json!({"email": "student@example.com"})).into_response())
}

async fn course_list(
    State(api): Api,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Result<Response, Response> {
    api.authorize(&headers)?;
    let delay = api.course_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    api.course_list_calls.fetch_add(1, Ordering::SeqCst);
    Ok(Json(json!({
        "count": 1,
        "next": null,
        "previous": null,
        "results": [{"id": 1, "query": query.unwrap_or_default()}],
    }))
    .into_response())
}

async fn course_detail(
    State(api): Api,
    Path(id): Path<u64>,
    headers: HeaderMap,
) -> Result<Response, Response> {
    api.authorize(&headers)?;
    Ok(Json(json!({"id": id})).into_response())
}

async fn saved_list(State(api): Api, headers: HeaderMap) -> Result<Response, Response> {
    api.require_auth(&headers)?;
    api.saved_list_calls.fetch_add(1, Ordering::SeqCst);
    Ok(Json(json!({"count": 0, "next": null, "previous": null, "results": []})).into_response())
}

async fn save_course(
    State(api): Api,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Response, Response> {
    api.save_attempts.fetch_add(1, Ordering::SeqCst);
    api.require_auth(&headers)?;
    *api.last_saved.lock() = Some(body.clone());
    Ok((
        StatusCode::CREATED,
        Json(json!({"id": 5, "course_id": body["course_id"], "notes": body["notes"]})),
    )
        .into_response())
}

async fn compare(Json(body): Json<Value>) -> Response {
    let empty = body["course_ids"].as_array().is_none_or(|ids| ids.is_empty());
    if empty {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"course_ids": ["This list may not be empty."]})),
        )
            .into_response();
    }
    Json(json!({"courses": body["course_ids"]})).into_response()
}

async fn statistics() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response()
}

/// Serve the mock on an ephemeral port.
pub async fn spawn_server(api: Arc<MockApi>) -> SocketAddr {
    let app = Router::new()
        .route("/api/auth/login/", post(login))
        .route("/api/auth/register/", post(register))
        .route("/api/auth/token/refresh/", post(refresh))
        .route("/api/auth/profile/", get(profile))
        .route("/api/courses/", get(course_list))
        .route("/api/courses/{id}/", get(course_detail))
        .route("/api/saved-courses/", get(saved_list).post(save_course))
        .route("/api/compare/", post(compare))
        .route("/api/statistics/", get(statistics))
        .with_state(api);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

pub fn config_for(addr: SocketAddr) -> SessionConfig {
    SessionConfig {
        api_base_url: format!("http://{addr}/api"),
        request_timeout: Duration::from_secs(5),
        search_debounce: Duration::from_millis(20),
        ..SessionConfig::default()
    }
}

pub fn client_with(addr: SocketAddr, store: Arc<MemoryCredentialStore>) -> CatalogClient {
    CatalogClient::with_store(config_for(addr), store).unwrap()
}

/// Mock server plus a client with an empty in-memory store.
pub async fn setup() -> (Arc<MockApi>, CatalogClient, Arc<MemoryCredentialStore>) {
    let api = MockApi::new();
    let addr = spawn_server(Arc::clone(&api)).await;
    let store = Arc::new(MemoryCredentialStore::new());
    let client = client_with(addr, Arc::clone(&store));
    (api, client, store)
}
