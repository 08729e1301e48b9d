//! In-process stand-in for the backend, bound to an ephemeral localhost port.
#![allow(dead_code)]


use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::task::JoinHandle;

pub const GOOD_TOKEN: &str = "tok-ann";

#[derive(Clone, Default)]
pub struct Hits {
    pub info: Arc<AtomicUsize>,
    pub market: Arc<AtomicUsize>,
}

impl Hits {
    pub fn info(&self) -> usize { self.info.load(Ordering::SeqCst) }
    pub fn market(&self) -> usize { self.market.load(Ordering::SeqCst) }
}

pub struct Backend {
    pub base: String,
    pub hits: Hits,
    handle: JoinHandle<()>,
}

impl Drop for Backend {
    fn drop(&mut self) { self.handle.abort(); }
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers.get("authorization").and_then(|v| v.to_str().ok()).map(str::to_string)
}

async fn login(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if body["username"] == "ann" && body["password"] == "pw" {
        (StatusCode::OK, Json(json!({"token": GOOD_TOKEN, "user": {"username": "ann"}})))
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({"error": "Invalid credentials"})))
    }
}

async fn register(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if body["username"] == "taken" {
        return (StatusCode::CONFLICT, Json(json!({"error": "Username already exists"})));
    }
    (StatusCode::CREATED, Json(json!({"data": {"token": format!("tok-{}", body["username"].as_str().unwrap_or(""))}})))
}

async fn profile(headers: HeaderMap) -> (StatusCode, Json<Value>) {
    match bearer(&headers) {
        Some(h) if h == format!("Bearer {}", GOOD_TOKEN) => (StatusCode::OK, Json(json!({"username": "ann", "ram": 512}))),
        _ => (StatusCode::UNAUTHORIZED, Json(json!({"error": "Unauthorized"}))),
    }
}

/// Echoes what the client sent: body, content type, authorization and cookie headers.
async fn echo(headers: HeaderMap, body: String) -> Json<Value> {
    Json(json!({
        "body": serde_json::from_str::<Value>(&body).unwrap_or(Value::Null),
        "contentType": headers.get("content-type").and_then(|v| v.to_str().ok()),
        "authorization": bearer(&headers),
        "cookie": headers.get("cookie").and_then(|v| v.to_str().ok()),
    }))
}

async fn activate(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if body["key"] == "VALID-KEY" {
        (StatusCode::OK, Json(json!({"activated": true})))
    } else {
        (StatusCode::NOT_FOUND, Json(json!({"error": "Key not found"})))
    }
}

async fn info(State(hits): State<Hits>) -> Json<Value> {
    let n = hits.info.fetch_add(1, Ordering::SeqCst) + 1;
    Json(json!({"name": "SexyGuard", "hits": n}))
}

async fn market(State(hits): State<Hits>) -> Json<Value> {
    hits.market.fetch_add(1, Ordering::SeqCst);
    Json(json!({"items": [{"name": "basic", "price": 5}, {"name": "pro", "price": 12}]}))
}

async fn not_json() -> (StatusCode, &'static str) { (StatusCode::OK, "<html>maintenance</html>") }

async fn broken() -> (StatusCode, &'static str) { (StatusCode::INTERNAL_SERVER_ERROR, "oops") }

async fn health() -> Json<Value> { Json(json!({"status": "ok"})) }

pub async fn spawn_backend() -> Backend {
    let hits = Hits::default();
    let app = Router::new()
        .route("/api/v1/auth/login", post(login))
        .route("/api/v1/auth/register", post(register))
        .route("/api/v1/profile/me", get(profile))
        .route("/api/v1/profile/password", post(echo))
        .route("/api/v1/profile/ram", post(echo))
        .route("/api/v1/keys/generate", post(echo))
        .route("/api/v1/keys/activate", post(activate))
        .route("/api/v1/public/info", get(info))
        .route("/api/v1/public/market", get(market))
        .route("/api/v1/public/version", get(not_json))
        .route("/echo", get(echo).post(echo))
        .route("/broken", get(broken))
        .route("/health", get(health))
        .with_state(hits.clone());

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.expect("bind 127.0.0.1:0");
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            eprintln!("backend task error: {e:?}");
        }
    });
    Backend { base: format!("http://127.0.0.1:{}", port), hits, handle }
}

/// Address nothing is listening on.
pub fn dead_address() -> String {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).expect("bind 127.0.0.1:0");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}
