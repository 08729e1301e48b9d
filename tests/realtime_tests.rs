use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use serde_json::{json, Value};

use sexyguard::realtime::{
    ClientHandle, Filter, FilterOp, RealtimeBootstrap, RealtimeClient, RealtimeSource, RestConnector,
    RestRealtimeClient, Subscription,
};
use sexyguard::config::RealtimeSettings;
use sexyguard::ClientError;

#[derive(Clone, Default)]
struct Service {
    leaves: Arc<AtomicUsize>,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("apikey").and_then(|v| v.to_str().ok()) == Some("anon")
}

async fn root(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "Invalid API key"}))).into_response();
    }
    Json(json!({"swagger": "2.0"})).into_response()
}

async fn rows(
    method: Method,
    Path(table): Path<String>,
    Query(q): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Option<Json<Value>>,
) -> Response {
    if table == "secrets" {
        return (StatusCode::FORBIDDEN, Json(json!({"code": "42501", "message": "permission denied for table secrets"})))
            .into_response();
    }
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
    Json(json!([{
        "method": method.as_str(),
        "table": table,
        "query": q,
        "acceptProfile": header("accept-profile"),
        "contentProfile": header("content-profile"),
        "prefer": header("prefer"),
        "authorization": header("authorization"),
        "body": body.map(|Json(b)| b),
    }]))
    .into_response()
}

async fn socket(ws: WebSocketUpgrade, Query(q): Query<HashMap<String, String>>, State(svc): State<Service>) -> Response {
    ws.on_upgrade(move |socket| feed(socket, q, svc))
}

async fn feed(mut socket: WebSocket, q: HashMap<String, String>, svc: Service) {
    while let Some(Ok(msg)) = socket.recv().await {
        let Message::Text(text) = msg else { continue; };
        let frame: Value = serde_json::from_str(text.as_str()).unwrap_or(Value::Null);
        let topic = frame["topic"].as_str().unwrap_or_default().to_string();
        match frame["event"].as_str() {
            Some("phx_join") => {
                let table = frame["payload"]["config"]["postgres_changes"][0]["table"].clone();
                if table == "secrets" {
                    let refusal = json!({"topic": topic, "event": "phx_reply", "ref": frame["ref"], "payload": {"status": "error", "response": {"reason": "unauthorized"}}});
                    let _ = socket.send(Message::Text(refusal.to_string().into())).await;
                    break;
                }
                let reply = json!({"topic": topic, "event": "phx_reply", "ref": frame["ref"], "payload": {"status": "ok", "response": {}}});
                let push = json!({
                    "topic": topic,
                    "event": "postgres_changes",
                    "ref": null,
                    "payload": {"data": {
                        "type": "INSERT",
                        "table": table,
                        "record": {"id": 7, "apikey": q.get("apikey")},
                        "old_record": null
                    }}
                });
                if socket.send(Message::Text(reply.to_string().into())).await.is_err() { break; }
                if socket.send(Message::Text(push.to_string().into())).await.is_err() { break; }
            }
            Some("phx_leave") => {
                svc.leaves.fetch_add(1, Ordering::SeqCst);
                break;
            }
            _ => {}
        }
    }
}

async fn spawn_service() -> (String, Service) {
    let svc = Service::default();
    let app = Router::new()
        .route("/rest/v1/", get(root))
        .route("/rest/v1/{table}", any(rows))
        .route("/realtime/v1/websocket", get(socket))
        .with_state(svc.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{}", addr), svc)
}

#[tokio::test]
async fn select_sends_filters_and_profile_headers() {
    let (url, _) = spawn_service().await;
    let client = RestRealtimeClient::new(&url, "anon", &json!({"schema": "app"})).unwrap();
    client.connect().await.unwrap();

    let filters = [Filter::eq("owner", json!("ann")), Filter::new("id", FilterOp::In, json!([1, 2]))];
    let out = client.select("keys", &filters).await.unwrap();
    assert_eq!(out.len(), 1);
    let echo = &out[0];
    assert_eq!(echo["method"], "GET");
    assert_eq!(echo["query"]["owner"], "eq.ann");
    assert_eq!(echo["query"]["id"], "in.(1,2)");
    assert_eq!(echo["query"]["select"], "*");
    assert_eq!(echo["acceptProfile"], "app");
    assert_eq!(echo["authorization"], "Bearer anon");
    assert_eq!(echo["prefer"], Value::Null);
}

#[tokio::test]
async fn writes_ask_for_representation() {
    let (url, _) = spawn_service().await;
    let client = RestRealtimeClient::new(&url, "anon", &Value::Null).unwrap();

    let out = client.insert("keys", json!({"name": "k1"})).await.unwrap();
    assert_eq!(out[0]["method"], "POST");
    assert_eq!(out[0]["body"], json!({"name": "k1"}));
    assert_eq!(out[0]["prefer"], "return=representation");
    assert_eq!(out[0]["contentProfile"], "public");

    let out = client.update("keys", json!({"active": false}), &[Filter::eq("id", json!(3))]).await.unwrap();
    assert_eq!(out[0]["method"], "PATCH");
    assert_eq!(out[0]["query"]["id"], "eq.3");

    let out = client.delete("keys", &[Filter::new("name", FilterOp::Like, json!("tmp%"))]).await.unwrap();
    assert_eq!(out[0]["method"], "DELETE");
    assert_eq!(out[0]["query"]["name"], "like.tmp*");
}

#[tokio::test]
async fn service_errors_surface_as_api_errors() {
    let (url, _) = spawn_service().await;
    let client = RestRealtimeClient::new(&url, "anon", &Value::Null).unwrap();
    match client.select("secrets", &[]).await {
        Err(ClientError::Realtime(e)) => {
            assert_eq!(e.status, Some(403));
            assert_eq!(e.message, "permission denied for table secrets");
        }
        other => panic!("expected realtime error, got {:?}", other.map(|r| r.len())),
    }
}

#[tokio::test]
async fn bootstrap_with_rejected_key_fails_once() {
    let (url, _) = spawn_service().await;
    let boot = RealtimeBootstrap::new(Arc::new(RestConnector));
    boot.configure(RealtimeSource::from(RealtimeSettings {
        url: Some(url.clone()),
        key: Some("wrong".into()),
        options: json!({}),
    }));
    let handle = boot.wait_settled().await;
    assert!(matches!(handle, ClientHandle::Failed(_)), "expected failure, got {:?}", handle);
    let e = handle.error().unwrap();
    assert_eq!(e.status, Some(401));
    assert_eq!(e.message, "Invalid API key");
    assert_eq!(boot.attempts(), 1);

    boot.configure(RealtimeSource::from(RealtimeSettings { url: Some(url), key: Some("anon".into()), options: json!({}) }));
    assert!(boot.wait_settled().await.is_ready());
    assert_eq!(boot.attempts(), 2);
}

#[tokio::test]
async fn subscription_streams_changes_and_leaves_on_close() {
    let (url, svc) = spawn_service().await;
    let client: Arc<dyn RealtimeClient> = Arc::new(RestRealtimeClient::new(&url, "anon", &Value::Null).unwrap());

    let mut sub = Subscription::open(client, "keys").await.unwrap();
    let ev = tokio::time::timeout(Duration::from_secs(5), sub.recv()).await.unwrap().unwrap();
    assert_eq!(ev.table, "keys");
    assert_eq!(ev.record, json!({"id": 7, "apikey": "anon"}));

    sub.close().await.unwrap();
    for _ in 0..50 {
        if svc.leaves.load(Ordering::SeqCst) == 1 { break; }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(svc.leaves.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rejected_join_fails_the_subscription() {
    let (url, _) = spawn_service().await;
    let client: Arc<dyn RealtimeClient> = Arc::new(RestRealtimeClient::new(&url, "anon", &Value::Null).unwrap());

    match Subscription::open(client, "secrets").await {
        Err(ClientError::Realtime(e)) => {
            assert_eq!(e.message, "unauthorized");
            assert_eq!(e.payload, Some(json!({"reason": "unauthorized"})));
        }
        Err(other) => panic!("expected realtime error, got {}", other),
        Ok(_) => panic!("subscription opened despite the rejected join"),
    }
}
