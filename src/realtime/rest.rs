use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Method, Url};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::socket::{self, SocketSubscription};
use super::{ChangeEvent, Filter, RealtimeClient, RealtimeConnector, SubscriptionId};
use crate::config::parse_base_url;
use crate::error::{ApiError, ClientError, ClientResult};

const DEFAULT_SCHEMA: &str = "public";

/// HTTP + WebSocket client for a PostgREST-style realtime database service.
///
/// Options: `schema` (default `public`) and `headers`, an object of extra header values sent
/// with every REST call.
pub struct RestRealtimeClient {
    base: Url,
    key: String,
    schema: String,
    http: reqwest::Client,
    subscriptions: Mutex<HashMap<SubscriptionId, SocketSubscription>>,
}

impl RestRealtimeClient {
    pub fn new(url: &str, key: &str, options: &Value) -> ClientResult<Self> {
        let base = parse_base_url(url)?;
        let schema = options.get("schema").and_then(|s| s.as_str()).unwrap_or(DEFAULT_SCHEMA).to_string();

        let mut headers = HeaderMap::new();
        let bad_key = |_| ClientError::config("service key is not a valid header value");
        headers.insert("apikey", HeaderValue::from_str(key).map_err(bad_key)?);
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", key)).map_err(bad_key)?);
        if let Some(extra) = options.get("headers").and_then(|h| h.as_object()) {
            for (name, value) in extra {
                let Some(text) = value.as_str() else { continue; };
                let name = HeaderName::from_bytes(name.as_bytes())
                    .map_err(|_| ClientError::config(format!("invalid header name '{}'", name)))?;
                let value = HeaderValue::from_str(text)
                    .map_err(|_| ClientError::config(format!("invalid value for header '{}'", name.as_str())))?;
                headers.insert(name, value);
            }
        }
        let http = reqwest::Client::builder().default_headers(headers).build()?;
        Ok(Self { base, key: key.to_string(), schema, http, subscriptions: Mutex::new(HashMap::new()) })
    }

    pub fn schema(&self) -> &str { &self.schema }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base.as_str().trim_end_matches('/'), urlencoding::encode(table))
    }

    async fn call(&self, method: Method, table: &str, filters: &[Filter], body: Option<Value>) -> ClientResult<Vec<Value>> {
        let mut pairs: Vec<(String, String)> = filters.iter().map(Filter::to_query_pair).collect();
        let write = method != Method::GET;
        if !write { pairs.push(("select".into(), "*".into())); }

        let mut req = self
            .http
            .request(method.clone(), self.rest_url(table))
            .query(&pairs)
            .header("Accept-Profile", &self.schema);
        if write {
            req = req.header("Content-Profile", &self.schema).header("Prefer", "return=representation");
        }
        if let Some(b) = &body { req = req.json(b); }

        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        let parsed: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
        debug!(target: "sexyguard::realtime", "{} {} filters={} -> {}", method, table, filters.len(), status.as_u16());
        if !status.is_success() {
            let err = ApiError::from(parsed).with_status(status.as_u16());
            return Err(ClientError::Realtime(err));
        }
        Ok(match parsed {
            Value::Array(rows) => rows,
            Value::Null => Vec::new(),
            other => vec![other],
        })
    }
}

#[async_trait]
impl RealtimeClient for RestRealtimeClient {
    async fn connect(&self) -> ClientResult<()> {
        let url = format!("{}/rest/v1/", self.base.as_str().trim_end_matches('/'));
        let resp = self.http.get(url).send().await?;
        let status = resp.status().as_u16();
        if status == 401 || status == 403 {
            let body: Value = resp.json().await.unwrap_or(Value::Null);
            return Err(ClientError::Realtime(ApiError::from(body).with_status(status)));
        }
        info!(target: "sexyguard::realtime", "realtime service reachable at {} (HTTP {})", self.base, status);
        Ok(())
    }

    async fn select(&self, table: &str, filters: &[Filter]) -> ClientResult<Vec<Value>> {
        self.call(Method::GET, table, filters, None).await
    }

    async fn insert(&self, table: &str, rows: Value) -> ClientResult<Vec<Value>> {
        self.call(Method::POST, table, &[], Some(rows)).await
    }

    async fn update(&self, table: &str, patch: Value, filters: &[Filter]) -> ClientResult<Vec<Value>> {
        self.call(Method::PATCH, table, filters, Some(patch)).await
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> ClientResult<Vec<Value>> {
        self.call(Method::DELETE, table, filters, None).await
    }

    async fn subscribe(&self, table: &str, sink: mpsc::UnboundedSender<ChangeEvent>) -> ClientResult<SubscriptionId> {
        let url = socket::websocket_url(&self.base, &self.key)?;
        let topic = format!("realtime:{}:{}", self.schema, table);
        let join = json!({
            "config": { "postgres_changes": [ { "event": "*", "schema": self.schema, "table": table } ] },
            "access_token": self.key,
        });
        let sub = socket::open(url, topic, join, table.to_string(), sink).await?;
        let id = SubscriptionId::generate();
        self.subscriptions.lock().insert(id.clone(), sub);
        info!(target: "sexyguard::realtime", "subscribed to {} id={}", table, id);
        Ok(id)
    }

    async fn unsubscribe(&self, id: &SubscriptionId) -> ClientResult<()> {
        let sub = self.subscriptions.lock().remove(id);
        if let Some(sub) = sub {
            sub.close().await;
            info!(target: "sexyguard::realtime", "unsubscribed id={}", id);
        }
        Ok(())
    }
}

/// Connector building `RestRealtimeClient`s and probing them before handing them out.
#[derive(Debug, Default, Clone)]
pub struct RestConnector;

#[async_trait]
impl RealtimeConnector for RestConnector {
    async fn connect(&self, url: &str, key: &str, options: &Value) -> ClientResult<Arc<dyn RealtimeClient>> {
        let client = RestRealtimeClient::new(url, key, options)?;
        client.connect().await?;
        Ok(Arc::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::FilterOp;

    #[test]
    fn builds_table_urls_and_reads_schema_option() {
        let c = RestRealtimeClient::new("https://rt.example.test/", "anon", &json!({"schema": "app"})).unwrap();
        assert_eq!(c.schema(), "app");
        assert_eq!(c.rest_url("api keys"), "https://rt.example.test/rest/v1/api%20keys");
        let d = RestRealtimeClient::new("https://rt.example.test", "anon", &Value::Null).unwrap();
        assert_eq!(d.schema(), DEFAULT_SCHEMA);
    }

    #[test]
    fn rejects_bad_credentials_and_headers() {
        assert!(RestRealtimeClient::new("not a url", "anon", &Value::Null).is_err());
        assert!(RestRealtimeClient::new("https://rt.example.test", "bad\nkey", &Value::Null).is_err());
        assert!(RestRealtimeClient::new("https://rt.example.test", "anon", &json!({"headers": {"bad header": "x"}})).is_err());
    }

    #[test]
    fn filters_become_query_pairs() {
        let f = [Filter::eq("owner", json!("ann")), Filter::new("id", FilterOp::In, json!([1, 2]))];
        let pairs: Vec<(String, String)> = f.iter().map(Filter::to_query_pair).collect();
        assert_eq!(pairs, vec![("owner".into(), "eq.ann".into()), ("id".into(), "in.(1,2)".into())]);
    }
}
