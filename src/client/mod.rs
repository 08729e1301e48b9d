//!
//! REST client
//! -----------
//! `ApiClient` talks to a single base address. It attaches the bearer token from the injected
//! `TokenStore` on authenticated calls, reports non-2xx replies as `ApiOutcome::Failure` values
//! and only returns `Err` when a request never completed. `request_cached` memoizes results in a
//! small TTL cache.

mod cache;
mod outcome;
pub mod endpoints;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::Jar;
use reqwest::{Method, Url};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::{parse_base_url, ClientConfig};
use crate::error::{ApiError, ClientResult};
use crate::token::TokenStore;

pub use cache::TtlCache;
pub use outcome::ApiOutcome;
pub use endpoints::{Credentials, RegisterRequest, ChangePasswordRequest, MemoryRequest, ActivateKeyRequest};

/// Per-call options for `ApiClient::request`.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub body: Option<Value>,
    pub requires_auth: bool,
}

impl Default for RequestOptions {
    fn default() -> Self { Self { method: Method::GET, body: None, requires_auth: false } }
}

impl RequestOptions {
    pub fn get() -> Self { Self::default() }

    pub fn post() -> Self { Self { method: Method::POST, ..Self::default() } }

    pub fn method(method: Method) -> Self { Self { method, ..Self::default() } }

    pub fn authed(mut self) -> Self { self.requires_auth = true; self }

    pub fn body(mut self, body: Value) -> Self { self.body = Some(body); self }

    /// Serialize `body` as the JSON payload.
    pub fn json<T: Serialize>(mut self, body: &T) -> ClientResult<Self> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }
}

#[derive(Clone)]
pub struct ApiClient {
    base: Url,
    http: reqwest::Client,
    tokens: Arc<dyn TokenStore>,
    cache: Arc<TtlCache>,
}

impl ApiClient {
    pub fn new(base_url: &str, tokens: Arc<dyn TokenStore>) -> ClientResult<Self> {
        let http = reqwest::Client::builder().build()?;
        Self::with_http(base_url, tokens, http)
    }

    /// Use a preconfigured `reqwest::Client` (proxies, timeouts, cookie jar).
    pub fn with_http(base_url: &str, tokens: Arc<dyn TokenStore>, http: reqwest::Client) -> ClientResult<Self> {
        let base = parse_base_url(base_url)?;
        Ok(Self { base, http, tokens, cache: Arc::new(TtlCache::new()) })
    }

    /// Build from configuration. When a cookie jar is supplied it is installed into the HTTP
    /// client so cookies written by the token store travel with requests.
    pub fn from_config(cfg: &ClientConfig, tokens: Arc<dyn TokenStore>, jar: Option<Arc<Jar>>) -> ClientResult<Self> {
        let mut builder = reqwest::Client::builder().user_agent(cfg.user_agent.clone());
        if let Some(j) = jar { builder = builder.cookie_provider(j); }
        if let Some(t) = cfg.request_timeout { builder = builder.timeout(t); }
        Self::with_http(&cfg.base_url, tokens, builder.build()?)
    }

    pub fn base_url(&self) -> &Url { &self.base }

    pub fn tokens(&self) -> &Arc<dyn TokenStore> { &self.tokens }

    pub fn token(&self) -> Option<String> { self.tokens.get() }

    pub fn set_token(&self, token: Option<&str>) { self.tokens.set(token) }

    pub fn cache(&self) -> &TtlCache { &self.cache }

    /// Full URL for `path`: the base address with `path` appended verbatim.
    pub fn url_for(&self, path: &str) -> String {
        let base = self.base.as_str().trim_end_matches('/');
        if path.is_empty() { return base.to_string(); }
        if path.starts_with('/') { format!("{}{}", base, path) } else { format!("{}/{}", base, path) }
    }

    pub async fn request(&self, path: &str, opts: RequestOptions) -> ClientResult<ApiOutcome> {
        let url = self.url_for(path);
        let mut req = self.http.request(opts.method.clone(), &url);
        if let Some(body) = &opts.body {
            req = req.json(body);
        }
        let mut bearer = false;
        if opts.requires_auth {
            // no token: send anyway and let the server answer
            if let Some(token) = self.tokens.get() {
                req = req.bearer_auth(token);
                bearer = true;
            }
        }

        let resp = req.send().await.map_err(|e| {
            warn!(target: "sexyguard::client", "{} {} did not complete: {}", opts.method, path, e);
            e
        })?;
        let status = resp.status();
        let body: Value = match resp.bytes().await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|_| json!({})),
            Err(_) => json!({}),
        };
        debug!(target: "sexyguard::client", "{} {} -> {} (bearer={})", opts.method, path, status.as_u16(), bearer);

        if status.is_success() {
            Ok(ApiOutcome::Success(body))
        } else {
            Ok(ApiOutcome::Failure(ApiError::from_response(status.as_u16(), &body)))
        }
    }

    /// Return the live cached value under `key`, or run `producer`, cache its result for `ttl`
    /// (zero means no expiry) and return it.
    ///
    /// Concurrent misses on the same key each run their producer; the last write wins.
    /// A producer error is returned as-is and nothing is cached.
    pub async fn request_cached<T, F, Fut>(&self, key: &str, producer: F, ttl: Duration) -> ClientResult<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = ClientResult<T>>,
    {
        if let Some(hit) = self.cache.get::<T>(key) {
            debug!(target: "sexyguard::client", "cache hit key={}", key);
            return Ok(hit);
        }
        debug!(target: "sexyguard::client", "cache miss key={}", key);
        let value = producer().await?;
        self.cache.put(key, value.clone(), ttl);
        Ok(value)
    }

    pub fn invalidate_cache(&self, key: &str) -> bool { self.cache.invalidate(key) }

    pub fn clear_cache(&self) { self.cache.clear() }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient").field("base", &self.base.as_str()).field("cache", &self.cache).finish()
    }
}
