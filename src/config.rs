//! Client configuration: defaults, environment overrides and builder-style setters.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;
use serde_json::Value;
use tracing::warn;

use crate::error::{ClientError, ClientResult};
use crate::token::TokenStorage;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_TOKEN_KEY: &str = "sexyguard_token";
pub const DEFAULT_COOKIE_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Credentials for the external realtime database service.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RealtimeSettings {
    pub url: Option<String>,
    pub key: Option<String>,
    /// Passthrough options handed to the service client.
    pub options: Value,
}

impl RealtimeSettings {
    pub fn is_complete(&self) -> bool {
        self.url.as_deref().is_some_and(|u| !u.is_empty()) && self.key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub token_key: String,
    pub storage: TokenStorage,
    /// Directory for `TokenStorage::Local`; `None` means the medium is unavailable.
    pub storage_dir: Option<PathBuf>,
    pub cookie_path: String,
    pub cookie_max_age: Option<Duration>,
    pub user_agent: String,
    /// Handed to the transport; this layer enforces no timeout of its own.
    pub request_timeout: Option<Duration>,
    pub realtime: RealtimeSettings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token_key: DEFAULT_TOKEN_KEY.to_string(),
            storage: TokenStorage::Local,
            storage_dir: default_storage_dir(),
            cookie_path: "/".to_string(),
            cookie_max_age: Some(DEFAULT_COOKIE_MAX_AGE),
            user_agent: format!("sexyguard/{}", env!("CARGO_PKG_VERSION")),
            request_timeout: None,
            realtime: RealtimeSettings::default(),
        }
    }
}

/// `$HOME/.sexyguard` (or `%USERPROFILE%`), if a home directory is known.
pub fn default_storage_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .ok()
        .filter(|h| !h.is_empty())
        .map(|h| PathBuf::from(h).join(".sexyguard"))
}

/// Absolute http(s) base address.
pub fn parse_base_url(raw: &str) -> ClientResult<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| ClientError::config(format!("invalid base URL '{}': {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ClientError::config(format!("unsupported scheme '{}' in base URL '{}'", other, raw))),
    }
}

impl ClientConfig {
    /// Defaults overridden by `SEXYGUARD_*` environment variables.
    pub fn from_env() -> Self { Self::from_lookup(|k| std::env::var(k).ok()) }

    /// Same as `from_env` with an explicit variable lookup.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(get: F) -> Self {
        let mut cfg = ClientConfig::default();
        let var = |k: &str| get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = var("SEXYGUARD_API_URL") { cfg.base_url = v; }
        if let Some(v) = var("SEXYGUARD_TOKEN_KEY") { cfg.token_key = v; }
        if let Some(v) = var("SEXYGUARD_TOKEN_STORAGE") {
            match v.parse::<TokenStorage>() {
                Ok(s) => cfg.storage = s,
                Err(e) => warn!(target: "sexyguard::config", "{}; using {}", e, cfg.storage),
            }
        }
        if let Some(v) = var("SEXYGUARD_STORAGE_DIR") { cfg.storage_dir = Some(PathBuf::from(v)); }
        if let Some(v) = var("SEXYGUARD_COOKIE_PATH") { cfg.cookie_path = v; }
        if let Some(v) = var("SEXYGUARD_COOKIE_MAX_AGE") {
            match v.parse::<u64>() {
                Ok(secs) => cfg.cookie_max_age = Some(Duration::from_secs(secs)),
                Err(_) => warn!(target: "sexyguard::config", "ignoring SEXYGUARD_COOKIE_MAX_AGE='{}'", v),
            }
        }
        if let Some(v) = var("SEXYGUARD_REQUEST_TIMEOUT_MS") {
            match v.parse::<u64>() {
                Ok(ms) => cfg.request_timeout = Some(Duration::from_millis(ms)),
                Err(_) => warn!(target: "sexyguard::config", "ignoring SEXYGUARD_REQUEST_TIMEOUT_MS='{}'", v),
            }
        }
        cfg.realtime.url = var("SEXYGUARD_REALTIME_URL");
        cfg.realtime.key = var("SEXYGUARD_REALTIME_KEY");
        if let Some(v) = var("SEXYGUARD_REALTIME_OPTIONS") {
            match serde_json::from_str::<Value>(&v) {
                Ok(o @ Value::Object(_)) => cfg.realtime.options = o,
                _ => warn!(target: "sexyguard::config", "SEXYGUARD_REALTIME_OPTIONS is not a JSON object; ignored"),
            }
        }
        cfg
    }

    pub fn with_base_url<S: Into<String>>(mut self, url: S) -> Self { self.base_url = url.into(); self }
    pub fn with_token_key<S: Into<String>>(mut self, key: S) -> Self { self.token_key = key.into(); self }
    pub fn with_storage(mut self, storage: TokenStorage) -> Self { self.storage = storage; self }
    pub fn with_storage_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self { self.storage_dir = Some(dir.into()); self }
    pub fn with_cookie_path<S: Into<String>>(mut self, path: S) -> Self { self.cookie_path = path.into(); self }
    pub fn with_cookie_max_age(mut self, max_age: Option<Duration>) -> Self { self.cookie_max_age = max_age; self }
    pub fn with_request_timeout(mut self, t: Option<Duration>) -> Self { self.request_timeout = t; self }
    pub fn with_realtime(mut self, realtime: RealtimeSettings) -> Self { self.realtime = realtime; self }
}
