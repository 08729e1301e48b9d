//! Typed wrappers for the backend REST surface.

use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use super::{ApiClient, ApiOutcome, RequestOptions};
use crate::error::ClientResult;

pub const LOGIN: &str = "/api/v1/auth/login";
pub const REGISTER: &str = "/api/v1/auth/register";
pub const PROFILE: &str = "/api/v1/profile/me";
pub const CHANGE_PASSWORD: &str = "/api/v1/profile/password";
pub const SET_MEMORY: &str = "/api/v1/profile/ram";
pub const GENERATE_KEY: &str = "/api/v1/keys/generate";
pub const ACTIVATE_KEY: &str = "/api/v1/keys/activate";
pub const PUBLIC_INFO: &str = "/api/v1/public/info";
pub const MARKET: &str = "/api/v1/public/market";
pub const VERSION: &str = "/api/v1/public/version";
pub const HEALTH: &str = "/health";

pub const PUBLIC_INFO_TTL: Duration = Duration::from_secs(60);
pub const MARKET_TTL: Duration = Duration::from_secs(30);
pub const VERSION_TTL: Duration = Duration::from_secs(5 * 60);

pub const PUBLIC_INFO_CACHE_KEY: &str = "public:info";
pub const MARKET_CACHE_KEY: &str = "public:market";
pub const VERSION_CACHE_KEY: &str = "public:version";

#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new<U: Into<String>, P: Into<String>>(username: U, password: P) -> Self {
        Self { username: username.into(), password: password.into() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Body for the memory (`ram`) setting of the profile.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryRequest {
    pub ram: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivateKeyRequest {
    pub key: String,
}

impl ApiClient {
    /// Log in and, when the reply carries a `token`, store it.
    pub async fn login(&self, creds: &Credentials) -> ClientResult<ApiOutcome> {
        let out = self.request(LOGIN, RequestOptions::post().json(creds)?).await?;
        self.adopt_token(&out);
        if out.is_success() { info!(target: "sexyguard::client", "logged in as {}", creds.username); }
        Ok(out)
    }

    /// Register and, when the reply carries a `token`, store it.
    pub async fn register(&self, req: &RegisterRequest) -> ClientResult<ApiOutcome> {
        let out = self.request(REGISTER, RequestOptions::post().json(req)?).await?;
        self.adopt_token(&out);
        Ok(out)
    }

    /// Forget the stored token. No request is made.
    pub fn logout(&self) { self.tokens.clear(); }

    pub async fn profile(&self) -> ClientResult<ApiOutcome> {
        self.request(PROFILE, RequestOptions::get().authed()).await
    }

    pub async fn change_password(&self, req: &ChangePasswordRequest) -> ClientResult<ApiOutcome> {
        self.request(CHANGE_PASSWORD, RequestOptions::post().authed().json(req)?).await
    }

    pub async fn set_memory(&self, ram: u64) -> ClientResult<ApiOutcome> {
        self.request(SET_MEMORY, RequestOptions::post().authed().json(&MemoryRequest { ram })?).await
    }

    /// `params` is forwarded untouched; `Value::Null` sends an empty object.
    pub async fn generate_key(&self, params: Value) -> ClientResult<ApiOutcome> {
        let body = if params.is_null() { json!({}) } else { params };
        self.request(GENERATE_KEY, RequestOptions::post().authed().body(body)).await
    }

    pub async fn activate_key(&self, key: &str) -> ClientResult<ApiOutcome> {
        let req = ActivateKeyRequest { key: key.to_string() };
        self.request(ACTIVATE_KEY, RequestOptions::post().authed().json(&req)?).await
    }

    pub async fn public_info(&self) -> ClientResult<ApiOutcome> {
        self.request_cached(PUBLIC_INFO_CACHE_KEY, || self.request(PUBLIC_INFO, RequestOptions::get()), PUBLIC_INFO_TTL).await
    }

    pub async fn market(&self) -> ClientResult<ApiOutcome> {
        self.request_cached(MARKET_CACHE_KEY, || self.request(MARKET, RequestOptions::get()), MARKET_TTL).await
    }

    pub async fn version(&self) -> ClientResult<ApiOutcome> {
        self.request_cached(VERSION_CACHE_KEY, || self.request(VERSION, RequestOptions::get()), VERSION_TTL).await
    }

    pub async fn health(&self) -> ClientResult<ApiOutcome> {
        self.request(HEALTH, RequestOptions::get()).await
    }

    fn adopt_token(&self, out: &ApiOutcome) {
        if let Some(token) = out.success().and_then(token_in) {
            self.tokens.set(Some(token));
        }
    }
}

/// `token` at the top level or under `data`.
fn token_in(body: &Value) -> Option<&str> {
    body.get("token")
        .or_else(|| body.get("data").and_then(|d| d.get("token")))
        .and_then(|t| t.as_str())
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_token_at_top_level_or_under_data() {
        assert_eq!(token_in(&json!({"token": "t1"})), Some("t1"));
        assert_eq!(token_in(&json!({"data": {"token": "t2"}})), Some("t2"));
        assert_eq!(token_in(&json!({"token": ""})), None);
        assert_eq!(token_in(&json!({"user": {}})), None);
    }

    #[test]
    fn request_bodies_serialize_as_expected() {
        let cp = ChangePasswordRequest { current_password: "a".into(), new_password: "b".into() };
        assert_eq!(serde_json::to_value(&cp).unwrap(), json!({"currentPassword": "a", "newPassword": "b"}));
        let reg = RegisterRequest { username: "u".into(), password: "p".into(), email: None };
        assert_eq!(serde_json::to_value(&reg).unwrap(), json!({"username": "u", "password": "p"}));
    }
}
