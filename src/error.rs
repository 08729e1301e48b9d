//! Unified error model for the client.
//! Two tiers: `ApiError` is a completed-but-unsuccessful call and travels as an ordinary value,
//! `ClientError` is a call that could not complete and travels through `Err`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter};

pub const UNKNOWN_ERROR: &str = "Unknown error";
pub const REQUEST_FAILED: &str = "Request failed";

/// Canonical error value: a message, an optional HTTP status and the raw payload it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(rename = "error")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip)]
    pub payload: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UserInput,
    Auth,
    NotFound,
    Conflict,
    Unprocessable,
    RateLimited,
    Server,
    Unknown,
}

impl ApiError {
    pub fn new<S: Into<String>>(message: S) -> Self { Self { message: message.into(), status: None, payload: None } }
    pub fn unknown() -> Self { Self::new(UNKNOWN_ERROR) }
    pub fn with_status(mut self, status: u16) -> Self { self.status = Some(status); self }
    pub fn with_payload(mut self, payload: Value) -> Self { self.payload = Some(payload); self }

    /// Build the failure value for a non-2xx response from its status and parsed body.
    pub fn from_response(status: u16, body: &Value) -> Self {
        let message = body
            .get("error")
            .and_then(|e| e.as_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(REQUEST_FAILED);
        Self { message: message.to_string(), status: Some(status), payload: Some(body.clone()) }
    }

    pub fn message(&self) -> &str { &self.message }

    /// Classify by HTTP status.
    pub fn kind(&self) -> ErrorKind {
        match self.status {
            Some(400) => ErrorKind::UserInput,
            Some(401) | Some(403) => ErrorKind::Auth,
            Some(404) => ErrorKind::NotFound,
            Some(409) => ErrorKind::Conflict,
            Some(422) => ErrorKind::Unprocessable,
            Some(429) => ErrorKind::RateLimited,
            Some(s) if (500..600).contains(&s) => ErrorKind::Server,
            _ => ErrorKind::Unknown,
        }
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(s) => write!(f, "{} (HTTP {})", self.message, s),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<&str> for ApiError {
    fn from(s: &str) -> Self { ApiError::new(s) }
}

impl From<String> for ApiError {
    fn from(s: String) -> Self { ApiError::new(s) }
}

impl From<Option<Value>> for ApiError {
    fn from(v: Option<Value>) -> Self { v.map(ApiError::from).unwrap_or_else(ApiError::unknown) }
}

impl From<Value> for ApiError {
    fn from(v: Value) -> Self {
        let text = |field: &str| v.get(field).and_then(|x| x.as_str()).map(str::to_string);
        let message = match &v {
            Value::Null => return ApiError::unknown(),
            Value::String(s) => return ApiError::new(s.clone()).with_payload(v.clone()),
            Value::Object(_) => text("error")
                .or_else(|| v.get("error").and_then(|e| e.get("message")).and_then(|m| m.as_str()).map(str::to_string))
                .or_else(|| text("message")),
            _ => None,
        };
        let status = v.get("status").and_then(|s| match s {
            Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
            Value::String(s) => s.parse::<u16>().ok(),
            _ => None,
        });
        ApiError {
            message: message.unwrap_or_else(|| UNKNOWN_ERROR.to_string()),
            status,
            payload: Some(v),
        }
    }
}

impl From<&ClientError> for ApiError {
    fn from(e: &ClientError) -> Self {
        match e {
            ClientError::Realtime(inner) => inner.clone(),
            ClientError::Transport(t) => ApiError { message: e.to_string(), status: t.status().map(|s| s.as_u16()), payload: None },
            other => ApiError::new(other.to_string()),
        }
    }
}

/// Collapse any supported error shape into the canonical `ApiError`.
/// An `ApiError` passes through untouched.
pub fn normalize_error<E: Into<ApiError>>(raw: E) -> ApiError { raw.into() }

/// Failures that prevent a call from completing at all.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("could not encode request: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("realtime service error: {0}")]
    Realtime(ApiError),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    pub fn config<S: Into<String>>(msg: S) -> Self { ClientError::Config(msg.into()) }
    pub fn realtime<E: Into<ApiError>>(raw: E) -> Self { ClientError::Realtime(raw.into()) }
}

pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_normalizes_to_generic_message() {
        let e = normalize_error(Value::Null);
        assert_eq!(e.message, UNKNOWN_ERROR);
        assert_eq!(e.status, None);
        assert_eq!(normalize_error(None::<Value>).message, UNKNOWN_ERROR);
    }

    #[test]
    fn string_becomes_message() {
        assert_eq!(normalize_error("boom").message, "boom");
        assert_eq!(normalize_error(json!("boom")).message, "boom");
    }

    #[test]
    fn error_field_and_message_field() {
        let e = normalize_error(json!({"error": "x"}));
        assert_eq!(e.message, "x");
        assert_eq!(e.payload, Some(json!({"error": "x"})));

        let e = normalize_error(json!({"message": "y", "status": 404}));
        assert_eq!(e.message, "y");
        assert_eq!(e.status, Some(404));
        assert_eq!(e.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn nested_error_object_uses_its_message() {
        let e = normalize_error(json!({"error": {"message": "nested", "code": "PGRST116"}, "status": "406"}));
        assert_eq!(e.message, "nested");
        assert_eq!(e.status, Some(406));
    }

    #[test]
    fn already_normalized_is_unchanged() {
        let original = ApiError::new("kept").with_status(409).with_payload(json!({"a": 1}));
        let out = normalize_error(original.clone());
        assert_eq!(out, original);
        assert_eq!(out.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn unrecognized_shapes_are_unknown() {
        assert_eq!(normalize_error(json!(42)).message, UNKNOWN_ERROR);
        assert_eq!(normalize_error(json!({"detail": "nope"})).message, UNKNOWN_ERROR);
        assert_eq!(normalize_error(json!([1, 2])).message, UNKNOWN_ERROR);
    }

    #[test]
    fn response_failure_defaults_message() {
        let e = ApiError::from_response(500, &json!({}));
        assert_eq!(e.message, REQUEST_FAILED);
        assert_eq!(e.status, Some(500));
        assert_eq!(e.kind(), ErrorKind::Server);

        let e = ApiError::from_response(401, &json!({"error": "Invalid token"}));
        assert_eq!(e.message, "Invalid token");
        assert_eq!(e.kind(), ErrorKind::Auth);
    }

    #[test]
    fn serializes_to_error_status_shape() {
        let e = ApiError::from_response(403, &json!({"error": "Forbidden", "extra": true}));
        assert_eq!(serde_json::to_value(&e).unwrap(), json!({"error": "Forbidden", "status": 403}));
    }

    #[test]
    fn realtime_client_error_unwraps_inner() {
        let ce = ClientError::realtime(json!({"message": "row level security", "status": 401}));
        let e = normalize_error(&ce);
        assert_eq!(e.message, "row level security");
        assert_eq!(e.status, Some(401));
        assert_eq!(normalize_error(&ClientError::config("bad url")).message, "invalid configuration: bad url");
    }
}
