use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ApiError;

/// Result of a call that reached the server: either the parsed body or a structured failure.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiOutcome<T = Value> {
    Success(T),
    Failure(ApiError),
}

impl<T> ApiOutcome<T> {
    pub fn is_success(&self) -> bool { matches!(self, ApiOutcome::Success(_)) }

    pub fn success(&self) -> Option<&T> {
        match self { ApiOutcome::Success(v) => Some(v), ApiOutcome::Failure(_) => None }
    }

    pub fn failure(&self) -> Option<&ApiError> {
        match self { ApiOutcome::Failure(e) => Some(e), ApiOutcome::Success(_) => None }
    }

    pub fn into_result(self) -> Result<T, ApiError> {
        match self { ApiOutcome::Success(v) => Ok(v), ApiOutcome::Failure(e) => Err(e) }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> ApiOutcome<U> {
        match self { ApiOutcome::Success(v) => ApiOutcome::Success(f(v)), ApiOutcome::Failure(e) => ApiOutcome::Failure(e) }
    }
}

impl ApiOutcome<Value> {
    /// Decode a successful body into `T`; a body that does not fit becomes a failure.
    pub fn decode<T: DeserializeOwned>(self) -> ApiOutcome<T> {
        match self {
            ApiOutcome::Success(v) => match serde_json::from_value::<T>(v.clone()) {
                Ok(t) => ApiOutcome::Success(t),
                Err(e) => ApiOutcome::Failure(ApiError::new(format!("unexpected response shape: {}", e)).with_payload(v)),
            },
            ApiOutcome::Failure(e) => ApiOutcome::Failure(e),
        }
    }

    /// JSON rendering: the body itself, or `{"error": ..., "status": ...}`.
    pub fn to_json(&self) -> Value {
        match self {
            ApiOutcome::Success(v) => v.clone(),
            ApiOutcome::Failure(e) => serde_json::to_value(e).unwrap_or(Value::Null),
        }
    }
}
