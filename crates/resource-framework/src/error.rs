//! # SDK Errors
//!
//! Every failure surfaced by a generated resource is an [`SdkError`]. The three
//! runtime categories callers care about are told apart structurally:
//!
//! | Failure | `status()` | `headers()` |
//! |---------|------------|-------------|
//! | Local stub (current-user call while logged out) | `Some(401)` | `None` |
//! | Server HTTP error | `Some(status)` | `Some(..)` |
//! | Transport failure | `None` | `None` |
//!
//! Errors are `Clone` because a single settlement feeds both the awaited
//! future and the registered failure callback.

use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde_json::Value;
use std::fmt;

/// A non-2xx outcome, either returned by the server or synthesized locally.
#[derive(Debug, Clone)]
pub struct HttpFailure {
    pub status: u16,
    pub message: String,
    /// Response headers. `None` marks a locally synthesized stub.
    pub headers: Option<HeaderMap>,
    pub body: Value,
}

impl HttpFailure {
    /// Builds a failure from a server response, taking the message from the
    /// `error.message` field of the body when the server provided one.
    pub fn from_response(status: u16, headers: HeaderMap, body: Value) -> Self {
        let message = body
            .get("error")
            .and_then(|error| error.get("message"))
            .and_then(Value::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| canonical_reason(status));
        Self {
            status,
            message,
            headers: Some(headers),
            body,
        }
    }

    /// The 401 answered locally when a current-user call is made while logged out.
    pub fn stub_unauthorized() -> Self {
        Self {
            status: 401,
            message: canonical_reason(401),
            headers: None,
            body: serde_json::json!({ "error": { "status": 401 } }),
        }
    }

    pub fn is_stub(&self) -> bool {
        self.headers.is_none()
    }

    /// Looks up a response header. Always `None` for stubs.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .as_ref()
            .and_then(|headers| headers.get(name))
            .and_then(|value| value.to_str().ok())
    }
}

impl fmt::Display for HttpFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {}: {}", self.status, self.message)
    }
}

fn canonical_reason(status: u16) -> String {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or("Unknown status")
        .to_string()
}

/// Errors produced by the SDK runtime.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SdkError {
    #[error("{0}")]
    Http(HttpFailure),
    #[error("Transport failure: {0}")]
    Transport(String),
    #[error("Unknown model: {0}")]
    UnknownModel(String),
    #[error("Unknown action {action} on {model}")]
    UnknownAction { model: String, action: String },
    #[error("Name conflict on {model}: {name} is declared more than once")]
    NameConflict { model: String, name: String },
    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Operation abandoned before it settled")]
    Abandoned,
}

impl SdkError {
    /// HTTP status of the failure. `None` for transport and programming errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            SdkError::Http(failure) => Some(failure.status),
            _ => None,
        }
    }

    /// Response headers of a server-issued failure.
    pub fn headers(&self) -> Option<&HeaderMap> {
        match self {
            SdkError::Http(failure) => failure.headers.as_ref(),
            _ => None,
        }
    }

    /// True for the locally synthesized 401.
    pub fn is_stub(&self) -> bool {
        matches!(self, SdkError::Http(failure) if failure.is_stub())
    }
}

impl From<HttpFailure> for SdkError {
    fn from(failure: HttpFailure) -> Self {
        SdkError::Http(failure)
    }
}

impl From<reqwest::Error> for SdkError {
    fn from(e: reqwest::Error) -> Self {
        SdkError::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SdkError>;

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderValue, CONTENT_TYPE};

    #[test]
    fn test_stub_has_status_but_no_headers() {
        let err = SdkError::from(HttpFailure::stub_unauthorized());
        assert_eq!(err.status(), Some(401));
        assert!(err.headers().is_none());
        assert!(err.is_stub());
    }

    #[test]
    fn test_server_failure_keeps_headers_and_message() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let body = serde_json::json!({ "error": { "message": "Authorization Required" } });

        let failure = HttpFailure::from_response(401, headers, body);
        assert_eq!(failure.message, "Authorization Required");
        assert_eq!(failure.header("content-type"), Some("application/json"));
        assert!(!failure.is_stub());
    }

    #[test]
    fn test_message_falls_back_to_reason() {
        let failure = HttpFailure::from_response(404, HeaderMap::new(), Value::Null);
        assert_eq!(failure.message, "Not Found");
        assert_eq!(failure.to_string(), "HTTP 404: Not Found");
    }

    #[test]
    fn test_transport_failure_has_no_status() {
        let err = SdkError::Transport("connection refused".into());
        assert_eq!(err.status(), None);
        assert!(!err.is_stub());
    }
}
