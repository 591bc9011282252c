//! Transport capability for talking to the backend daemon.
//!
//! Two interchangeable implementations exist behind the [`Transport`] trait:
//! a local one speaking HTTP/1.1 over the daemon's Unix domain socket, and a
//! remote one issuing authenticated HTTP(S) requests. Consumers select one at
//! configuration time and never branch on the mode afterwards.

mod local;
mod remote;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use ensign_types::{SessionError, TransportMode};

pub use local::LocalTransport;
pub use remote::RemoteTransport;

/// Connect timeout for the local socket.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
/// Default per-call timeout for routine reads.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);
/// OAuth login initiation may block on upstream provider round-trips.
pub const OAUTH_LOGIN_TIMEOUT: Duration = Duration::from_secs(10);
/// Agent prompt execution is the slowest sanctioned operation.
pub const AGENT_PROMPT_TIMEOUT: Duration = Duration::from_secs(60);
/// Device-flow polls can be held open server-side.
pub const DEVICE_POLL_TIMEOUT: Duration = Duration::from_secs(120);

/// HTTP method subset used against the backend API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A response where non-2xx statuses are data, not errors.
///
/// Used only by the device-flow poll, which communicates protocol state via
/// 202/429/410/403 bodies that must still be read.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Request/response capability against the backend API.
///
/// `get` and `send` treat any non-2xx response as [`SessionError::Server`];
/// `send_allowing_non_success` only fails on connector-level trouble.
#[async_trait]
pub trait Transport: Send + Sync {
    /// GET a path with the default routine timeout.
    async fn get(&self, path: &str) -> Result<Vec<u8>, SessionError>;

    /// Issue a request with an explicit per-call timeout. Non-2xx fails.
    async fn send(
        &self,
        path: &str,
        method: Method,
        body: Option<serde_json::Value>,
        timeout: Duration,
    ) -> Result<Vec<u8>, SessionError>;

    /// Issue a request where only connector-level failure is fatal; the
    /// HTTP status and body are returned for the caller to classify.
    async fn send_allowing_non_success(
        &self,
        path: &str,
        method: Method,
        body: Option<serde_json::Value>,
        timeout: Duration,
    ) -> Result<HttpReply, SessionError>;

    /// The mode this transport was configured with.
    fn mode(&self) -> TransportMode;

    /// Whether mutating operations are refused by this transport.
    fn is_read_only(&self) -> bool {
        self.mode().is_read_only()
    }
}

/// Extract a displayable message from an HTTP error body: the backend sends
/// either `{"error": "..."}`, `{"message": "..."}`, or plain text.
pub(crate) fn error_message_from_body(body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        for key in ["error", "message"] {
            if let Some(text) = value.get(key).and_then(|v| v.as_str()) {
                return text.to_string();
            }
        }
    }
    String::from_utf8_lossy(body).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_prefers_structured_fields() {
        assert_eq!(error_message_from_body(br#"{"error":"no such host"}"#), "no such host");
        assert_eq!(error_message_from_body(br#"{"message":"try later"}"#), "try later");
        assert_eq!(error_message_from_body(b"internal error\n"), "internal error");
    }

    #[test]
    fn reply_success_range() {
        assert!(HttpReply { status: 200, body: vec![] }.is_success());
        assert!(HttpReply { status: 202, body: vec![] }.is_success());
        assert!(!HttpReply { status: 410, body: vec![] }.is_success());
    }
}
