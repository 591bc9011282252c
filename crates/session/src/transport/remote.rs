//! Authenticated HTTP(S) to a remote daemon.
//!
//! Remote sessions are deliberately restricted to observation: anything
//! outside a narrow GET allow-list fails immediately with a read-only error,
//! before any network traffic.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header;
use tracing::debug;

use ensign_types::{SessionError, TransportMode};

use super::{DEFAULT_TIMEOUT, HttpReply, Method, Transport, error_message_from_body};

/// Overall request timeout for remote calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Resource (full body) timeout for remote calls.
const RESOURCE_TIMEOUT: Duration = Duration::from_secs(30);

/// GET paths a remote session may read. Prefix match, segment-aligned.
const READ_ALLOW_LIST: &[&str] = &[
    "/health",
    "/status",
    "/tools",
    "/mcp-servers",
    "/jobs",
    "/agents/logs",
    "/usage",
    "/slaves",
];

/// Transport for a remote daemon over bearer-authenticated HTTP.
#[derive(Debug, Clone)]
pub struct RemoteTransport {
    base_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl RemoteTransport {
    /// Build a remote transport against a base URL, attaching a bearer
    /// token header when an API key is configured.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, SessionError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        url::Url::parse(&base_url)
            .map_err(|err| SessionError::transport(format!("invalid base URL '{base_url}': {err}")))?;

        let mut default_headers = header::HeaderMap::new();
        if let Some(key) = &api_key {
            let value = header::HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|err| SessionError::transport(format!("invalid API key: {err}")))?;
            default_headers.insert(header::AUTHORIZATION, value);
        }
        default_headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(default_headers)
            .connect_timeout(REQUEST_TIMEOUT)
            .timeout(RESOURCE_TIMEOUT)
            .build()
            .map_err(|err| SessionError::transport(format!("build http client: {err}")))?;

        Ok(Self {
            base_url,
            api_key,
            http,
        })
    }

    /// Refuse anything outside the read-only allow-list before touching the
    /// network.
    fn ensure_allowed(&self, method: Method, path: &str) -> Result<(), SessionError> {
        if method == Method::Get && is_allowed_read(path) {
            return Ok(());
        }
        Err(SessionError::read_only(format!("{method} {path}")))
    }

    async fn roundtrip(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        call_timeout: Duration,
    ) -> Result<HttpReply, SessionError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(target: "ensign::transport", %method, %url, "remote request");

        let reqwest_method = match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Delete => reqwest::Method::DELETE,
        };
        let mut builder = self.http.request(reqwest_method, &url).timeout(call_timeout);
        if let Some(value) = body {
            builder = builder.json(&value);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| SessionError::transport(format!("request to {url} failed: {err}")))?;
        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| SessionError::transport(format!("read response from {url}: {err}")))?;

        Ok(HttpReply {
            status,
            body: bytes.to_vec(),
        })
    }
}

/// Segment-aligned prefix match so `/slaves/pending` is readable but a
/// hypothetical `/slavesadmin` is not.
fn is_allowed_read(path: &str) -> bool {
    READ_ALLOW_LIST.iter().any(|prefix| {
        path == *prefix
            || path
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/') || rest.starts_with('?'))
    })
}

#[async_trait]
impl Transport for RemoteTransport {
    async fn get(&self, path: &str) -> Result<Vec<u8>, SessionError> {
        self.send(path, Method::Get, None, DEFAULT_TIMEOUT).await
    }

    async fn send(
        &self,
        path: &str,
        method: Method,
        body: Option<serde_json::Value>,
        timeout: Duration,
    ) -> Result<Vec<u8>, SessionError> {
        self.ensure_allowed(method, path)?;
        let reply = self.roundtrip(method, path, body, timeout).await?;
        if reply.is_success() {
            Ok(reply.body)
        } else {
            Err(SessionError::server(
                reply.status,
                error_message_from_body(&reply.body),
            ))
        }
    }

    async fn send_allowing_non_success(
        &self,
        path: &str,
        method: Method,
        body: Option<serde_json::Value>,
        timeout: Duration,
    ) -> Result<HttpReply, SessionError> {
        self.ensure_allowed(method, path)?;
        self.roundtrip(method, path, body, timeout).await
    }

    fn mode(&self) -> TransportMode {
        TransportMode::Remote {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_base_url() {
        assert!(RemoteTransport::new("not a url", None).is_err());
        assert!(RemoteTransport::new("https://example.com:8443", None).is_ok());
    }

    #[test]
    fn allow_list_is_segment_aligned() {
        assert!(is_allowed_read("/health"));
        assert!(is_allowed_read("/status"));
        assert!(is_allowed_read("/slaves"));
        assert!(is_allowed_read("/slaves/pending"));
        assert!(is_allowed_read("/jobs/logs?limit=10"));
        assert!(!is_allowed_read("/slavesadmin"));
        assert!(!is_allowed_read("/reload"));
        assert!(!is_allowed_read("/contexts"));
    }

    #[tokio::test]
    async fn mutating_calls_fail_without_network() {
        let transport = RemoteTransport::new("https://example.invalid:8443", Some("key".into()))
            .expect("build");
        let err = transport
            .send("/reload", Method::Post, None, DEFAULT_TIMEOUT)
            .await
            .expect_err("must be denied");
        match err {
            SessionError::ReadOnly { operation } => assert_eq!(operation, "POST /reload"),
            other => panic!("unexpected error: {other}"),
        }

        // The poll path is mutating too; remote sessions observe only.
        let err = transport
            .send_allowing_non_success("/google/auth/poll", Method::Post, None, DEFAULT_TIMEOUT)
            .await
            .expect_err("must be denied");
        assert!(matches!(err, SessionError::ReadOnly { .. }));
    }

    #[test]
    fn mode_reports_remote() {
        let transport = RemoteTransport::new("https://example.com:8443/", Some("key".into()))
            .expect("build");
        match transport.mode() {
            TransportMode::Remote { base_url, api_key } => {
                assert_eq!(base_url, "https://example.com:8443");
                assert_eq!(api_key.as_deref(), Some("key"));
            }
            TransportMode::Local => panic!("expected remote mode"),
        }
        assert!(transport.is_read_only());
    }
}
