//! HTTP/1.1 over the daemon's Unix domain socket.
//!
//! The daemon serves its full API on a user-scoped socket. Each call opens a
//! fresh connection, writes one `Connection: close` request, and reads the
//! response to EOF, so no connection state survives between calls.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::time::timeout;
use tracing::debug;

use ensign_types::{SessionError, TransportMode};

use super::{CONNECT_TIMEOUT, DEFAULT_TIMEOUT, HttpReply, Method, Transport, error_message_from_body};

/// Transport for a daemon on this machine, addressed via Unix socket.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    socket_path: PathBuf,
}

impl LocalTransport {
    /// Use the default user-scoped socket location.
    pub fn new() -> Self {
        Self {
            socket_path: crate::paths::socket_path(),
        }
    }

    /// Use an explicit socket path (tests, non-standard installs).
    pub fn with_socket_path(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// One full request/response cycle. The per-call timeout bounds the
    /// whole exchange; connect is additionally bounded by [`CONNECT_TIMEOUT`].
    async fn roundtrip(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        call_timeout: Duration,
    ) -> Result<HttpReply, SessionError> {
        debug!(target: "ensign::transport", %method, path, "local request");
        timeout(call_timeout, self.exchange(method, path, body))
            .await
            .map_err(|_| {
                SessionError::transport(format!(
                    "request to {path} timed out after {}s",
                    call_timeout.as_secs()
                ))
            })?
    }

    async fn exchange(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<HttpReply, SessionError> {
        let mut stream = timeout(CONNECT_TIMEOUT, UnixStream::connect(&self.socket_path))
            .await
            .map_err(|_| {
                SessionError::transport(format!(
                    "connect to {} timed out",
                    self.socket_path.display()
                ))
            })?
            .map_err(|err| {
                SessionError::transport(format!(
                    "connect to {} failed: {err}",
                    self.socket_path.display()
                ))
            })?;

        let body_bytes = match body {
            Some(value) => Some(serde_json::to_vec(&value).map_err(|err| {
                SessionError::transport(format!("encode request body: {err}"))
            })?),
            None => None,
        };

        let mut request = format!(
            "{} {} HTTP/1.1\r\nHost: ensign\r\nConnection: close\r\nAccept: application/json\r\n",
            method.as_str(),
            path
        );
        if let Some(bytes) = &body_bytes {
            request.push_str("Content-Type: application/json\r\n");
            request.push_str(&format!("Content-Length: {}\r\n", bytes.len()));
        }
        request.push_str("\r\n");

        stream
            .write_all(request.as_bytes())
            .await
            .map_err(|err| SessionError::transport(format!("socket write failed: {err}")))?;
        if let Some(bytes) = &body_bytes {
            stream
                .write_all(bytes)
                .await
                .map_err(|err| SessionError::transport(format!("socket write failed: {err}")))?;
        }

        let mut raw = Vec::new();
        stream
            .read_to_end(&mut raw)
            .await
            .map_err(|err| SessionError::transport(format!("socket read failed: {err}")))?;

        parse_http_response(&raw)
    }
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a complete HTTP/1.1 response read to EOF. Honors Content-Length
/// framing when present; otherwise the remainder after the header block is
/// the body (the daemon closes the connection per request).
fn parse_http_response(raw: &[u8]) -> Result<HttpReply, SessionError> {
    let split = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .ok_or_else(|| SessionError::transport("response missing header delimiter"))?;
    let header_text = String::from_utf8_lossy(&raw[..split]);
    let mut lines = header_text.lines();

    let status_line = lines
        .next()
        .ok_or_else(|| SessionError::transport("response missing status line"))?;
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| SessionError::transport(format!("invalid status line: {status_line}")))?;

    let mut content_length: Option<usize> = None;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse::<usize>().ok();
            }
        }
    }

    let rest = &raw[split + 4..];
    let body = match content_length {
        Some(len) if len <= rest.len() => rest[..len].to_vec(),
        _ => rest.to_vec(),
    };

    Ok(HttpReply { status, body })
}

#[async_trait]
impl Transport for LocalTransport {
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
        self.roundtrip(method, path, body, timeout).await
    }

    fn mode(&self) -> TransportMode {
        TransportMode::Local
    }
}
