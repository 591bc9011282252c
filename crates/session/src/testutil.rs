//! Scriptable transport for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use ensign_types::{SessionError, TransportMode};

use crate::transport::{DEFAULT_TIMEOUT, HttpReply, Method, Transport, error_message_from_body};

/// One recorded request, for assertions on what a component sent.
#[derive(Debug, Clone)]
pub(crate) struct RecordedCall {
    pub path: String,
    pub method: Method,
    pub body: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
enum StubReply {
    Reply(HttpReply),
    TransportError(String),
}

#[derive(Debug, Default)]
struct Inner {
    replies: HashMap<String, VecDeque<StubReply>>,
    last_served: HashMap<String, StubReply>,
    calls: Vec<RecordedCall>,
}

/// In-memory [`Transport`] driven by per-path reply queues.
///
/// Replies are consumed in order; once a path's queue is exhausted, the
/// most recently served reply repeats. Paths that were never scripted fail
/// as a transport error, so a test that forgets an endpoint fails loudly
/// rather than hanging.
#[derive(Clone)]
pub(crate) struct StubTransport {
    inner: Arc<Mutex<Inner>>,
    mode: TransportMode,
}

impl StubTransport {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            mode: TransportMode::Local,
        }
    }

    pub fn remote() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            mode: TransportMode::Remote {
                base_url: "https://example.com:8443".to_string(),
                api_key: None,
            },
        }
    }

    pub fn push_ok(&self, path: &str, body: &[u8]) {
        self.push_status(path, 200, body);
    }

    pub fn push_status(&self, path: &str, status: u16, body: &[u8]) {
        self.push(path, StubReply::Reply(HttpReply { status, body: body.to_vec() }));
    }

    pub fn push_transport_error(&self, path: &str, message: &str) {
        self.push(path, StubReply::TransportError(message.to_string()));
    }

    fn push(&self, path: &str, reply: StubReply) {
        let mut inner = self.inner.lock().unwrap();
        inner.replies.entry(path.to_string()).or_default().push_back(reply);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self, path: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|call| call.path == path)
            .count()
    }

    fn roundtrip(
        &self,
        path: &str,
        method: Method,
        body: Option<serde_json::Value>,
    ) -> Result<HttpReply, SessionError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(RecordedCall {
            path: path.to_string(),
            method,
            body,
        });

        let next = inner
            .replies
            .get_mut(path)
            .and_then(|queue| queue.pop_front());
        let reply = match next {
            Some(reply) => {
                inner.last_served.insert(path.to_string(), reply.clone());
                reply
            }
            None => inner
                .last_served
                .get(path)
                .cloned()
                .ok_or_else(|| SessionError::transport(format!("no stub reply for {path}")))?,
        };
        match reply {
            StubReply::Reply(reply) => Ok(reply),
            StubReply::TransportError(message) => Err(SessionError::transport(message)),
        }
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn get(&self, path: &str) -> Result<Vec<u8>, SessionError> {
        self.send(path, Method::Get, None, DEFAULT_TIMEOUT).await
    }

    async fn send(
        &self,
        path: &str,
        method: Method,
        body: Option<serde_json::Value>,
        _timeout: Duration,
    ) -> Result<Vec<u8>, SessionError> {
        let reply = self.roundtrip(path, method, body)?;
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
        _timeout: Duration,
    ) -> Result<HttpReply, SessionError> {
        self.roundtrip(path, method, body)
    }

    fn mode(&self) -> TransportMode {
        self.mode.clone()
    }
}
