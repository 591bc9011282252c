//! Typed convenience calls over a [`Transport`].
//!
//! Thin by intent: each method names an endpoint, shapes the body, and
//! decodes JSON. Everything stateful (connection tracking, retries, pairing
//! bookkeeping) lives in the reconciler and coordinator above this layer.

use std::sync::Arc;

use serde_json::json;

use ensign_types::{
    DeviceCodeInfo, McpServerStatus, PairingRequest, SessionError, SlaveInfo, StatusSnapshot,
    TransportMode,
};

use crate::transport::{
    AGENT_PROMPT_TIMEOUT, DEFAULT_TIMEOUT, Method, OAUTH_LOGIN_TIMEOUT, Transport,
};

/// Client for the backend daemon's HTTP API.
#[derive(Clone)]
pub struct SessionClient {
    transport: Arc<dyn Transport>,
}

impl SessionClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn mode(&self) -> TransportMode {
        self.transport.mode()
    }

    pub fn is_read_only(&self) -> bool {
        self.transport.is_read_only()
    }

    /// Cheap reachability probe. Any 2xx counts; the body is ignored.
    pub async fn health(&self) -> Result<(), SessionError> {
        self.transport.get("/health").await.map(|_| ())
    }

    /// Full daemon status, including per-MCP-server detail.
    pub async fn status(&self) -> Result<StatusSnapshot, SessionError> {
        let body = self.transport.get("/status").await?;
        decode(&body, "/status")
    }

    pub async fn mcp_servers(&self) -> Result<Vec<McpServerStatus>, SessionError> {
        let body = self.transport.get("/mcp-servers").await?;
        decode(&body, "/mcp-servers")
    }

    pub async fn restart_mcp_server(&self, name: &str) -> Result<(), SessionError> {
        self.transport
            .send(
                &format!("/mcp-servers/{name}/restart"),
                Method::Post,
                None,
                OAUTH_LOGIN_TIMEOUT,
            )
            .await
            .map(|_| ())
    }

    /// Ask the daemon to re-read its configuration in place.
    pub async fn reload_config(&self) -> Result<(), SessionError> {
        self.transport
            .send("/reload", Method::Post, None, DEFAULT_TIMEOUT)
            .await
            .map(|_| ())
    }

    pub async fn slaves(&self) -> Result<Vec<SlaveInfo>, SessionError> {
        let body = self.transport.get("/slaves").await?;
        decode(&body, "/slaves")
    }

    pub async fn pending_pairings(&self) -> Result<Vec<PairingRequest>, SessionError> {
        let body = self.transport.get("/slaves/pending").await?;
        decode(&body, "/slaves/pending")
    }

    pub async fn approve_pairing(
        &self,
        hostname: &str,
        pairing_code: &str,
    ) -> Result<(), SessionError> {
        self.transport
            .send(
                "/slaves/approve",
                Method::Post,
                Some(json!({ "hostname": hostname, "pairing_code": pairing_code })),
                DEFAULT_TIMEOUT,
            )
            .await
            .map(|_| ())
    }

    pub async fn deny_pairing(
        &self,
        hostname: &str,
        pairing_code: &str,
    ) -> Result<(), SessionError> {
        self.transport
            .send(
                "/slaves/deny",
                Method::Post,
                Some(json!({ "hostname": hostname, "pairing_code": pairing_code })),
                DEFAULT_TIMEOUT,
            )
            .await
            .map(|_| ())
    }

    pub async fn revoke_slave(&self, hostname: &str) -> Result<(), SessionError> {
        self.transport
            .send(
                "/slaves/revoke",
                Method::Post,
                Some(json!({ "hostname": hostname })),
                DEFAULT_TIMEOUT,
            )
            .await
            .map(|_| ())
    }

    pub async fn restart_slave(&self, hostname: &str) -> Result<(), SessionError> {
        self.transport
            .send(
                &format!("/slaves/restart/{hostname}"),
                Method::Post,
                None,
                DEFAULT_TIMEOUT,
            )
            .await
            .map(|_| ())
    }

    pub async fn upgrade_slave(&self, hostname: &str) -> Result<(), SessionError> {
        self.transport
            .send(
                &format!("/slaves/upgrade/{hostname}"),
                Method::Post,
                None,
                DEFAULT_TIMEOUT,
            )
            .await
            .map(|_| ())
    }

    /// Run a prompt against a named agent. Slow by nature, so this carries
    /// the longest sanctioned timeout.
    pub async fn run_agent(
        &self,
        name: &str,
        prompt: &str,
    ) -> Result<serde_json::Value, SessionError> {
        let body = self
            .transport
            .send(
                &format!("/agents/{name}/run"),
                Method::Post,
                Some(json!({ "prompt": prompt })),
                AGENT_PROMPT_TIMEOUT,
            )
            .await?;
        decode(&body, "agent run")
    }

    /// Begin a device-code login for a named MCP server.
    pub async fn start_mcp_login(&self, server: &str) -> Result<DeviceCodeInfo, SessionError> {
        let body = self
            .transport
            .send(
                &format!("/auth/{server}/login"),
                Method::Post,
                None,
                OAUTH_LOGIN_TIMEOUT,
            )
            .await?;
        decode(&body, "login")
    }

    /// Begin a device-code login for a Google account.
    pub async fn start_google_login(
        &self,
        account: Option<&str>,
    ) -> Result<DeviceCodeInfo, SessionError> {
        let body = account.map(|a| json!({ "account": a }));
        let reply = self
            .transport
            .send("/google/auth/start", Method::Post, body, OAUTH_LOGIN_TIMEOUT)
            .await?;
        decode(&reply, "google login")
    }
}

fn decode<T: serde::de::DeserializeOwned>(body: &[u8], what: &str) -> Result<T, SessionError> {
    serde_json::from_slice(body)
        .map_err(|err| SessionError::decode(format!("decode {what} response: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::StubTransport;

    #[tokio::test]
    async fn status_decodes_snapshot() {
        let stub = StubTransport::new();
        stub.push_ok(
            "/status",
            br#"{"running":true,"pid":42,"version":"1.2.0","uptime":"3m",
                "uptime_seconds":180,"total_tools":7,"mcp_servers":[]}"#,
        );
        let client = SessionClient::new(Arc::new(stub));
        let snapshot = client.status().await.expect("status");
        assert!(snapshot.running);
        assert_eq!(snapshot.pid, 42);
        assert_eq!(snapshot.total_tools, 7);
    }

    #[tokio::test]
    async fn status_decode_failure_is_decode_error() {
        let stub = StubTransport::new();
        stub.push_ok("/status", b"not json");
        let client = SessionClient::new(Arc::new(stub));
        let err = client.status().await.expect_err("must fail");
        assert!(matches!(err, SessionError::Decode { .. }), "got: {err}");
    }

    #[tokio::test]
    async fn approve_posts_hostname_and_code() {
        let stub = StubTransport::new();
        stub.push_ok("/slaves/approve", b"{}");
        let client = SessionClient::new(Arc::new(stub.clone()));
        client.approve_pairing("mini", "ABCD").await.expect("approve");

        let calls = stub.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].path, "/slaves/approve");
        assert_eq!(calls[0].method, Method::Post);
        let body = calls[0].body.as_ref().expect("body");
        assert_eq!(body["hostname"], "mini");
        assert_eq!(body["pairing_code"], "ABCD");
    }

    #[tokio::test]
    async fn restart_slave_targets_hostname_path() {
        let stub = StubTransport::new();
        stub.push_ok("/slaves/restart/mini", b"{}");
        let client = SessionClient::new(Arc::new(stub.clone()));
        client.restart_slave("mini").await.expect("restart");
        assert_eq!(stub.calls()[0].path, "/slaves/restart/mini");
    }
}
