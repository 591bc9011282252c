//! Device-code authorization against the daemon's auth endpoints.
//!
//! The daemon brokers the actual OAuth exchange; this side only initiates,
//! then polls until the user finishes (or doesn't). Poll responses carry
//! protocol state in their HTTP status, so polling goes through the
//! allow-non-success transport path and classifies the reply itself.

use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use ensign_types::{AuthPollOutcome, DeviceCodeInfo, SessionError};

use crate::client::SessionClient;
use crate::transport::{DEVICE_POLL_TIMEOUT, Method};

/// Floor on the poll interval, whatever the backend suggests.
const MIN_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Added to the wait after every slow-down response, cumulatively.
const SLOW_DOWN_PENALTY: Duration = Duration::from_secs(5);

/// What the user is authorizing against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthTarget {
    /// OAuth login for a named MCP server.
    McpServer(String),
    /// Google account authorization, optionally for a specific account.
    Google { account: Option<String> },
}

impl AuthTarget {
    fn poll_path(&self) -> String {
        match self {
            AuthTarget::McpServer(server) => format!("/auth/{server}/poll"),
            AuthTarget::Google { .. } => "/google/auth/poll".to_string(),
        }
    }

    /// Display name for logs and prompts.
    pub fn label(&self) -> String {
        match self {
            AuthTarget::McpServer(server) => server.clone(),
            AuthTarget::Google { account: Some(account) } => format!("google ({account})"),
            AuthTarget::Google { account: None } => "google".to_string(),
        }
    }
}

/// Runs a device-code flow end to end.
#[derive(Clone)]
pub struct DeviceAuthFlow {
    client: SessionClient,
}

impl DeviceAuthFlow {
    pub fn new(client: SessionClient) -> Self {
        Self { client }
    }

    /// Start the flow. The returned info carries the code the user must
    /// enter and the backend's suggested poll interval.
    pub async fn initiate(&self, target: &AuthTarget) -> Result<DeviceCodeInfo, SessionError> {
        match target {
            AuthTarget::McpServer(server) => self.client.start_mcp_login(server).await,
            AuthTarget::Google { account } => {
                self.client.start_google_login(account.as_deref()).await
            }
        }
    }

    /// One poll attempt. Connector-level failure is an error; every HTTP
    /// status is a classified outcome.
    pub async fn poll_once(
        &self,
        target: &AuthTarget,
        device_code: &str,
    ) -> Result<AuthPollOutcome, SessionError> {
        let reply = self
            .client
            .transport()
            .send_allowing_non_success(
                &target.poll_path(),
                Method::Post,
                Some(json!({ "device_code": device_code })),
                DEVICE_POLL_TIMEOUT,
            )
            .await?;

        // 202 sits inside the 2xx range, so it must be checked first.
        let outcome = match reply.status {
            202 => AuthPollOutcome::Pending,
            status if (200..300).contains(&status) => AuthPollOutcome::Success,
            429 => AuthPollOutcome::SlowDown,
            410 => AuthPollOutcome::Expired,
            403 => AuthPollOutcome::Denied,
            status => {
                let text = String::from_utf8_lossy(&reply.body).trim().to_string();
                if text.is_empty() {
                    AuthPollOutcome::Unknown(format!("HTTP {status}"))
                } else {
                    AuthPollOutcome::Unknown(text)
                }
            }
        };
        Ok(outcome)
    }

    /// Poll until a terminal outcome or cancellation (`None`). Waits at
    /// least [`MIN_POLL_INTERVAL`] between polls, stretching the wait after
    /// each slow-down. Connector-level errors are transient: the daemon may
    /// be mid-restart while the user authorizes in a browser.
    pub async fn run(
        &self,
        target: &AuthTarget,
        info: &DeviceCodeInfo,
        cancel: &CancellationToken,
    ) -> Result<Option<AuthPollOutcome>, SessionError> {
        let mut wait = Duration::from_secs(info.interval).max(MIN_POLL_INTERVAL);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                _ = tokio::time::sleep(wait) => {}
            }

            match self.poll_once(target, &info.device_code).await {
                Ok(AuthPollOutcome::Pending) => {
                    debug!(target: "ensign::auth", target = %target.label(), "authorization pending");
                }
                Ok(AuthPollOutcome::SlowDown) => {
                    wait += SLOW_DOWN_PENALTY;
                    debug!(
                        target: "ensign::auth",
                        wait_secs = wait.as_secs(),
                        "backend asked to slow down"
                    );
                }
                Ok(outcome) => return Ok(Some(outcome)),
                Err(err) if err.is_transport() => {
                    warn!(target: "ensign::auth", %err, "poll failed, will retry");
                }
                Err(err) => return Err(err),
            }
        }
    }
}
