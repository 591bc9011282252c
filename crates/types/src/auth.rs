//! Device-code authorization wire shapes.

use serde::{Deserialize, Serialize};

/// A pending device-flow authorization returned by the initiate call.
///
/// Consumed by the poll loop and discarded on any terminal outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceCodeInfo {
    pub device_code: String,
    pub user_code: String,
    #[serde(alias = "verification_url")]
    pub verification_uri: String,
    #[serde(default = "default_poll_interval")]
    pub interval: u64,
    #[serde(default)]
    pub expires_in: u64,
}

fn default_poll_interval() -> u64 {
    5
}

/// Result of one device-flow poll attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthPollOutcome {
    /// User has not acted yet; keep polling.
    Pending,
    /// Backend asked us to back off; keep polling with a longer wait.
    SlowDown,
    /// Authorization granted. Caller must re-fetch status/config.
    Success,
    /// The device code expired before the user authorized.
    Expired,
    /// The user denied the request.
    Denied,
    /// Unclassified terminal result, carrying the raw message.
    Unknown(String),
}

impl AuthPollOutcome {
    /// Terminal outcomes end the poll loop; `Pending` and `SlowDown` do not.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AuthPollOutcome::Pending | AuthPollOutcome::SlowDown)
    }

    /// Short label for logs and display.
    pub fn label(&self) -> &str {
        match self {
            AuthPollOutcome::Pending => "pending",
            AuthPollOutcome::SlowDown => "slow_down",
            AuthPollOutcome::Success => "success",
            AuthPollOutcome::Expired => "expired",
            AuthPollOutcome::Denied => "denied",
            AuthPollOutcome::Unknown(_) => "unknown",
        }
    }
}
