//! Connection state and transport selection.

use serde::{Deserialize, Serialize};

/// Reachability of the backend as classified by the status reconciler.
///
/// Exactly one value is authoritative at a time; only the reconciler assigns
/// it, once per poll cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConnectionState {
    /// No poll has completed yet.
    #[default]
    Unknown,
    /// A poll is in flight for a freshly configured session.
    Connecting,
    /// The last status fetch succeeded.
    Connected,
    /// Neither the socket nor the process shows any sign of life.
    Disconnected,
    /// The backend is reachable in principle but the last poll failed.
    Error(String),
}

impl ConnectionState {
    /// Whether the backend answered the most recent poll.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Short human-readable label for display surfaces.
    pub fn label(&self) -> &str {
        match self {
            ConnectionState::Unknown => "Unknown",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Error(_) => "Error",
        }
    }
}

/// Which transport the session talks through.
///
/// Set once at configuration time; switching modes tears down the transport
/// and everything built on top of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportMode {
    /// Unix-domain-socket HTTP to a daemon on this machine.
    Local,
    /// Direct HTTP(S) to a remote daemon, optionally bearer-authenticated.
    Remote {
        base_url: String,
        api_key: Option<String>,
    },
}

impl TransportMode {
    /// Remote sessions are restricted to observation plus a narrow read-only
    /// allow-list.
    pub fn is_read_only(&self) -> bool {
        matches!(self, TransportMode::Remote { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_unknown() {
        assert_eq!(ConnectionState::default(), ConnectionState::Unknown);
        assert!(!ConnectionState::default().is_connected());
    }

    #[test]
    fn remote_mode_is_read_only() {
        assert!(!TransportMode::Local.is_read_only());
        let remote = TransportMode::Remote {
            base_url: "https://example.com:8443".into(),
            api_key: None,
        };
        assert!(remote.is_read_only());
    }
}
