//! Session configuration and transport construction.

use std::sync::Arc;
use std::time::Duration;

use ensign_types::{SessionError, TransportMode};

use crate::transport::{LocalTransport, RemoteTransport, Transport};

/// Default reconciler polling interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// How a session reaches the daemon and how often it polls.
///
/// Changing the mode mid-session means tearing down the reconciler task and
/// starting a fresh one with a transport built from the new config.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub mode: TransportMode,
    pub poll_interval: Duration,
}

impl SessionConfig {
    pub fn local() -> Self {
        Self {
            mode: TransportMode::Local,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn remote(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            mode: TransportMode::Remote {
                base_url: base_url.into(),
                api_key,
            },
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::local()
    }
}

/// Build the transport the config describes.
pub fn build_transport(config: &SessionConfig) -> Result<Arc<dyn Transport>, SessionError> {
    match &config.mode {
        TransportMode::Local => Ok(Arc::new(LocalTransport::new())),
        TransportMode::Remote { base_url, api_key } => Ok(Arc::new(RemoteTransport::new(
            base_url.clone(),
            api_key.clone(),
        )?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_matches_mode() {
        let local = build_transport(&SessionConfig::local()).expect("local");
        assert!(!local.is_read_only());

        let remote =
            build_transport(&SessionConfig::remote("https://example.com:8443", None)).expect("remote");
        assert!(remote.is_read_only());
    }
}
