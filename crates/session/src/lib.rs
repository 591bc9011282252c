//! Session and connection-management core for the Ensign backend daemon.
//!
//! The daemon owns all heavy lifting (MCP servers, tools, slave nodes);
//! this crate owns the client side of that relationship: reaching the
//! daemon locally over its Unix socket or remotely over authenticated
//! HTTP, keeping a reconciled view of its status, controlling the local
//! process, and driving device-code authorizations and slave pairing.

pub mod auth;
pub mod client;
pub mod config;
pub mod pairing;
pub mod paths;
pub mod process;
pub mod reconciler;
pub mod state;
pub mod transport;

#[cfg(test)]
pub(crate) mod testutil;

pub use auth::{AuthTarget, DeviceAuthFlow};
pub use client::SessionClient;
pub use config::{DEFAULT_POLL_INTERVAL, SessionConfig, build_transport};
pub use pairing::{PairingCoordinator, PairingTracker};
pub use process::ProcessController;
pub use reconciler::{LocalProbe, ReconcilerCommand, ReconcilerHandle, StatusReconciler};
pub use state::{SessionEvent, SessionState};
pub use transport::{LocalTransport, Method, RemoteTransport, Transport};
