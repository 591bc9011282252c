//! Shared data model for the Ensign session core.
//!
//! This crate holds the wire shapes exchanged with the backend daemon, the
//! connection-state model maintained by the status reconciler, and the error
//! taxonomy used across the session crates. It deliberately contains no I/O:
//! everything here is plain data plus serde plumbing.

pub mod auth;
pub mod connection;
pub mod errors;
pub mod slaves;
pub mod status;
pub mod timestamp;

pub use auth::{AuthPollOutcome, DeviceCodeInfo};
pub use connection::{ConnectionState, TransportMode};
pub use errors::{ProcessError, SessionError};
pub use slaves::{PairingRequest, SlaveInfo};
pub use status::{McpServerStatus, StatusSnapshot};
