//! Observable session state and out-of-band events.

use ensign_types::{ConnectionState, PairingRequest, SlaveInfo, StatusSnapshot};

/// Everything the reconciler knows about the daemon, published as a whole
/// through a watch channel. Consumers treat it as a read-only snapshot.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub connection: ConnectionState,
    pub snapshot: StatusSnapshot,
    pub slaves: Vec<SlaveInfo>,
    pub pending_pairings: Vec<PairingRequest>,
    /// Human-readable detail behind an `Error` connection state.
    pub last_error: Option<String>,
}

impl SessionState {
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Clear everything derived from the daemon, keeping only the new
    /// connection state.
    pub(crate) fn reset_to(&mut self, connection: ConnectionState) {
        self.connection = connection;
        self.snapshot = StatusSnapshot::default();
        self.slaves.clear();
        self.pending_pairings.clear();
    }
}

/// Discrete happenings that are not part of the rolling state: a pairing
/// request seen for the first time, or a restart/upgrade monitor ending.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A never-before-seen pairing request appeared in `/slaves/pending`.
    PairingRequested(PairingRequest),
    /// A restart/upgrade monitor finished. `confirmed` is false when the
    /// monitor gave up at its deadline without seeing the target healthy.
    OperationFinished { target: String, confirmed: bool },
}
