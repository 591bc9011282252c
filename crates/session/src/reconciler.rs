//! Periodic reconciliation of session state against the daemon.
//!
//! One task owns the [`SessionState`] and is the only writer. It polls
//! `/status` on a timer, folds the result into exactly one connection-state
//! transition per refresh, and publishes the whole state through a watch
//! channel. Commands arrive over an mpsc channel; refreshes are strictly
//! sequential because the loop awaits each one inline.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use ensign_types::{ConnectionState, SessionError, TransportMode};

use crate::client::SessionClient;
use crate::pairing::PairingTracker;
use crate::process::ProcessController;
use crate::state::{SessionEvent, SessionState};

/// Error label shown when a local daemon is alive but not answering.
const API_UNAVAILABLE: &str = "API unavailable";
/// Error label shown when a remote daemon cannot be reached.
const CONNECTION_FAILED: &str = "Connection failed";

const COMMAND_BUFFER: usize = 16;
const EVENT_BUFFER: usize = 32;

/// Requests a running reconciler accepts.
#[derive(Debug, Clone)]
pub enum ReconcilerCommand {
    /// Refresh now, off-schedule.
    Refresh,
    /// Retry the status fetch a bounded number of times before settling.
    RefreshWithRetry { attempts: u32, delay: Duration },
    /// Suppress timer-driven polling (commands still work).
    Pause,
    /// Resume polling and refresh immediately.
    Resume,
}

/// Cheap local-daemon presence signals, checked before any network call.
///
/// Only meaningful for local sessions; remote sessions have no equivalent
/// and always go to the network.
#[derive(Debug, Clone)]
pub struct LocalProbe {
    socket_path: PathBuf,
    controller: ProcessController,
}

impl LocalProbe {
    pub fn new() -> Self {
        Self {
            socket_path: crate::paths::socket_path(),
            controller: ProcessController::new(),
        }
    }

    pub fn with_paths(socket_path: impl Into<PathBuf>, controller: ProcessController) -> Self {
        Self {
            socket_path: socket_path.into(),
            controller,
        }
    }

    /// Neither the socket nor a live PID exists: the daemon is simply not
    /// there, and polling it over the network would be wasted work.
    fn daemon_gone(&self) -> bool {
        !self.socket_path.exists() && !self.controller.is_running()
    }

    /// Whether the recorded PID refers to a live process. A leftover socket
    /// file says nothing after a crash, so post-failure classification uses
    /// this alone.
    fn process_alive(&self) -> bool {
        self.controller.is_running()
    }
}

impl Default for LocalProbe {
    fn default() -> Self {
        Self::new()
    }
}

/// The reconciliation state machine. Owns the state; runs inside one task.
pub struct StatusReconciler {
    client: SessionClient,
    probe: Option<LocalProbe>,
    tracker: PairingTracker,
    state: SessionState,
    state_tx: watch::Sender<SessionState>,
    event_tx: mpsc::Sender<SessionEvent>,
    poll_interval: Duration,
    paused: bool,
}

/// Control surface for a spawned reconciler.
#[derive(Clone)]
pub struct ReconcilerHandle {
    commands: mpsc::Sender<ReconcilerCommand>,
    state_rx: watch::Receiver<SessionState>,
    cancel: CancellationToken,
}

impl ReconcilerHandle {
    /// Watch receiver over the published state. Cheap to clone.
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    pub fn current(&self) -> SessionState {
        self.state_rx.borrow().clone()
    }

    pub async fn refresh(&self) {
        let _ = self.commands.send(ReconcilerCommand::Refresh).await;
    }

    pub async fn refresh_with_retry(&self, attempts: u32, delay: Duration) {
        let _ = self
            .commands
            .send(ReconcilerCommand::RefreshWithRetry { attempts, delay })
            .await;
    }

    pub async fn pause(&self) {
        let _ = self.commands.send(ReconcilerCommand::Pause).await;
    }

    pub async fn resume(&self) {
        let _ = self.commands.send(ReconcilerCommand::Resume).await;
    }

    /// Stop the reconciler task.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl StatusReconciler {
    pub fn new(
        client: SessionClient,
        probe: Option<LocalProbe>,
        tracker: PairingTracker,
        poll_interval: Duration,
    ) -> (Self, watch::Receiver<SessionState>, mpsc::Receiver<SessionEvent>) {
        let (state_tx, state_rx) = watch::channel(SessionState::default());
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let reconciler = Self {
            client,
            probe,
            tracker,
            state: SessionState::default(),
            state_tx,
            event_tx,
            poll_interval,
            paused: false,
        };
        (reconciler, state_rx, event_rx)
    }

    /// Spawn the reconciler onto the runtime and return its control handle.
    /// The watch and event receivers from [`StatusReconciler::new`] stay
    /// with the caller.
    pub fn spawn(self) -> ReconcilerHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let cancel = CancellationToken::new();
        let state_rx = self.state_tx.subscribe();

        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            self.run(command_rx, task_cancel).await;
        });

        ReconcilerHandle {
            commands: command_tx,
            state_rx,
            cancel,
        }
    }

    /// Timer and command loop. Refreshes never overlap: the select arm that
    /// triggered one awaits it to completion before the next arm can fire.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<ReconcilerCommand>,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if !self.paused {
                        self.refresh().await;
                    }
                }
                command = commands.recv() => match command {
                    None => break,
                    Some(ReconcilerCommand::Refresh) => self.refresh().await,
                    Some(ReconcilerCommand::RefreshWithRetry { attempts, delay }) => {
                        self.refresh_with_retry(attempts, delay).await;
                    }
                    Some(ReconcilerCommand::Pause) => self.paused = true,
                    Some(ReconcilerCommand::Resume) => {
                        self.paused = false;
                        self.refresh().await;
                    }
                },
            }
        }
    }

    /// One reconciliation pass: exactly one connection-state transition,
    /// snapshot replaced atomically alongside it, one publication.
    pub async fn refresh(&mut self) {
        if let Some(probe) = &self.probe {
            if probe.daemon_gone() {
                debug!(target: "ensign::reconciler", "daemon absent, skipping network poll");
                self.state.reset_to(ConnectionState::Disconnected);
                self.state.last_error = None;
                self.publish();
                return;
            }
        }

        match self.client.status().await {
            Ok(snapshot) => {
                self.state.connection = ConnectionState::Connected;
                self.state.snapshot = snapshot;
                self.state.last_error = None;
                self.refresh_topology().await;
            }
            Err(err) => self.apply_failure(err),
        }
        self.publish();
    }

    /// Bounded fixed-delay retry of the status fetch, for moments when the
    /// daemon is known to be settling (just reloaded or restarted). Falls
    /// back to a plain refresh when every attempt fails.
    pub async fn refresh_with_retry(&mut self, attempts: u32, delay: Duration) {
        for attempt in 0..attempts {
            match self.client.status().await {
                Ok(snapshot) => {
                    self.state.connection = ConnectionState::Connected;
                    self.state.snapshot = snapshot;
                    self.state.last_error = None;
                    self.refresh_topology().await;
                    self.publish();
                    return;
                }
                Err(err) => {
                    debug!(
                        target: "ensign::reconciler",
                        attempt, %err, "status retry failed"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
        self.refresh().await;
    }

    /// Best-effort slave and pending-pairing refresh after a successful
    /// status poll. Failures keep the previous lists; a stale topology is
    /// better than a flickering one.
    async fn refresh_topology(&mut self) {
        match self.client.slaves().await {
            Ok(slaves) => self.state.slaves = slaves,
            Err(err) => warn!(target: "ensign::reconciler", %err, "slave list refresh failed"),
        }
        match self.client.pending_pairings().await {
            Ok(pending) => {
                for request in self.tracker.diff_and_mark(&pending) {
                    let _ = self
                        .event_tx
                        .send(SessionEvent::PairingRequested(request))
                        .await;
                }
                self.state.pending_pairings = pending;
            }
            Err(err) => warn!(target: "ensign::reconciler", %err, "pending list refresh failed"),
        }
    }

    fn apply_failure(&mut self, err: SessionError) {
        let message = err.to_string();
        match self.client.mode() {
            TransportMode::Local => {
                let daemon_alive = self.probe.as_ref().is_none_or(|p| p.process_alive());
                if daemon_alive {
                    // Something is listening (or at least running) but the
                    // API call failed; keep the last good snapshot visible.
                    self.state.connection =
                        ConnectionState::Error(API_UNAVAILABLE.to_string());
                } else {
                    self.state.reset_to(ConnectionState::Disconnected);
                }
            }
            TransportMode::Remote { .. } => {
                self.state
                    .reset_to(ConnectionState::Error(CONNECTION_FAILED.to_string()));
            }
        }
        self.state.last_error = Some(message);
    }

    fn publish(&self) {
        let _ = self.state_tx.send(self.state.clone());
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> &SessionState {
        &self.state
    }
}
