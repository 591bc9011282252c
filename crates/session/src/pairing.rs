//! Pairing approval and restart/upgrade supervision for slave nodes.
//!
//! Pairing requests are identified by their pairing code; the tracker's
//! seen-set guarantees one notification per code no matter how often the
//! pending list is re-fetched or reordered. Restart and upgrade actions get
//! a bounded background monitor that watches for the target to come back,
//! then goes quiet whether or not it did.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ensign_types::{PairingRequest, SessionError};

use crate::client::SessionClient;
use crate::reconciler::ReconcilerHandle;
use crate::state::SessionEvent;

/// Restart monitors: poll every 2s, give up after 30s.
const RESTART_POLL: Duration = Duration::from_secs(2);
const RESTART_WINDOW: Duration = Duration::from_secs(30);
/// Upgrade monitors: poll every 3s, give up after 60s (downloads take time).
const UPGRADE_POLL: Duration = Duration::from_secs(3);
const UPGRADE_WINDOW: Duration = Duration::from_secs(60);

/// Label used for monitors watching the primary daemon itself.
const MASTER_TARGET: &str = "master";

/// Seen pairing codes, shared between the reconciler's periodic poll and
/// the coordinator's forced refreshes.
#[derive(Debug, Clone, Default)]
pub struct PairingTracker {
    seen: Arc<Mutex<HashSet<String>>>,
}

impl PairingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the never-before-seen requests in `pending` and mark their
    /// codes as seen. Re-fetches and reorderings yield nothing new.
    pub fn diff_and_mark(&self, pending: &[PairingRequest]) -> Vec<PairingRequest> {
        let mut seen = self.seen.lock().unwrap();
        pending
            .iter()
            .filter(|request| seen.insert(request.pairing_code.clone()))
            .cloned()
            .collect()
    }

    /// Forget a code, typically after the request was approved or denied so
    /// a re-issued pairing for the same host notifies again.
    pub fn forget(&self, pairing_code: &str) {
        self.seen.lock().unwrap().remove(pairing_code);
    }
}

/// Drives pairing decisions and supervises restart/upgrade operations.
#[derive(Clone)]
pub struct PairingCoordinator {
    client: SessionClient,
    tracker: PairingTracker,
    events: mpsc::Sender<SessionEvent>,
    in_progress: Arc<Mutex<HashSet<String>>>,
    reconciler: Option<ReconcilerHandle>,
    cancel: CancellationToken,
}

impl PairingCoordinator {
    pub fn new(
        client: SessionClient,
        tracker: PairingTracker,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        Self {
            client,
            tracker,
            events,
            in_progress: Arc::new(Mutex::new(HashSet::new())),
            reconciler: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Attach a reconciler so approvals and denials can force an immediate
    /// state refresh instead of waiting for the next timer tick.
    pub fn with_reconciler(mut self, handle: ReconcilerHandle) -> Self {
        self.reconciler = Some(handle);
        self
    }

    /// Stop all monitors this coordinator has spawned.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Fetch the pending list and emit one event per newly-seen request.
    pub async fn refresh_pending(&self) -> Result<Vec<PairingRequest>, SessionError> {
        let pending = self.client.pending_pairings().await?;
        for request in self.tracker.diff_and_mark(&pending) {
            info!(
                target: "ensign::pairing",
                hostname = %request.hostname,
                "new pairing request"
            );
            let _ = self
                .events
                .send(SessionEvent::PairingRequested(request))
                .await;
        }
        Ok(pending)
    }

    pub async fn approve(&self, hostname: &str, pairing_code: &str) -> Result<(), SessionError> {
        self.client.approve_pairing(hostname, pairing_code).await?;
        self.tracker.forget(pairing_code);
        self.force_refresh().await;
        Ok(())
    }

    pub async fn deny(&self, hostname: &str, pairing_code: &str) -> Result<(), SessionError> {
        self.client.deny_pairing(hostname, pairing_code).await?;
        self.tracker.forget(pairing_code);
        self.force_refresh().await;
        Ok(())
    }

    pub async fn revoke(&self, hostname: &str) -> Result<(), SessionError> {
        self.client.revoke_slave(hostname).await?;
        self.force_refresh().await;
        Ok(())
    }

    /// Ask a slave to restart, then watch `/slaves` until it reports
    /// connected again or the window closes.
    pub async fn restart_slave(&self, hostname: &str) -> Result<(), SessionError> {
        self.client.restart_slave(hostname).await?;
        self.monitor_slave(hostname, RESTART_POLL, RESTART_WINDOW);
        Ok(())
    }

    /// Ask a slave to upgrade itself, with the longer upgrade window.
    pub async fn upgrade_slave(&self, hostname: &str) -> Result<(), SessionError> {
        self.client.upgrade_slave(hostname).await?;
        self.monitor_slave(hostname, UPGRADE_POLL, UPGRADE_WINDOW);
        Ok(())
    }

    /// Watch the primary daemon's `/health` after a caller-initiated
    /// restart (the restart itself goes through the process controller).
    pub fn monitor_master_restart(&self) {
        self.monitor_master(RESTART_POLL, RESTART_WINDOW);
    }

    /// Watch the primary daemon's `/health` after a caller-initiated
    /// upgrade.
    pub fn monitor_master_upgrade(&self) {
        self.monitor_master(UPGRADE_POLL, UPGRADE_WINDOW);
    }

    /// Whether a restart/upgrade monitor for this target is still running.
    pub fn is_in_progress(&self, target: &str) -> bool {
        self.in_progress.lock().unwrap().contains(target)
    }

    async fn force_refresh(&self) {
        if let Some(handle) = &self.reconciler {
            handle.refresh().await;
        }
    }

    fn monitor_slave(&self, hostname: &str, poll: Duration, window: Duration) {
        let target = hostname.to_string();
        let client = self.client.clone();
        let check = move || {
            let client = client.clone();
            let target = target.clone();
            async move {
                client
                    .slaves()
                    .await
                    .map(|slaves| {
                        slaves
                            .iter()
                            .any(|s| s.hostname == target && s.is_connected())
                    })
                    .unwrap_or(false)
            }
        };
        self.spawn_monitor(hostname.to_string(), poll, window, check);
    }

    fn monitor_master(&self, poll: Duration, window: Duration) {
        let client = self.client.clone();
        let check = move || {
            let client = client.clone();
            async move { client.health().await.is_ok() }
        };
        self.spawn_monitor(MASTER_TARGET.to_string(), poll, window, check);
    }

    /// Mark the target in-progress, poll `check` on a fixed cadence until
    /// it succeeds or the wall-clock window closes, then clear the mark and
    /// emit one `OperationFinished`. A missed deadline is not an error.
    fn spawn_monitor<F, Fut>(&self, target: String, poll: Duration, window: Duration, check: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = bool> + Send,
    {
        self.in_progress.lock().unwrap().insert(target.clone());
        let in_progress = Arc::clone(&self.in_progress);
        let events = self.events.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let deadline = Instant::now() + window;
            let mut confirmed = false;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(poll) => {}
                }
                let came_back = tokio::select! {
                    _ = cancel.cancelled() => return,
                    up = check() => up,
                };
                if came_back {
                    confirmed = true;
                    break;
                }
                if Instant::now() >= deadline {
                    warn!(target: "ensign::pairing", %target, "monitor window closed");
                    break;
                }
            }
            debug!(target: "ensign::pairing", %target, confirmed, "monitor finished");
            in_progress.lock().unwrap().remove(&target);
            let _ = events
                .send(SessionEvent::OperationFinished { target, confirmed })
                .await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::StubTransport;

    fn request(hostname: &str, code: &str) -> PairingRequest {
        serde_json::from_value(serde_json::json!({
            "hostname": hostname,
            "pairing_code": code,
        }))
        .expect("request")
    }

    fn coordinator_for(stub: &StubTransport) -> (PairingCoordinator, mpsc::Receiver<SessionEvent>) {
        let (tx, rx) = mpsc::channel(16);
        let coordinator = PairingCoordinator::new(
            SessionClient::new(Arc::new(stub.clone())),
            PairingTracker::new(),
            tx,
        );
        (coordinator, rx)
    }

    #[test]
    fn tracker_notifies_once_per_code() {
        let tracker = PairingTracker::new();
        let first = vec![request("a", "AAAA"), request("b", "BBBB")];
        assert_eq!(tracker.diff_and_mark(&first).len(), 2);

        // Reordered re-fetch: nothing new.
        let reordered = vec![request("b", "BBBB"), request("a", "AAAA")];
        assert!(tracker.diff_and_mark(&reordered).is_empty());

        // One genuinely new code among the old ones.
        let extended = vec![request("a", "AAAA"), request("c", "CCCC")];
        let fresh = tracker.diff_and_mark(&extended);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].pairing_code, "CCCC");
    }

    #[test]
    fn forgotten_code_notifies_again() {
        let tracker = PairingTracker::new();
        let pending = vec![request("a", "AAAA")];
        assert_eq!(tracker.diff_and_mark(&pending).len(), 1);
        tracker.forget("AAAA");
        assert_eq!(tracker.diff_and_mark(&pending).len(), 1);
    }

    #[tokio::test]
    async fn approve_posts_then_clears_code() {
        let stub = StubTransport::new();
        stub.push_ok("/slaves/approve", b"{}");
        stub.push_ok("/slaves/pending", br#"[{"hostname":"a","pairing_code":"AAAA"}]"#);
        let (coordinator, mut events) = coordinator_for(&stub);

        coordinator.refresh_pending().await.expect("pending");
        assert!(matches!(
            events.try_recv(),
            Ok(SessionEvent::PairingRequested(_))
        ));

        coordinator.approve("a", "AAAA").await.expect("approve");
        // The code was forgotten, so a still-pending re-fetch notifies again.
        coordinator.refresh_pending().await.expect("pending");
        assert!(matches!(
            events.try_recv(),
            Ok(SessionEvent::PairingRequested(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn restart_monitor_confirms_when_slave_returns() {
        let stub = StubTransport::new();
        stub.push_ok("/slaves/restart/mini", b"{}");
        stub.push_ok(
            "/slaves",
            br#"[{"hostname":"mini","status":"offline","tool_count":0,"enabled":true}]"#,
        );
        stub.push_ok(
            "/slaves",
            br#"[{"hostname":"mini","status":"connected","tool_count":2,"enabled":true}]"#,
        );
        let (coordinator, mut events) = coordinator_for(&stub);

        coordinator.restart_slave("mini").await.expect("restart");
        assert!(coordinator.is_in_progress("mini"));

        let event = events.recv().await.expect("event");
        match event {
            SessionEvent::OperationFinished { target, confirmed } => {
                assert_eq!(target, "mini");
                assert!(confirmed);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(!coordinator.is_in_progress("mini"));
    }

    #[tokio::test(start_paused = true)]
    async fn restart_monitor_goes_quiet_at_deadline() {
        let stub = StubTransport::new();
        stub.push_ok("/slaves/restart/mini", b"{}");
        // The slave never comes back.
        stub.push_ok(
            "/slaves",
            br#"[{"hostname":"mini","status":"offline","tool_count":0,"enabled":true}]"#,
        );
        let (coordinator, mut events) = coordinator_for(&stub);

        coordinator.restart_slave("mini").await.expect("restart");
        let event = events.recv().await.expect("event");
        match event {
            SessionEvent::OperationFinished { target, confirmed } => {
                assert_eq!(target, "mini");
                assert!(!confirmed);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(!coordinator.is_in_progress("mini"));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_monitors_without_polling_or_events() {
        let stub = StubTransport::new();
        stub.push_ok("/slaves/restart/mini", b"{}");
        stub.push_ok(
            "/slaves",
            br#"[{"hostname":"mini","status":"offline","tool_count":0,"enabled":true}]"#,
        );
        let (coordinator, mut events) = coordinator_for(&stub);

        coordinator.restart_slave("mini").await.expect("restart");
        coordinator.shutdown();

        // Well past the monitor window: no polls, no completion event.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(stub.call_count("/slaves"), 0);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn master_monitor_watches_health() {
        let stub = StubTransport::new();
        stub.push_transport_error("/health", "still down");
        stub.push_ok("/health", b"{}");
        let (coordinator, mut events) = coordinator_for(&stub);

        coordinator.monitor_master_restart();
        assert!(coordinator.is_in_progress("master"));

        let event = events.recv().await.expect("event");
        assert!(matches!(
            event,
            SessionEvent::OperationFinished { confirmed: true, .. }
        ));
    }
}
