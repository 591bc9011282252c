//! Lifecycle control for the local daemon process.
//!
//! The daemon records its PID in `~/.ensign/ensignd.pid`. Liveness is a
//! zero-signal probe (`kill(pid, 0)`); stop and reload deliver SIGTERM and
//! SIGUSR1. Start spawns the daemon fully detached and returns without
//! waiting for readiness; callers poll `/health` if they care.

use std::env;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use tracing::{debug, info};

use ensign_types::ProcessError;

use crate::paths;

/// Delay between stop and start during a restart, matching the daemon's
/// shutdown grace period.
const RESTART_DELAY: Duration = Duration::from_secs(1);

/// Controls the local daemon through its PID file and Unix signals.
#[derive(Debug, Clone)]
pub struct ProcessController {
    pid_path: PathBuf,
    binary_candidates: Vec<PathBuf>,
}

impl ProcessController {
    /// Standard controller: PID file under the state dir, daemon binary
    /// resolved from the current executable's directory then the
    /// user-level install location.
    pub fn new() -> Self {
        let mut candidates = Vec::new();
        if let Ok(exe) = env::current_exe() {
            if let Some(dir) = exe.parent() {
                candidates.push(dir.join(paths::DAEMON_BINARY));
            }
        }
        candidates.push(paths::installed_binary_path());
        Self {
            pid_path: paths::pid_path(),
            binary_candidates: candidates,
        }
    }

    /// Explicit paths, for tests.
    pub fn with_paths(pid_path: impl Into<PathBuf>, binary_candidates: Vec<PathBuf>) -> Self {
        Self {
            pid_path: pid_path.into(),
            binary_candidates,
        }
    }

    /// PID from the PID file, if the file exists and parses.
    pub fn read_pid(&self) -> Option<i32> {
        let raw = std::fs::read_to_string(&self.pid_path).ok()?;
        raw.trim().parse::<i32>().ok()
    }

    /// Whether a recorded PID refers to a live process. A missing or
    /// unparsable PID file, or a dead PID, both mean "not running".
    pub fn is_running(&self) -> bool {
        self.read_pid().is_some_and(process_alive)
    }

    /// PID of the running daemon, or `None`.
    pub fn running_pid(&self) -> Option<i32> {
        self.read_pid().filter(|&pid| process_alive(pid))
    }

    /// Spawn the daemon detached from this process and its terminal.
    /// Returns as soon as the child is forked.
    pub fn start(&self) -> Result<(), ProcessError> {
        let binary = self
            .binary_candidates
            .iter()
            .find(|path| path.is_file())
            .ok_or_else(|| ProcessError::BinaryNotFound {
                searched: self
                    .binary_candidates
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            })?;
        info!(target: "ensign::process", binary = %binary.display(), "starting daemon");

        let mut command = Command::new(binary);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // New session: the daemon must outlive this process and ignore
            // terminal signals.
            unsafe {
                command.pre_exec(|| {
                    if libc::setsid() == -1 {
                        return Err(std::io::Error::last_os_error());
                    }
                    Ok(())
                });
            }
        }
        command.spawn().map_err(|err| ProcessError::SpawnFailed {
            message: format!("{}: {err}", binary.display()),
        })?;
        Ok(())
    }

    /// Ask the daemon to shut down (SIGTERM). Does not wait for exit.
    pub fn stop(&self) -> Result<(), ProcessError> {
        let pid = self.running_pid().ok_or(ProcessError::NotRunning)?;
        info!(target: "ensign::process", pid, "stopping daemon");
        send_signal(pid, libc::SIGTERM).map_err(|err| ProcessError::StopFailed {
            message: format!("SIGTERM to pid {pid}: {err}"),
        })
    }

    /// Stop, wait out the shutdown grace period, start.
    pub async fn restart(&self) -> Result<(), ProcessError> {
        self.stop()?;
        tokio::time::sleep(RESTART_DELAY).await;
        self.start()
    }

    /// Ask the daemon to reload its configuration in place (SIGUSR1).
    pub fn send_reload(&self) -> Result<(), ProcessError> {
        let pid = self.running_pid().ok_or(ProcessError::NotRunning)?;
        debug!(target: "ensign::process", pid, "sending reload signal");
        send_signal(pid, libc::SIGUSR1).map_err(|err| ProcessError::SignalFailed {
            message: format!("SIGUSR1 to pid {pid}: {err}"),
        })
    }
}

impl Default for ProcessController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
fn process_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    unsafe { libc::kill(pid, 0) == 0 }
}

#[cfg(unix)]
fn send_signal(pid: i32, signal: libc::c_int) -> Result<(), std::io::Error> {
    if unsafe { libc::kill(pid, signal) } == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn controller_with_pid(content: Option<&str>) -> (tempfile::TempDir, ProcessController) {
        let dir = tempfile::tempdir().expect("tempdir");
        let pid_path = dir.path().join("ensignd.pid");
        if let Some(content) = content {
            fs::write(&pid_path, content).expect("write pid");
        }
        let controller = ProcessController::with_paths(pid_path, vec![]);
        (dir, controller)
    }

    #[test]
    fn missing_pid_file_means_not_running() {
        let (_dir, controller) = controller_with_pid(None);
        assert!(!controller.is_running());
        assert!(controller.read_pid().is_none());
    }

    #[test]
    fn unparsable_pid_file_means_not_running() {
        let (_dir, controller) = controller_with_pid(Some("not-a-pid\n"));
        assert!(!controller.is_running());
    }

    #[test]
    fn own_pid_is_alive() {
        let own = std::process::id() as i32;
        let (_dir, controller) = controller_with_pid(Some(&format!("{own}\n")));
        assert!(controller.is_running());
        assert_eq!(controller.running_pid(), Some(own));
    }

    #[test]
    fn stale_pid_means_not_running() {
        // Far beyond any realistic pid_max.
        let (_dir, controller) = controller_with_pid(Some("1073741823"));
        assert!(!controller.is_running());
    }

    #[test]
    fn stop_without_live_pid_is_not_running() {
        let (_dir, controller) = controller_with_pid(None);
        assert!(matches!(controller.stop(), Err(ProcessError::NotRunning)));
        assert!(matches!(
            controller.send_reload(),
            Err(ProcessError::NotRunning)
        ));
    }

    #[test]
    fn start_without_binary_reports_searched_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing_a = dir.path().join("a/ensignd");
        let missing_b = dir.path().join("b/ensignd");
        let controller = ProcessController::with_paths(
            dir.path().join("ensignd.pid"),
            vec![missing_a.clone(), missing_b.clone()],
        );
        match controller.start() {
            Err(ProcessError::BinaryNotFound { searched }) => {
                assert!(searched.contains(missing_a.to_str().unwrap()));
                assert!(searched.contains(missing_b.to_str().unwrap()));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
