//! User-scoped filesystem locations for the backend daemon.
//!
//! Everything lives under `~/.ensign`. Tests (and unusual setups) can point
//! the whole tree elsewhere with `ENSIGN_STATE_DIR`.

use std::env;
use std::path::PathBuf;

/// Environment variable overriding the state directory.
pub const STATE_DIR_ENV: &str = "ENSIGN_STATE_DIR";

/// Daemon binary filename.
pub const DAEMON_BINARY: &str = "ensignd";

/// Root of the user-scoped state tree.
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = env::var(STATE_DIR_ENV) {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs_next::home_dir()
        .map(|home| home.join(".ensign"))
        .unwrap_or_else(|| PathBuf::from(".ensign"))
}

/// Unix domain socket the daemon serves its HTTP API on.
pub fn socket_path() -> PathBuf {
    state_dir().join("ensignd.sock")
}

/// PID file written by the daemon on startup.
pub fn pid_path() -> PathBuf {
    state_dir().join("ensignd.pid")
}

/// User-level install location of the daemon binary, checked after the
/// bundled location.
pub fn installed_binary_path() -> PathBuf {
    state_dir().join("bin").join(DAEMON_BINARY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_override_wins() {
        temp_env::with_var(STATE_DIR_ENV, Some("/tmp/ensign-test"), || {
            assert_eq!(state_dir(), PathBuf::from("/tmp/ensign-test"));
            assert_eq!(socket_path(), PathBuf::from("/tmp/ensign-test/ensignd.sock"));
            assert_eq!(pid_path(), PathBuf::from("/tmp/ensign-test/ensignd.pid"));
        });
    }

    #[test]
    fn default_is_under_home() {
        temp_env::with_var(STATE_DIR_ENV, None::<&str>, || {
            let dir = state_dir();
            assert!(dir.ends_with(".ensign"));
        });
    }
}
