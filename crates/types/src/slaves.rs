//! Slave registry and pairing wire shapes (`/slaves`, `/slaves/pending`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timestamp;

/// One paired remote node as reported by `GET /slaves`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SlaveInfo {
    pub hostname: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default)]
    pub tool_count: i64,
    #[serde(default, with = "timestamp::option_lenient")]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default, with = "timestamp::option_lenient")]
    pub connected_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub enabled: bool,
}

impl SlaveInfo {
    /// Whether the node currently holds a live connection to the master.
    pub fn is_connected(&self) -> bool {
        self.status.eq_ignore_ascii_case("connected")
    }
}

/// An outstanding pairing attempt from `GET /slaves/pending`.
///
/// Identity is the pairing code, never the hostname alone: a host may issue
/// a fresh code after a prior one expires.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PairingRequest {
    pub hostname: String,
    pub pairing_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, with = "timestamp::option_lenient")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, with = "timestamp::option_lenient")]
    pub expires_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connected_flag_follows_status_string() {
        let mut slave = SlaveInfo {
            hostname: "atlas".into(),
            status: "connected".into(),
            ..Default::default()
        };
        assert!(slave.is_connected());
        slave.status = "Connected".into();
        assert!(slave.is_connected());
        slave.status = "offline".into();
        assert!(!slave.is_connected());
    }

    #[test]
    fn decodes_pending_list_entry() {
        let payload = r#"[{
            "hostname": "atlas",
            "pairing_code": "483-221",
            "status": "pending",
            "created_at": "2026-08-23T09:00:00Z",
            "expires_at": "2026-08-23T09:10:00Z"
        }]"#;
        let pending: Vec<PairingRequest> = serde_json::from_str(payload).expect("decode");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].pairing_code, "483-221");
        assert!(pending[0].expires_at.is_some());
    }
}
