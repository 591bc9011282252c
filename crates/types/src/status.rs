//! Backend status wire shapes (`GET /status`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timestamp;

/// Sub-status of one configured MCP server, as reported by the backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct McpServerStatus {
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub tool_count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub builtin: bool,
}

/// Last successfully retrieved backend status.
///
/// Replaced wholesale on each successful poll; reset to `Default` whenever
/// the reconciler classifies the backend as disconnected.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StatusSnapshot {
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub pid: i64,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub uptime: String,
    #[serde(default)]
    pub uptime_seconds: i64,
    #[serde(default, with = "timestamp::option_lenient")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_tools: i64,
    #[serde(default)]
    pub mcp_servers: Vec<McpServerStatus>,
}

impl StatusSnapshot {
    /// Number of MCP servers currently connected.
    pub fn connected_servers(&self) -> usize {
        self.mcp_servers.iter().filter(|s| s.connected).count()
    }
}
