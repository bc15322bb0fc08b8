//! Tool provider definitions. Each entry describes one MCP server reached
//! over a subprocess; the client logic lives in `ac-mcp-client`.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a single tool provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolProviderConfig {
    /// Unique provider name, referenced by bundle members.
    pub id: String,

    /// The command to spawn (e.g. `"uvx"`).
    #[serde(default)]
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Transport type (`"stdio"` or `"sse"`).
    #[serde(default)]
    pub transport: TransportKind,

    /// URL for the SSE transport.
    #[serde(default)]
    pub url: Option<String>,

    /// Extra environment variables for the spawned process.
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Per-request timeout once the provider is running.
    #[serde(default = "d_30")]
    pub request_timeout_secs: u64,
}

impl ToolProviderConfig {
    pub fn stdio(id: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            id: id.into(),
            command: command.into(),
            args,
            transport: TransportKind::Stdio,
            url: None,
            env: HashMap::new(),
            request_timeout_secs: d_30(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Stdio,
    Sse,
}

fn d_30() -> u64 {
    30
}
