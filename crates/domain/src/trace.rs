use serde::Serialize;

/// Structured trace events emitted across all AgentCore crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    BundleAttempted {
        bundle: String,
        succeeded: bool,
        reachable: Vec<String>,
        reason: Option<String>,
        duration_ms: u64,
    },
    NegotiationCompleted {
        bundle: Option<String>,
        reachable: Vec<String>,
        generation: u64,
    },
    StrategyRejected {
        strategy: String,
        reason: String,
        duration_ms: u64,
    },
    StrategySucceeded {
        strategy: String,
        tools_used: Vec<String>,
        duration_ms: u64,
    },
    ToolInvoked {
        provider: String,
        tool: String,
        is_error: bool,
        duration_ms: u64,
    },
    PayloadExtracted {
        source: String,
        keys: Vec<String>,
    },
    SessionLoaded {
        user_id: String,
        session_id: String,
        turns: usize,
    },
    SessionLoadFailed {
        user_id: String,
        session_id: String,
        reason: String,
    },
    SessionPersisted {
        user_id: String,
        session_id: String,
        turns: usize,
    },
    PersistFailed {
        user_id: String,
        session_id: String,
        operation: String,
        reason: String,
    },
    SessionCleared {
        user_id: String,
        session_id: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        match self {
            TraceEvent::PersistFailed { .. } => {
                tracing::error!(trace_event = %json, "ac_event");
            }
            TraceEvent::SessionLoadFailed { .. } => {
                tracing::warn!(trace_event = %json, "ac_event");
            }
            _ => tracing::info!(trace_event = %json, "ac_event"),
        }
    }
}
