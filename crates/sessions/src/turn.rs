use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ac_domain::capability::ExecutionStrategy;
use ac_domain::payload::ExtractedPayload;

/// One request/response exchange.
///
/// `ordinal` is assigned by the store when the turn is appended; a turn
/// built by the caller carries 0 until then.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    #[serde(default)]
    pub ordinal: u64,
    pub timestamp: DateTime<Utc>,
    pub request: String,
    pub response: String,
    pub strategy: ExecutionStrategy,
    #[serde(default)]
    pub tools_used: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<ExtractedPayload>,
}

impl ConversationTurn {
    pub fn new(request: impl Into<String>, response: impl Into<String>, strategy: ExecutionStrategy) -> Self {
        Self {
            ordinal: 0,
            timestamp: Utc::now(),
            request: request.into(),
            response: response.into(),
            strategy,
            tools_used: Vec::new(),
            thinking: None,
            payload: None,
        }
    }

    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.tools_used = tools;
        self
    }

    pub fn with_thinking(mut self, thinking: Option<String>) -> Self {
        self.thinking = thinking.filter(|t| !t.trim().is_empty());
        self
    }

    /// Attach `payload` unless it is empty.
    pub fn with_payload(mut self, payload: ExtractedPayload) -> Self {
        self.payload = (!payload.is_empty()).then_some(payload);
        self
    }
}
