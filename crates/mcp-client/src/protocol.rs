//! JSON-RPC 2.0 types for the MCP protocol.
//!
//! Each message is a single line of JSON (newline-delimited).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use ac_domain::tool::ToolDefinition;
use ac_providers::ToolOutput;

pub const PROTOCOL_VERSION: &str = "2024-11-05";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Envelopes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Outgoing message. A request carries an `id` and expects a response;
/// a notification does not.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Outgoing<'a> {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl<'a> Outgoing<'a> {
    pub fn request(id: u64, method: &'a str, params: Option<Value>) -> Self {
        Self { jsonrpc: "2.0", id: Some(id), method, params }
    }

    pub fn notification(method: &'a str) -> Self {
        Self { jsonrpc: "2.0", id: None, method, params: None }
    }
}

/// A JSON-RPC 2.0 response.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RpcResponse {
    pub id: u64,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    /// Split into the result value or the server-reported error.
    pub fn into_result(self) -> Result<Value, RpcError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// MCP payloads
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Parameters of the `initialize` request.
pub fn initialize_params() -> Value {
    serde_json::json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": "agentcore",
            "version": env!("CARGO_PKG_VERSION"),
        }
    })
}

/// Parameters of a `tools/call` request.
pub fn call_params(tool: &str, arguments: Value) -> Value {
    serde_json::json!({ "name": tool, "arguments": arguments })
}

/// One entry of a `tools/list` result.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListedTool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input_schema: Option<Value>,
}

impl From<ListedTool> for ToolDefinition {
    fn from(t: ListedTool) -> Self {
        let mut def = ToolDefinition::new(t.name, t.description);
        if let Some(schema) = t.input_schema {
            def.parameters = schema;
        }
        def
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolsList {
    #[serde(default)]
    pub tools: Vec<ListedTool>,
}

/// The result of `tools/call`.
#[derive(Debug, Clone, Deserialize)]
pub struct CallResult {
    #[serde(default)]
    pub content: Vec<ContentItem>,
    #[serde(default, rename = "isError")]
    pub is_error: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentItem {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl CallResult {
    /// Flatten the content items into one text block. Non-text items are
    /// kept as a `[kind]` marker so the model knows something was returned.
    pub fn into_output(self) -> ToolOutput {
        let content = self
            .content
            .into_iter()
            .map(|item| match item.text {
                Some(text) => text,
                None => format!("[{}]", item.kind),
            })
            .collect::<Vec<_>>()
            .join("\n");
        ToolOutput {
            content,
            is_error: self.is_error,
        }
    }
}
