use ac_domain::error::Result;
use ac_domain::tool::{Message, ToolCall, ToolDefinition};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Language model
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A provider-agnostic generation request.
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    pub messages: Vec<Message>,
    /// Tools bound for this call. Empty = tool-free generation.
    pub tools: Vec<ToolDefinition>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// What the model produced for one request.
#[derive(Debug, Clone, Default)]
pub struct Generation {
    pub text: String,
    /// Tool calls the model wants dispatched before it answers.
    pub tool_calls: Vec<ToolCall>,
    /// Reasoning content, for models that expose it.
    pub thinking: Option<String>,
}

impl Generation {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Trait every language model adapter implements.
#[async_trait::async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, req: GenerateRequest) -> Result<Generation>;

    /// Identifier used in logs.
    fn model_id(&self) -> &str;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool provider
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Outcome of a provider probe.
#[derive(Debug, Clone, Default)]
pub struct ProviderInit {
    /// `false` when the provider answered but is not usable.
    pub ready: bool,
    pub tools: Vec<ToolDefinition>,
}

impl ProviderInit {
    pub fn ready(tools: Vec<ToolDefinition>) -> Self {
        Self { ready: true, tools }
    }

    pub fn not_ready() -> Self {
        Self::default()
    }
}

/// Result of a tool invocation, fed back to the model verbatim.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// An independently reachable, named set of callable tools.
///
/// Providers carry their own configuration; `initialize` may be called again
/// to re-probe, and must then replace any previous connection.
#[async_trait::async_trait]
pub trait ToolProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Start or connect to the provider and discover its tools.
    async fn initialize(&self) -> Result<ProviderInit>;

    async fn call_tool(&self, tool: &str, arguments: serde_json::Value) -> Result<ToolOutput>;

    /// Release the provider. Never fails; problems are logged.
    async fn teardown(&self);
}
