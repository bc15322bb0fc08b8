//! Model/tool round-trips for tool-augmented generation.

use std::time::Instant;

use ac_domain::capability::CapabilityState;
use ac_domain::tool::{Message, ToolCall, ToolDefinition};
use ac_domain::trace::TraceEvent;
use ac_providers::{GenerateRequest, LanguageModel, ProviderRegistry, ToolOutput};

/// What a finished tool loop produced.
#[derive(Debug, Default)]
pub(crate) struct LoopResult {
    pub text: String,
    pub thinking: Option<String>,
    /// Dispatched tool names in first-use order, without repeats.
    pub tools_used: Vec<String>,
    /// Contents of successful tool results, in dispatch order.
    pub tool_outputs: Vec<String>,
}

pub(crate) struct ToolLoop<'a> {
    pub model: &'a dyn LanguageModel,
    pub registry: &'a ProviderRegistry,
    pub state: &'a CapabilityState,
    pub tools: Vec<ToolDefinition>,
    pub max_rounds: usize,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl ToolLoop<'_> {
    /// Generate until the model answers without requesting tools.
    ///
    /// Tool failures are fed back to the model as error results. The loop
    /// itself fails when the model errors or is still calling tools after
    /// `max_rounds` dispatching rounds.
    pub async fn run(&self, mut messages: Vec<Message>) -> Result<LoopResult, String> {
        let mut result = LoopResult::default();

        for round in 0..=self.max_rounds {
            let req = GenerateRequest {
                messages: messages.clone(),
                tools: self.tools.clone(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
            };
            let generation = self.model.generate(req).await.map_err(|e| e.to_string())?;

            if let Some(thinking) = generation.thinking.filter(|t| !t.trim().is_empty()) {
                result.thinking = Some(thinking);
            }

            if generation.tool_calls.is_empty() {
                result.text = generation.text;
                return Ok(result);
            }
            if round == self.max_rounds {
                break;
            }

            tracing::debug!(round, calls = generation.tool_calls.len(), "dispatching tool calls");
            messages.push(Message::assistant_tool_calls(
                generation.text,
                generation.tool_calls.clone(),
            ));
            for call in &generation.tool_calls {
                let output = self.dispatch(call).await;
                if !result.tools_used.contains(&call.tool_name) {
                    result.tools_used.push(call.tool_name.clone());
                }
                if !output.is_error {
                    result.tool_outputs.push(output.content.clone());
                }
                messages.push(Message::tool_result(&call.call_id, output.content, output.is_error));
            }
        }

        Err(format!(
            "model still requesting tools after {} rounds",
            self.max_rounds
        ))
    }

    async fn dispatch(&self, call: &ToolCall) -> ToolOutput {
        let Some(provider_name) = self.state.provider_for_tool(&call.tool_name) else {
            tracing::warn!(tool = %call.tool_name, "model called a tool no reachable provider offers");
            return ToolOutput::error(format!("unknown tool: {}", call.tool_name));
        };
        let Some(provider) = self.registry.get(provider_name) else {
            return ToolOutput::error(format!("provider {provider_name} is not available"));
        };

        let started = Instant::now();
        let output = match provider.call_tool(&call.tool_name, call.arguments.clone()).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(provider = %provider_name, tool = %call.tool_name, error = %e, "tool call failed");
                ToolOutput::error(format!("tool call failed: {e}"))
            }
        };

        TraceEvent::ToolInvoked {
            provider: provider_name.to_owned(),
            tool: call.tool_name.clone(),
            is_error: output.is_error,
            duration_ms: started.elapsed().as_millis() as u64,
        }
        .emit();
        output
    }
}
