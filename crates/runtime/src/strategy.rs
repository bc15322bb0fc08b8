//! Degrading execution-strategy selection.
//!
//! Strategies run in the configured order, each under its own timeout. A
//! strategy that errors, times out or produces blank text is rejected and
//! the next one runs. The static fallback is always last and cannot fail,
//! so every request ends in exactly one [`ConversationTurn`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use ac_domain::capability::{CapabilityState, ExecutionStrategy};
use ac_domain::config::StrategyConfig;
use ac_domain::payload::ExtractedPayload;
use ac_domain::tool::Message;
use ac_domain::trace::TraceEvent;
use ac_payload::PayloadExtractor;
use ac_providers::{GenerateRequest, LanguageModel, ProviderRegistry};
use ac_sessions::{ConversationTurn, Session};

use crate::tool_loop::ToolLoop;

/// Result of running one strategy. Raised errors, timeouts and blank output
/// all map to `Failed`.
enum StepOutcome {
    Produced(Produced),
    Failed(String),
}

#[derive(Default)]
struct Produced {
    text: String,
    thinking: Option<String>,
    tools_used: Vec<String>,
    tool_outputs: Vec<String>,
}

impl StepOutcome {
    /// Apply the success condition: text must be non-blank.
    fn checked(produced: Produced) -> Self {
        if produced.text.trim().is_empty() {
            StepOutcome::Failed("empty response".into())
        } else {
            StepOutcome::Produced(produced)
        }
    }
}

pub struct ExecutionStrategySelector {
    model: Arc<dyn LanguageModel>,
    registry: ProviderRegistry,
    extractor: PayloadExtractor,
    config: StrategyConfig,
    order: Vec<ExecutionStrategy>,
}

impl ExecutionStrategySelector {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        registry: ProviderRegistry,
        extractor: PayloadExtractor,
        config: StrategyConfig,
    ) -> Self {
        let order = config.effective_order();
        Self {
            model,
            registry,
            extractor,
            config,
            order,
        }
    }

    pub fn order(&self) -> &[ExecutionStrategy] {
        &self.order
    }

    pub fn model_id(&self) -> &str {
        self.model.model_id()
    }

    /// Produce exactly one turn for `request`.
    ///
    /// `state` is read once; a re-negotiation running concurrently does not
    /// affect this call. The returned turn is not yet stored.
    pub async fn respond(&self, request: &str, state: &CapabilityState, session: &Session) -> ConversationTurn {
        let mut failures: Vec<(ExecutionStrategy, String)> = Vec::new();

        for &strategy in &self.order {
            if strategy == ExecutionStrategy::StaticFallback {
                break;
            }
            if !strategy.is_applicable(state) {
                let reason = "no reachable tool provider".to_owned();
                reject(strategy, &reason, Duration::ZERO);
                failures.push((strategy, reason));
                continue;
            }

            let started = Instant::now();
            let run = self.run(strategy, request, state, session);
            let outcome = match self.config.timeout_for(strategy) {
                Some(limit) => tokio::time::timeout(limit, run)
                    .await
                    .unwrap_or_else(|_| StepOutcome::Failed(format!("timed out after {limit:?}"))),
                None => run.await,
            };

            match outcome {
                StepOutcome::Produced(produced) => {
                    TraceEvent::StrategySucceeded {
                        strategy: strategy.as_str().to_owned(),
                        tools_used: produced.tools_used.clone(),
                        duration_ms: started.elapsed().as_millis() as u64,
                    }
                    .emit();
                    return self.finish(request, strategy, produced);
                }
                StepOutcome::Failed(reason) => {
                    reject(strategy, &reason, started.elapsed());
                    failures.push((strategy, reason));
                }
            }
        }

        self.fallback_turn(request, &failures)
    }

    /// The static fallback turn for a request whose strategies all failed.
    pub fn fallback_turn(&self, request: &str, failures: &[(ExecutionStrategy, String)]) -> ConversationTurn {
        let context = if failures.is_empty() {
            "no strategy was available".to_owned()
        } else {
            failures
                .iter()
                .map(|(s, reason)| format!("{s}: {reason}"))
                .collect::<Vec<_>>()
                .join("; ")
        };

        let mut text = self.config.fallback_message.replace("{failures}", &context);
        if text.trim().is_empty() {
            text = format!("The assistant could not process this request ({context}).");
        }

        TraceEvent::StrategySucceeded {
            strategy: ExecutionStrategy::StaticFallback.as_str().to_owned(),
            tools_used: Vec::new(),
            duration_ms: 0,
        }
        .emit();
        ConversationTurn::new(request, text, ExecutionStrategy::StaticFallback)
    }

    async fn run(
        &self,
        strategy: ExecutionStrategy,
        request: &str,
        state: &CapabilityState,
        session: &Session,
    ) -> StepOutcome {
        let messages = self.messages(request, session);
        match strategy {
            ExecutionStrategy::ToolAugmented => self.tool_augmented(messages, state).await,
            ExecutionStrategy::ToolFree => self.tool_free(messages).await,
            ExecutionStrategy::StaticFallback => StepOutcome::Failed("not a model strategy".into()),
        }
    }

    async fn tool_augmented(&self, messages: Vec<Message>, state: &CapabilityState) -> StepOutcome {
        let tools = state.tool_definitions();
        if tools.is_empty() {
            return StepOutcome::Failed("reachable providers advertise no tools".into());
        }

        let tool_loop = ToolLoop {
            model: self.model.as_ref(),
            registry: &self.registry,
            state,
            tools,
            max_rounds: self.config.max_tool_rounds,
            temperature: Some(self.config.temperature),
            max_tokens: Some(self.config.max_tokens),
        };
        match tool_loop.run(messages).await {
            Ok(done) => StepOutcome::checked(Produced {
                text: done.text,
                thinking: done.thinking,
                tools_used: done.tools_used,
                tool_outputs: done.tool_outputs,
            }),
            Err(reason) => StepOutcome::Failed(reason),
        }
    }

    async fn tool_free(&self, messages: Vec<Message>) -> StepOutcome {
        let req = GenerateRequest {
            messages,
            tools: Vec::new(),
            temperature: Some(self.config.temperature),
            max_tokens: Some(self.config.max_tokens),
        };
        match self.model.generate(req).await {
            Ok(generation) => StepOutcome::checked(Produced {
                text: generation.text,
                thinking: generation.thinking,
                ..Default::default()
            }),
            Err(e) => StepOutcome::Failed(e.to_string()),
        }
    }

    /// System prompt, recent history, then the request.
    fn messages(&self, request: &str, session: &Session) -> Vec<Message> {
        let mut messages = Vec::new();
        if let Some(prompt) = self.config.system_prompt.as_deref().filter(|p| !p.trim().is_empty()) {
            messages.push(Message::system(prompt));
        }
        messages.extend(session.to_messages(self.config.history_turns));
        messages.push(Message::user(request));
        messages
    }

    fn finish(&self, request: &str, strategy: ExecutionStrategy, produced: Produced) -> ConversationTurn {
        let mut payload = ExtractedPayload::empty();
        if self.extractor.is_enabled() {
            payload = self.extractor.extract(&produced.text);
            if payload.is_empty() && !produced.tool_outputs.is_empty() {
                payload = self.extractor.extract(&produced.tool_outputs.join("\n"));
            }
            if !payload.is_empty() {
                TraceEvent::PayloadExtracted {
                    source: payload.source.as_str().to_owned(),
                    keys: payload.keys().map(str::to_owned).collect(),
                }
                .emit();
            }
        }

        ConversationTurn::new(request, produced.text, strategy)
            .with_tools(produced.tools_used)
            .with_thinking(produced.thinking)
            .with_payload(payload)
    }
}

fn reject(strategy: ExecutionStrategy, reason: &str, elapsed: Duration) {
    TraceEvent::StrategyRejected {
        strategy: strategy.as_str().to_owned(),
        reason: reason.to_owned(),
        duration_ms: elapsed.as_millis() as u64,
    }
    .emit();
}
