//! Scripted collaborators for deterministic tests.
//!
//! Neither type touches the network or spawns processes.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use ac_domain::error::{Error, Result};
use ac_domain::tool::{ToolCall, ToolDefinition};

use crate::traits::*;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ScriptedModel
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One scripted model behavior.
#[derive(Debug, Clone)]
pub enum Step {
    Reply(Generation),
    Fail(String),
    /// Sleep, then fail. Used to exercise timeouts.
    Stall(Duration),
}

impl Step {
    pub fn reply(text: &str) -> Self {
        Step::Reply(Generation::text(text))
    }

    pub fn tool_call(tool: &str, arguments: Value) -> Self {
        Step::Reply(Generation {
            tool_calls: vec![ToolCall {
                call_id: format!("call_{}", uuid::Uuid::new_v4()),
                tool_name: tool.to_owned(),
                arguments,
            }],
            ..Default::default()
        })
    }

    pub fn fail(msg: &str) -> Self {
        Step::Fail(msg.to_owned())
    }
}

struct Script {
    queue: VecDeque<Step>,
    fallback: Step,
}

impl Script {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            fallback: Step::fail("script exhausted"),
        }
    }

    fn next(&mut self) -> Step {
        self.queue.pop_front().unwrap_or_else(|| self.fallback.clone())
    }
}

/// A language model that replays queued steps.
///
/// Requests with tools bound and tool-free requests draw from separate
/// scripts, so a test can make one mode fail while the other answers.
pub struct ScriptedModel {
    id: String,
    with_tools: Mutex<Script>,
    without_tools: Mutex<Script>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedModel {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            with_tools: Mutex::new(Script::new()),
            without_tools: Mutex::new(Script::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a step for requests that have tools bound.
    pub fn with_tools(self, step: Step) -> Self {
        self.with_tools.lock().queue.push_back(step);
        self
    }

    /// Queue a step for tool-free requests.
    pub fn without_tools(self, step: Step) -> Self {
        self.without_tools.lock().queue.push_back(step);
        self
    }

    /// Behavior once the tool-bound queue is empty.
    pub fn always_with_tools(self, step: Step) -> Self {
        self.with_tools.lock().fallback = step;
        self
    }

    /// Behavior once the tool-free queue is empty.
    pub fn always_without_tools(self, step: Step) -> Self {
        self.without_tools.lock().fallback = step;
        self
    }

    /// Same fallback behavior for both modes.
    pub fn always(self, step: Step) -> Self {
        self.always_with_tools(step.clone()).always_without_tools(step)
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, req: GenerateRequest) -> Result<Generation> {
        let step = if req.tools.is_empty() {
            self.without_tools.lock().next()
        } else {
            self.with_tools.lock().next()
        };
        self.requests.lock().push(req);

        match step {
            Step::Reply(generation) => Ok(generation),
            Step::Fail(msg) => Err(Error::Model(msg)),
            Step::Stall(duration) => {
                tokio::time::sleep(duration).await;
                Err(Error::Model("stalled".into()))
            }
        }
    }

    fn model_id(&self) -> &str {
        &self.id
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// StaticToolProvider
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
enum InitBehavior {
    Ready,
    NotReady,
    Fail(String),
    Stall(Duration),
}

/// A tool provider with canned probe results and tool outputs.
pub struct StaticToolProvider {
    name: String,
    init: InitBehavior,
    tools: Vec<ToolDefinition>,
    outputs: HashMap<String, ToolOutput>,
    down: AtomicBool,
    init_calls: AtomicUsize,
    teardown_calls: AtomicUsize,
    calls: Mutex<Vec<(String, Value)>>,
}

impl StaticToolProvider {
    /// A provider that initializes successfully with no tools.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            init: InitBehavior::Ready,
            tools: Vec::new(),
            outputs: HashMap::new(),
            down: AtomicBool::new(false),
            init_calls: AtomicUsize::new(0),
            teardown_calls: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Advertise `tool`, answering calls with `output`.
    pub fn with_tool(mut self, tool: &str, output: &str) -> Self {
        self.tools.push(ToolDefinition::new(tool, format!("{tool} (static)")));
        self.outputs.insert(tool.to_owned(), ToolOutput::ok(output));
        self
    }

    /// Advertise `tool`, answering calls with an error result.
    pub fn with_failing_tool(mut self, tool: &str, message: &str) -> Self {
        self.tools.push(ToolDefinition::new(tool, format!("{tool} (static)")));
        self.outputs.insert(tool.to_owned(), ToolOutput::error(message));
        self
    }

    /// `initialize` returns an error.
    pub fn failing(mut self, message: &str) -> Self {
        self.init = InitBehavior::Fail(message.to_owned());
        self
    }

    /// `initialize` succeeds but reports the provider as not ready.
    pub fn not_ready(mut self) -> Self {
        self.init = InitBehavior::NotReady;
        self
    }

    /// `initialize` sleeps for `duration` before succeeding.
    pub fn stalling(mut self, duration: Duration) -> Self {
        self.init = InitBehavior::Stall(duration);
        self
    }

    /// While set, `initialize` fails regardless of the configured behavior.
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn teardown_calls(&self) -> usize {
        self.teardown_calls.load(Ordering::SeqCst)
    }

    /// Tool calls received so far as `(tool, arguments)`.
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ToolProvider for StaticToolProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn initialize(&self) -> Result<ProviderInit> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return Err(Error::provider(&self.name, "provider is down"));
        }
        match &self.init {
            InitBehavior::Ready => Ok(ProviderInit::ready(self.tools.clone())),
            InitBehavior::NotReady => Ok(ProviderInit::not_ready()),
            InitBehavior::Fail(msg) => Err(Error::provider(&self.name, msg.clone())),
            InitBehavior::Stall(duration) => {
                tokio::time::sleep(*duration).await;
                Ok(ProviderInit::ready(self.tools.clone()))
            }
        }
    }

    async fn call_tool(&self, tool: &str, arguments: Value) -> Result<ToolOutput> {
        self.calls.lock().push((tool.to_owned(), arguments));
        self.outputs
            .get(tool)
            .cloned()
            .ok_or_else(|| Error::provider(&self.name, format!("unknown tool: {tool}")))
    }

    async fn teardown(&self) {
        self.teardown_calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_model_separates_modes() {
        let model = ScriptedModel::new("test")
            .with_tools(Step::fail("tools broken"))
            .without_tools(Step::reply("plain answer"));

        let tooled = GenerateRequest {
            tools: vec![ToolDefinition::new("search", "")],
            ..Default::default()
        };
        assert!(model.generate(tooled).await.is_err());

        let plain = model.generate(GenerateRequest::default()).await.unwrap();
        assert_eq!(plain.text, "plain answer");
        assert_eq!(model.request_count(), 2);
    }

    #[tokio::test]
    async fn scripted_model_falls_back_when_queue_empty() {
        let model = ScriptedModel::new("test").always(Step::reply("again"));
        for _ in 0..3 {
            let g = model.generate(GenerateRequest::default()).await.unwrap();
            assert_eq!(g.text, "again");
        }
    }

    #[tokio::test]
    async fn exhausted_script_fails() {
        let model = ScriptedModel::new("test");
        assert!(model.generate(GenerateRequest::default()).await.is_err());
    }

    #[tokio::test]
    async fn static_provider_answers_known_tools() {
        let provider = StaticToolProvider::new("amazon").with_tool("search", "3 results");
        let init = provider.initialize().await.unwrap();
        assert!(init.ready);
        assert_eq!(init.tools.len(), 1);

        let out = provider
            .call_tool("search", serde_json::json!({ "q": "socks" }))
            .await
            .unwrap();
        assert_eq!(out, ToolOutput::ok("3 results"));
        assert!(provider.call_tool("buy", Value::Null).await.is_err());
        assert_eq!(provider.calls().len(), 2);
    }

    #[tokio::test]
    async fn static_provider_failure_modes() {
        assert!(StaticToolProvider::new("a").failing("boom").initialize().await.is_err());
        let init = StaticToolProvider::new("b").not_ready().initialize().await.unwrap();
        assert!(!init.ready);

        let toggled = StaticToolProvider::new("c");
        toggled.set_down(true);
        assert!(toggled.initialize().await.is_err());
        toggled.set_down(false);
        assert!(toggled.initialize().await.unwrap().ready);
    }
}
