//! The agent facade: negotiation, strategy selection and session memory
//! behind one handle.

use std::sync::Arc;

use serde::Serialize;

use ac_domain::capability::{CapabilityState, ExecutionStrategy};
use ac_domain::config::AgentConfig;
use ac_mcp_client::McpToolProvider;
use ac_payload::PayloadExtractor;
use ac_providers::{LanguageModel, ProviderRegistry};
use ac_sessions::{
    ConversationTurn, DurableStore, FileStore, SessionKey, SessionMemoryStore, SessionSummary, StoreHealth,
};

use crate::negotiator::CapabilityNegotiator;
use crate::strategy::ExecutionStrategySelector;

/// A committed turn and the session it was stored under.
#[derive(Debug, Clone, Serialize)]
pub struct AgentTurn {
    pub key: SessionKey,
    pub turn: ConversationTurn,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderReport {
    pub name: String,
    pub required: bool,
    pub reachable: bool,
    pub tool_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Operator-facing snapshot of the agent.
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub model: String,
    pub negotiated: bool,
    pub generation: u64,
    pub bundle: Option<String>,
    pub providers: Vec<ProviderReport>,
    pub tool_count: usize,
    pub strategy_order: Vec<ExecutionStrategy>,
    pub store: StoreHealth,
}

struct AgentInner {
    negotiator: CapabilityNegotiator,
    selector: ExecutionStrategySelector,
    store: SessionMemoryStore,
    default_user: String,
}

/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Agent {
    inner: Arc<AgentInner>,
}

impl Agent {
    pub fn new(
        negotiator: CapabilityNegotiator,
        selector: ExecutionStrategySelector,
        store: SessionMemoryStore,
        default_user: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(AgentInner {
                negotiator,
                selector,
                store,
                default_user: default_user.into(),
            }),
        }
    }

    /// Wire an agent from configuration: one MCP provider per configured
    /// provider and a file-backed session store under `sessions.state_path`.
    pub fn from_config(config: &AgentConfig, model: Arc<dyn LanguageModel>) -> Self {
        let mut registry = ProviderRegistry::new();
        for provider in &config.providers {
            registry.register(Arc::new(McpToolProvider::new(provider.clone())));
        }
        let durable: Arc<dyn DurableStore> = Arc::new(FileStore::new(config.sessions.state_path.clone()));
        Self::with_parts(config, model, registry, durable)
    }

    /// Like [`Agent::from_config`], with caller-supplied providers and store.
    pub fn with_parts(
        config: &AgentConfig,
        model: Arc<dyn LanguageModel>,
        registry: ProviderRegistry,
        durable: Arc<dyn DurableStore>,
    ) -> Self {
        let negotiator = CapabilityNegotiator::from_config(registry.clone(), config);
        let selector = ExecutionStrategySelector::new(
            model,
            registry,
            PayloadExtractor::new(&config.extraction),
            config.strategy.clone(),
        );
        let store = SessionMemoryStore::new(durable, config.sessions.max_turns)
            .with_cache_limit(config.sessions.max_cached_sessions);
        Self::new(negotiator, selector, store, config.sessions.default_user.clone())
    }

    pub fn negotiator(&self) -> &CapabilityNegotiator {
        &self.inner.negotiator
    }

    pub fn store(&self) -> &SessionMemoryStore {
        &self.inner.store
    }

    /// Run the startup negotiation if it has not happened yet.
    pub async fn start(&self) -> Arc<CapabilityState> {
        self.inner.negotiator.ensure_negotiated().await
    }

    /// Re-negotiate capabilities. Requests already running keep the state
    /// they started with.
    pub async fn reset_capabilities(&self) -> Arc<CapabilityState> {
        self.inner.negotiator.renegotiate().await
    }

    /// The session key a request would be stored under.
    pub fn session_key(&self, user_id: Option<&str>, session_id: Option<String>) -> SessionKey {
        let user = user_id
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(self.inner.default_user.as_str());
        SessionKey::new(user, session_id)
    }

    /// Answer `request` and commit the turn to the session.
    ///
    /// Always yields a turn. The work runs on its own task, so a caller that
    /// stops waiting does not leave the session half-updated: the turn is
    /// still produced and stored.
    pub async fn handle(&self, user_id: Option<&str>, session_id: Option<String>, request: &str) -> AgentTurn {
        let key = self.session_key(user_id, session_id);
        let inner = self.inner.clone();
        let task_key = key.clone();
        let task_request = request.to_owned();

        let task = tokio::spawn(async move {
            let state = inner.negotiator.ensure_negotiated().await;
            let session = inner.store.session(&task_key).await;
            let turn = inner.selector.respond(&task_request, &state, &session).await;
            drop(state);
            inner.negotiator.release_retired().await;
            inner.store.append(&task_key, turn).await
        });

        match task.await {
            Ok(turn) => AgentTurn { key, turn },
            Err(e) => {
                tracing::error!(session = %key, error = %e, "request task failed");
                let turn = self.inner.selector.fallback_turn(
                    request,
                    &[(ExecutionStrategy::StaticFallback, format!("internal error: {e}"))],
                );
                AgentTurn { key, turn }
            }
        }
    }

    pub async fn history(&self, key: &SessionKey) -> Vec<ConversationTurn> {
        self.inner.store.history(key).await
    }

    pub async fn clear(&self, key: &SessionKey) {
        self.inner.store.clear(key).await
    }

    pub async fn list_sessions(&self, user_id: &str) -> Vec<SessionSummary> {
        self.inner.store.list_sessions(user_id).await
    }

    pub fn status(&self) -> AgentStatus {
        let state = self.inner.negotiator.snapshot();
        let providers = state
            .providers
            .iter()
            .map(|p| ProviderReport {
                name: p.name.clone(),
                required: p.required,
                reachable: p.reachable,
                tool_count: p.tools.len(),
                error: p.error.clone(),
            })
            .collect();

        AgentStatus {
            model: self.inner.selector.model_id().to_owned(),
            negotiated: state.is_negotiated(),
            generation: state.generation,
            bundle: state.bundle.clone(),
            providers,
            tool_count: state.tool_definitions().len(),
            strategy_order: self.inner.selector.order().to_vec(),
            store: self.inner.store.health(),
        }
    }

    /// Tear down every tool provider.
    pub async fn shutdown(&self) {
        self.inner.negotiator.shutdown().await;
    }
}
