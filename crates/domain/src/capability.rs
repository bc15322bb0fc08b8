use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tool::ToolDefinition;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Bundles
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A named set of tool providers attempted together during negotiation.
/// Bundles are tried in declaration order, richest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityBundle {
    pub name: String,
    #[serde(default)]
    pub members: Vec<BundleMember>,
}

/// One provider inside a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleMember {
    pub provider: String,
    /// A required member that fails to initialize fails the whole bundle.
    /// Optional members are marked unreachable individually.
    #[serde(default = "d_true")]
    pub required: bool,
}

impl CapabilityBundle {
    pub fn new(name: impl Into<String>, members: Vec<BundleMember>) -> Self {
        Self { name: name.into(), members }
    }
}

impl BundleMember {
    pub fn required(provider: impl Into<String>) -> Self {
        Self { provider: provider.into(), required: true }
    }
    pub fn optional(provider: impl Into<String>) -> Self {
        Self { provider: provider.into(), required: false }
    }
}

fn d_true() -> bool {
    true
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Capability state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Probe outcome for one provider of the selected bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub name: String,
    pub required: bool,
    pub reachable: bool,
    /// Tools advertised by the provider (empty when unreachable).
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    /// Why the probe failed, when it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProviderStatus {
    pub fn reachable(name: impl Into<String>, required: bool, tools: Vec<ToolDefinition>) -> Self {
        Self {
            name: name.into(),
            required,
            reachable: true,
            tools,
            error: None,
        }
    }

    pub fn unreachable(name: impl Into<String>, required: bool, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required,
            reachable: false,
            tools: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Result of one negotiation: which bundle won and which of its providers
/// answered their probe. Immutable; re-negotiation produces a new value with
/// a higher `generation`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityState {
    /// Name of the selected bundle, `None` when every bundle failed.
    pub bundle: Option<String>,
    /// Providers of the selected bundle, in bundle order.
    pub providers: Vec<ProviderStatus>,
    /// 0 = never negotiated.
    pub generation: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negotiated_at: Option<DateTime<Utc>>,
}

impl Default for CapabilityState {
    fn default() -> Self {
        Self::unnegotiated()
    }
}

impl CapabilityState {
    /// State before the first negotiation has completed.
    pub fn unnegotiated() -> Self {
        Self {
            bundle: None,
            providers: Vec::new(),
            generation: 0,
            negotiated_at: None,
        }
    }

    /// Every bundle failed: a valid state with zero reachable providers.
    pub fn exhausted(generation: u64) -> Self {
        Self {
            bundle: None,
            providers: Vec::new(),
            generation,
            negotiated_at: Some(Utc::now()),
        }
    }

    pub fn selected(bundle: impl Into<String>, providers: Vec<ProviderStatus>, generation: u64) -> Self {
        Self {
            bundle: Some(bundle.into()),
            providers,
            generation,
            negotiated_at: Some(Utc::now()),
        }
    }

    pub fn is_negotiated(&self) -> bool {
        self.generation > 0
    }

    pub fn is_reachable(&self, provider: &str) -> bool {
        self.providers
            .iter()
            .any(|p| p.name == provider && p.reachable)
    }

    pub fn has_reachable_provider(&self) -> bool {
        self.providers.iter().any(|p| p.reachable)
    }

    pub fn reachable_providers(&self) -> impl Iterator<Item = &ProviderStatus> {
        self.providers.iter().filter(|p| p.reachable)
    }

    /// Tool definitions of all reachable providers. When two providers
    /// advertise the same tool name, the earlier provider in bundle order wins.
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut seen = std::collections::HashSet::new();
        self.reachable_providers()
            .flat_map(|p| p.tools.iter())
            .filter(|t| seen.insert(t.name.clone()))
            .cloned()
            .collect()
    }

    /// The reachable provider that advertised `tool`.
    pub fn provider_for_tool(&self, tool: &str) -> Option<&str> {
        self.reachable_providers()
            .find(|p| p.tools.iter().any(|t| t.name == tool))
            .map(|p| p.name.as_str())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Execution strategies
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Ways to produce a response, ordered by preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    /// Language model bound to the reachable providers' tools.
    ToolAugmented,
    /// Language model with no tools bound.
    ToolFree,
    /// Deterministic canned response. Never fails.
    StaticFallback,
}

impl ExecutionStrategy {
    pub const PREFERENCE: [ExecutionStrategy; 3] = [
        ExecutionStrategy::ToolAugmented,
        ExecutionStrategy::ToolFree,
        ExecutionStrategy::StaticFallback,
    ];

    /// Whether this strategy may run under `state`.
    pub fn is_applicable(self, state: &CapabilityState) -> bool {
        match self {
            ExecutionStrategy::ToolAugmented => state.has_reachable_provider(),
            ExecutionStrategy::ToolFree | ExecutionStrategy::StaticFallback => true,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStrategy::ToolAugmented => "tool_augmented",
            ExecutionStrategy::ToolFree => "tool_free",
            ExecutionStrategy::StaticFallback => "static_fallback",
        }
    }
}

impl fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
