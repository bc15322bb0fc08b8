use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capability::ExecutionStrategy;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Execution strategies
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Fallthrough order. `static_fallback` is always appended when absent.
    #[serde(default = "d_order")]
    pub order: Vec<ExecutionStrategy>,
    #[serde(default = "d_300")]
    pub tool_augmented_timeout_secs: u64,
    #[serde(default = "d_300")]
    pub tool_free_timeout_secs: u64,
    /// Maximum model round-trips that dispatch tool calls in one request.
    #[serde(default = "d_8")]
    pub max_tool_rounds: usize,
    /// Recent turns replayed to the model as context.
    #[serde(default = "d_3")]
    pub history_turns: usize,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default = "d_temperature")]
    pub temperature: f32,
    #[serde(default = "d_4096")]
    pub max_tokens: u32,
    /// Static fallback text. `{failures}` is replaced with the rejected
    /// strategies and their reasons.
    #[serde(default = "d_fallback_message")]
    pub fallback_message: String,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            order: d_order(),
            tool_augmented_timeout_secs: d_300(),
            tool_free_timeout_secs: d_300(),
            max_tool_rounds: d_8(),
            history_turns: d_3(),
            system_prompt: None,
            temperature: d_temperature(),
            max_tokens: d_4096(),
            fallback_message: d_fallback_message(),
        }
    }
}

impl StrategyConfig {
    /// Configured order with duplicates removed and the static fallback
    /// guaranteed to be the last step.
    pub fn effective_order(&self) -> Vec<ExecutionStrategy> {
        let mut order: Vec<ExecutionStrategy> = Vec::with_capacity(3);
        for s in &self.order {
            if *s != ExecutionStrategy::StaticFallback && !order.contains(s) {
                order.push(*s);
            }
        }
        order.push(ExecutionStrategy::StaticFallback);
        order
    }

    pub fn timeout_for(&self, strategy: ExecutionStrategy) -> Option<Duration> {
        match strategy {
            ExecutionStrategy::ToolAugmented => {
                Some(Duration::from_secs(self.tool_augmented_timeout_secs))
            }
            ExecutionStrategy::ToolFree => Some(Duration::from_secs(self.tool_free_timeout_secs)),
            ExecutionStrategy::StaticFallback => None,
        }
    }
}

fn d_order() -> Vec<ExecutionStrategy> {
    ExecutionStrategy::PREFERENCE.to_vec()
}
fn d_300() -> u64 {
    300
}
fn d_8() -> usize {
    8
}
fn d_3() -> usize {
    3
}
fn d_temperature() -> f32 {
    0.7
}
fn d_4096() -> u32 {
    4096
}
fn d_fallback_message() -> String {
    "Sorry, the assistant is temporarily unavailable and could not process your request \
     ({failures}). Please try again later."
        .into()
}
