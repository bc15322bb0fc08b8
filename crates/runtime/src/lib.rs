//! The AgentCore runtime: capability negotiation, degrading strategy
//! selection and the [`Agent`] facade tying them to session memory.

pub mod agent;
pub mod negotiator;
pub mod strategy;

mod tool_loop;

pub use agent::{Agent, AgentStatus, AgentTurn};
pub use negotiator::CapabilityNegotiator;
pub use strategy::ExecutionStrategySelector;
