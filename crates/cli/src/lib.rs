//! `agentcore`: operator commands over the AgentCore runtime.

pub mod cli;
