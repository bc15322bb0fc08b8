//! Shared types for the AgentCore runtime crates: the error type, the
//! configuration tree, provider-agnostic messages and tool definitions,
//! capability types and structured trace events.

pub mod capability;
pub mod config;
pub mod error;
pub mod payload;
pub mod tool;
pub mod trace;
