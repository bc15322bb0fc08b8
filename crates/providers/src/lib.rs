//! Collaborator contracts consumed by the AgentCore runtime.
//!
//! - [`LanguageModel`]: accepts a message list (optionally with tools bound)
//!   and returns text plus any tool calls.
//! - [`ToolProvider`]: a named capability set that may or may not be
//!   reachable; probed with `initialize`, released with `teardown`.
//!
//! [`mock`] holds scripted implementations of both for tests and demos.

pub mod mock;
pub mod registry;
pub mod traits;

// Re-exports for convenience.
pub use registry::ProviderRegistry;
pub use traits::{GenerateRequest, Generation, LanguageModel, ProviderInit, ToolOutput, ToolProvider};
