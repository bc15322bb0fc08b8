//! `ac-mcp-client`: a [`ToolProvider`](ac_providers::ToolProvider) backed by
//! an MCP (Model Context Protocol) server running as a child process.
//!
//! - [`protocol`]: JSON-RPC 2.0 message types and MCP payloads.
//! - [`transport`]: newline-delimited JSON over the child's stdin/stdout.
//! - [`provider`]: the handshake, tool discovery and dispatch.
//!
//! ```rust,ignore
//! use ac_mcp_client::McpToolProvider;
//!
//! let provider = McpToolProvider::new(config.providers[0].clone());
//! let init = provider.initialize().await?;
//! for tool in &init.tools {
//!     println!("{}: {}", provider.name(), tool.name);
//! }
//! ```

pub mod protocol;
pub mod provider;
pub mod transport;

pub use provider::{McpError, McpToolProvider};
pub use transport::{StdioTransport, TransportError};
