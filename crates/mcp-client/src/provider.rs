//! MCP-backed tool provider: handshake, tool discovery and dispatch.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use ac_domain::config::{ToolProviderConfig, TransportKind};
use ac_domain::error::Error;
use ac_domain::tool::ToolDefinition;
use ac_providers::{ProviderInit, ToolOutput, ToolProvider};

use crate::protocol::{self, CallResult, ToolsList};
use crate::transport::{StdioTransport, TransportError};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// McpToolProvider
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One configured MCP server.
///
/// `initialize` spawns a fresh process and swaps it in only after the
/// handshake succeeded. Calls already running keep their own handle to the
/// previous process, which is killed once the last of them finishes.
pub struct McpToolProvider {
    config: ToolProviderConfig,
    connection: RwLock<Option<Arc<StdioTransport>>>,
}

impl McpToolProvider {
    pub fn new(config: ToolProviderConfig) -> Self {
        Self {
            config,
            connection: RwLock::new(None),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection
            .read()
            .as_ref()
            .is_some_and(|t| t.is_alive())
    }

    async fn connect(&self) -> Result<(Arc<StdioTransport>, Vec<ToolDefinition>), McpError> {
        if self.config.transport == TransportKind::Sse {
            return Err(McpError::Unsupported("sse transport".into()));
        }

        let transport = Arc::new(StdioTransport::spawn(&self.config)?);
        match handshake(&transport).await {
            Ok(tools) => Ok((transport, tools)),
            Err(e) => {
                transport.close().await;
                Err(e)
            }
        }
    }
}

/// `initialize` → `notifications/initialized` → `tools/list`.
async fn handshake(transport: &StdioTransport) -> Result<Vec<ToolDefinition>, McpError> {
    transport
        .request("initialize", Some(protocol::initialize_params()))
        .await?
        .into_result()
        .map_err(|e| McpError::Protocol(format!("initialize failed: {e}")))?;

    transport.notify("notifications/initialized").await?;

    let listed = transport.request("tools/list", None).await?.into_result();
    let tools = match listed.map(serde_json::from_value::<ToolsList>) {
        Ok(Ok(list)) => list.tools.into_iter().map(ToolDefinition::from).collect(),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "unparseable tools/list result, provider has no tools");
            Vec::new()
        }
        Err(e) => {
            tracing::warn!(error = %e, "tools/list failed, provider has no tools");
            Vec::new()
        }
    };
    Ok(tools)
}

#[async_trait]
impl ToolProvider for McpToolProvider {
    fn name(&self) -> &str {
        &self.config.id
    }

    async fn initialize(&self) -> ac_domain::error::Result<ProviderInit> {
        tracing::info!(
            provider = %self.config.id,
            command = %self.config.command,
            transport = ?self.config.transport,
            "initializing MCP provider"
        );

        let (transport, tools) = self
            .connect()
            .await
            .map_err(|e| e.into_domain(&self.config.id))?;

        let previous = self.connection.write().replace(transport);
        if previous.is_some() {
            tracing::debug!(provider = %self.config.id, "replaced previous MCP connection");
        }

        tracing::info!(provider = %self.config.id, tool_count = tools.len(), "MCP provider ready");
        Ok(ProviderInit::ready(tools))
    }

    async fn call_tool(&self, tool: &str, arguments: Value) -> ac_domain::error::Result<ToolOutput> {
        let transport = self
            .connection
            .read()
            .clone()
            .ok_or_else(|| McpError::NotInitialized.into_domain(&self.config.id))?;

        if !transport.is_alive() {
            return Err(McpError::ServerDown.into_domain(&self.config.id));
        }

        let result = transport
            .request("tools/call", Some(protocol::call_params(tool, arguments)))
            .await
            .map_err(|e| McpError::from(e).into_domain(&self.config.id))?
            .into_result()
            .map_err(|e| McpError::Protocol(format!("tools/call failed: {e}")).into_domain(&self.config.id))?;

        serde_json::from_value::<CallResult>(result)
            .map(CallResult::into_output)
            .map_err(|e| {
                McpError::Protocol(format!("unparseable tools/call result: {e}")).into_domain(&self.config.id)
            })
    }

    async fn teardown(&self) {
        let transport = self.connection.write().take();
        if let Some(transport) = transport {
            tracing::info!(provider = %self.config.id, "shutting down MCP provider");
            transport.close().await;
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Error type
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("{0}")]
    Transport(#[from] TransportError),

    #[error("{0}")]
    Protocol(String),

    #[error("not initialized")]
    NotInitialized,

    #[error("provider process is down")]
    ServerDown,

    #[error("{0} is not supported")]
    Unsupported(String),
}

impl McpError {
    pub fn into_domain(self, provider: &str) -> Error {
        match self {
            McpError::Transport(TransportError::Timeout(d)) => {
                Error::Timeout(format!("provider {provider}: no response within {d:?}"))
            }
            other => Error::provider(provider, other.to_string()),
        }
    }
}
