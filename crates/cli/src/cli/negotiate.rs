//! `agentcore negotiate`: one negotiation pass against the configured MCP
//! servers.

use std::sync::Arc;

use ac_domain::capability::CapabilityState;
use ac_domain::config::AgentConfig;
use ac_mcp_client::McpToolProvider;
use ac_providers::ProviderRegistry;
use ac_runtime::CapabilityNegotiator;

pub async fn run(config: &AgentConfig) -> anyhow::Result<()> {
    let mut registry = ProviderRegistry::new();
    for provider in &config.providers {
        registry.register(Arc::new(McpToolProvider::new(provider.clone())));
    }
    let negotiator = CapabilityNegotiator::from_config(registry, config);

    let state = negotiator.negotiate().await;
    negotiator.shutdown().await;

    eprintln!("{}", summary(&state));
    println!("{}", serde_json::to_string_pretty(state.as_ref())?);
    Ok(())
}

fn summary(state: &CapabilityState) -> String {
    match &state.bundle {
        Some(bundle) => {
            let reachable: Vec<&str> = state.reachable_providers().map(|p| p.name.as_str()).collect();
            format!(
                "bundle \"{bundle}\" selected; reachable: {}; {} tool(s)",
                if reachable.is_empty() { "none".to_owned() } else { reachable.join(", ") },
                state.tool_definitions().len(),
            )
        }
        None => "no bundle succeeded; requests will run without tools".to_owned(),
    }
}
