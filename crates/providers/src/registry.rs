//! Provider registry.
//!
//! Holds every configured tool provider by name. Bundles reference providers
//! by these names; the negotiator looks them up here.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::traits::ToolProvider;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ProviderRegistry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn ToolProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its own name. A later registration with
    /// the same name replaces the earlier one.
    pub fn register(&mut self, provider: Arc<dyn ToolProvider>) {
        let name = provider.name().to_owned();
        if self.providers.insert(name.clone(), provider).is_some() {
            tracing::warn!(provider = %name, "tool provider registered twice, replacing");
        } else {
            tracing::debug!(provider = %name, "registered tool provider");
        }
    }

    pub fn with(mut self, provider: Arc<dyn ToolProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolProvider>> {
        self.providers.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
