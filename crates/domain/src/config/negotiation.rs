use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capability::CapabilityBundle;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Capability negotiation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationConfig {
    /// Upper bound for initializing every provider of one bundle.
    #[serde(default = "d_180")]
    pub bundle_timeout_secs: u64,
    /// Upper bound for a single provider probe.
    #[serde(default = "d_60")]
    pub probe_timeout_secs: u64,
    /// Bundles in preference order. When empty, bundles are derived from
    /// the configured providers (see [`super::AgentConfig::bundles`]).
    #[serde(default)]
    pub bundles: Vec<CapabilityBundle>,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            bundle_timeout_secs: d_180(),
            probe_timeout_secs: d_60(),
            bundles: Vec::new(),
        }
    }
}

impl NegotiationConfig {
    pub fn bundle_timeout(&self) -> Duration {
        Duration::from_secs(self.bundle_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

fn d_180() -> u64 {
    180
}
fn d_60() -> u64 {
    60
}
