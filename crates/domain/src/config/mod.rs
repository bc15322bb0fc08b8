mod extraction;
mod negotiation;
mod providers;
mod sessions;
mod strategy;

pub use extraction::*;
pub use negotiation::*;
pub use providers::*;
pub use sessions::*;
pub use strategy::*;

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::capability::{BundleMember, CapabilityBundle};
use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentConfig {
    #[serde(default)]
    pub negotiation: NegotiationConfig,
    #[serde(default)]
    pub providers: Vec<ToolProviderConfig>,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

impl AgentConfig {
    /// Read and parse a TOML config file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::Config(e.to_string()))
    }

    /// Bundles in preference order.
    ///
    /// Explicit `[negotiation].bundles` win. Otherwise they are derived from
    /// `[[providers]]`: every provider together, then each provider alone,
    /// then the empty bundle.
    pub fn bundles(&self) -> Vec<CapabilityBundle> {
        if !self.negotiation.bundles.is_empty() {
            return self.negotiation.bundles.clone();
        }

        let mut bundles = Vec::new();
        if self.providers.len() > 1 {
            bundles.push(CapabilityBundle::new(
                "all",
                self.providers
                    .iter()
                    .map(|p| BundleMember::required(p.id.clone()))
                    .collect(),
            ));
        }
        for p in &self.providers {
            bundles.push(CapabilityBundle::new(
                format!("only:{}", p.id),
                vec![BundleMember::required(p.id.clone())],
            ));
        }
        bundles.push(CapabilityBundle::new("none", Vec::new()));
        bundles
    }

    /// Validate the configuration and return a list of issues.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        let mut ids = HashSet::new();
        for (i, p) in self.providers.iter().enumerate() {
            if p.id.is_empty() {
                issues.push(ConfigIssue::error(
                    format!("providers[{i}].id"),
                    "provider id must not be empty",
                ));
            } else if !ids.insert(p.id.as_str()) {
                issues.push(ConfigIssue::error(
                    format!("providers[{i}].id"),
                    format!("duplicate provider id \"{}\"", p.id),
                ));
            }
            if p.transport == TransportKind::Stdio && p.command.is_empty() {
                issues.push(ConfigIssue::error(
                    format!("providers[{i}].command"),
                    "stdio providers need a command",
                ));
            }
            if p.transport == TransportKind::Sse {
                issues.push(ConfigIssue::warning(
                    format!("providers[{i}].transport"),
                    "sse transport is not supported; the provider will never be reachable",
                ));
            }
            if p.request_timeout_secs == 0 {
                issues.push(ConfigIssue::error(
                    format!("providers[{i}].request_timeout_secs"),
                    "timeout must be greater than 0",
                ));
            }
        }

        for (i, b) in self.negotiation.bundles.iter().enumerate() {
            for m in &b.members {
                if !ids.contains(m.provider.as_str()) {
                    issues.push(ConfigIssue::error(
                        format!("negotiation.bundles[{i}]"),
                        format!("bundle \"{}\" references unknown provider \"{}\"", b.name, m.provider),
                    ));
                }
            }
        }

        if self.providers.is_empty() {
            issues.push(ConfigIssue::warning(
                "providers",
                "no tool providers configured; tool-augmented generation is disabled",
            ));
        }
        if self.negotiation.bundle_timeout_secs == 0 || self.negotiation.probe_timeout_secs == 0 {
            issues.push(ConfigIssue::error(
                "negotiation",
                "negotiation timeouts must be greater than 0",
            ));
        }
        if self.strategy.tool_augmented_timeout_secs == 0 || self.strategy.tool_free_timeout_secs == 0 {
            issues.push(ConfigIssue::error(
                "strategy",
                "strategy timeouts must be greater than 0",
            ));
        }
        if self.strategy.max_tool_rounds == 0 {
            issues.push(ConfigIssue::warning(
                "strategy.max_tool_rounds",
                "0 rounds makes every tool call fail the tool-augmented step",
            ));
        }
        if self.sessions.max_turns == 0 {
            issues.push(ConfigIssue::error(
                "sessions.max_turns",
                "max_turns must be greater than 0",
            ));
        }
        if self.sessions.max_cached_sessions == 0 {
            issues.push(ConfigIssue::warning(
                "sessions.max_cached_sessions",
                "0 is treated as 1; every idle session is reloaded from disk",
            ));
        }

        issues
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl ConfigIssue {
    fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}
