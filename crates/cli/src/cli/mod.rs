pub mod config;
pub mod extract;
pub mod negotiate;
pub mod sessions;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use ac_domain::config::AgentConfig;

/// AgentCore admin tool: inspect configuration, probe tool providers and
/// manage stored sessions.
#[derive(Debug, Parser)]
#[command(name = "agentcore", version, about)]
pub struct Cli {
    /// Config file (defaults to `$AC_CONFIG`, then `agent.toml`).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines instead of compact text.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Probe the configured bundles and print the resulting capability state.
    Negotiate,
    /// Inspect or clear stored sessions.
    #[command(subcommand)]
    Sessions(SessionsCommand),
    /// Run payload extraction over a file, or stdin when no file is given.
    Extract {
        file: Option<PathBuf>,
        /// Fail unless the payload carries this key. Repeatable.
        #[arg(long = "require", value_name = "KEY")]
        required: Vec<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any issues.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

#[derive(Debug, Subcommand)]
pub enum SessionsCommand {
    /// List a user's sessions, newest first.
    List {
        #[arg(long)]
        user: String,
    },
    /// Print a session's retained turns as JSON.
    Show {
        #[arg(long)]
        user: String,
        #[arg(long)]
        session: String,
    },
    /// Drop a session's history, in memory and on disk.
    Clear {
        #[arg(long)]
        user: String,
        #[arg(long)]
        session: String,
    },
}

// ── Config loading helper ─────────────────────────────────────────────

/// Resolve the config path (`--config`, then `AC_CONFIG`, then
/// `agent.toml`) and load it. A missing file yields defaults.
pub fn load_config(explicit: Option<PathBuf>) -> anyhow::Result<(AgentConfig, PathBuf)> {
    let path = explicit
        .or_else(|| std::env::var_os("AC_CONFIG").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("agent.toml"));

    let config = AgentConfig::load(&path).with_context(|| format!("loading {}", path.display()))?;
    Ok((config, path))
}
