use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session memory
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Turns retained per session; older turns are dropped first.
    #[serde(default = "d_10")]
    pub max_turns: usize,
    /// Root directory of the file-backed durable store.
    #[serde(default = "d_state_path")]
    pub state_path: PathBuf,
    /// User id applied when a caller does not supply one.
    #[serde(default = "d_default_user")]
    pub default_user: String,
    /// Sessions held in memory before idle ones are evicted.
    #[serde(default = "d_1024")]
    pub max_cached_sessions: usize,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            max_turns: d_10(),
            state_path: d_state_path(),
            default_user: d_default_user(),
            max_cached_sessions: d_1024(),
        }
    }
}

fn d_10() -> usize {
    10
}
fn d_1024() -> usize {
    1024
}
fn d_state_path() -> PathBuf {
    PathBuf::from("./memory_storage")
}
fn d_default_user() -> String {
    "default_user".into()
}
