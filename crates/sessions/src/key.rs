use serde::{Deserialize, Serialize};

/// Directory under the durable store holding all session blobs.
pub const HISTORY_PREFIX: &str = "history";

/// Identifies one conversation: `(user, session)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey {
    pub user_id: String,
    pub session_id: String,
}

impl SessionKey {
    /// Key for `user_id`, generating a fresh session id when none is given.
    pub fn new(user_id: impl Into<String>, session_id: Option<String>) -> Self {
        let session_id = session_id
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Self {
            user_id: user_id.into(),
            session_id,
        }
    }

    pub fn of(user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }

    /// Durable-store key: `history/<user>/<session>.json`.
    pub fn durable_key(&self) -> String {
        format!(
            "{}{}.json",
            user_prefix(&self.user_id),
            encode_component(&self.session_id)
        )
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.user_id, self.session_id)
    }
}

/// Durable-store prefix under which all of a user's sessions live.
pub fn user_prefix(user_id: &str) -> String {
    format!("{HISTORY_PREFIX}/{}/", encode_component(user_id))
}

/// Encode an identifier as a single path component.
///
/// Bytes outside `[A-Za-z0-9_@-]` become `%XX`, except `.` after the first
/// byte, so the mapping is injective and never yields `.`/`..`. The empty
/// identifier encodes as a lone `%`, which no other input produces.
pub fn encode_component(raw: &str) -> String {
    if raw.is_empty() {
        return "%".to_owned();
    }
    let mut out = String::with_capacity(raw.len());
    for (i, b) in raw.bytes().enumerate() {
        let keep = b.is_ascii_alphanumeric() || matches!(b, b'_' | b'@' | b'-') || (b == b'.' && i > 0);
        if keep {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}
