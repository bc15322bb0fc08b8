use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ac_domain::tool::Message;

use crate::key::SessionKey;
use crate::turn::ConversationTurn;

/// The retained history of one conversation.
///
/// Turns are kept oldest first. Once more than `max_turns` are held, the
/// oldest are dropped (strict FIFO).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub session_id: String,
    #[serde(default)]
    pub turns: Vec<ConversationTurn>,
    /// Ordinal the next appended turn receives.
    #[serde(default = "d_next_ordinal")]
    pub next_ordinal: u64,
    pub last_updated: DateTime<Utc>,
    pub max_turns: usize,
}

fn d_next_ordinal() -> u64 {
    1
}

impl Session {
    pub fn new(key: &SessionKey, max_turns: usize) -> Self {
        Self {
            user_id: key.user_id.clone(),
            session_id: key.session_id.clone(),
            turns: Vec::new(),
            next_ordinal: 1,
            last_updated: Utc::now(),
            max_turns: max_turns.max(1),
        }
    }

    pub fn key(&self) -> SessionKey {
        SessionKey::of(&self.user_id, &self.session_id)
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Append `turn` with the next ordinal and trim. Returns the stored turn.
    pub fn push(&mut self, mut turn: ConversationTurn) -> ConversationTurn {
        // Ordinals only move forward, even past ones stored before a restart.
        let floor = self.turns.last().map_or(0, |t| t.ordinal) + 1;
        turn.ordinal = self.next_ordinal.max(floor);
        self.next_ordinal = turn.ordinal + 1;
        self.last_updated = turn.timestamp.max(self.last_updated);
        self.turns.push(turn.clone());
        self.trim();
        turn
    }

    /// Apply a (possibly new) bound and drop the oldest overflow.
    pub fn set_max_turns(&mut self, max_turns: usize) {
        self.max_turns = max_turns.max(1);
        self.trim();
    }

    fn trim(&mut self) {
        if self.turns.len() > self.max_turns {
            let excess = self.turns.len() - self.max_turns;
            self.turns.drain(..excess);
        }
    }

    /// The last `n` turns, oldest first.
    pub fn recent(&self, n: usize) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    /// The last `n` turns as alternating user/assistant messages.
    pub fn to_messages(&self, n: usize) -> Vec<Message> {
        self.recent(n)
            .iter()
            .flat_map(|t| [Message::user(t.request.clone()), Message::assistant(t.response.clone())])
            .collect()
    }
}
