use std::sync::Arc;

use ac_domain::config::AgentConfig;
use ac_sessions::{FileStore, SessionKey, SessionMemoryStore};

use super::SessionsCommand;

/// Session store over the configured `state_path`.
pub fn open_store(config: &AgentConfig) -> SessionMemoryStore {
    let durable = Arc::new(FileStore::new(config.sessions.state_path.clone()));
    SessionMemoryStore::new(durable, config.sessions.max_turns)
        .with_cache_limit(config.sessions.max_cached_sessions)
}

pub async fn run(config: &AgentConfig, cmd: SessionsCommand) -> anyhow::Result<()> {
    let store = open_store(config);

    match cmd {
        SessionsCommand::List { user } => {
            let sessions = store.list_sessions(&user).await;
            if sessions.is_empty() {
                eprintln!("no sessions for {user}");
            }
            for s in sessions {
                println!(
                    "{}\t{} turn(s)\t{}",
                    s.session_id,
                    s.turn_count,
                    s.last_updated.to_rfc3339()
                );
            }
        }
        SessionsCommand::Show { user, session } => {
            let history = store.history(&SessionKey::of(user, session)).await;
            println!("{}", serde_json::to_string_pretty(&history)?);
        }
        SessionsCommand::Clear { user, session } => {
            let key = SessionKey::of(user, session);
            store.clear(&key).await;
            let health = store.health();
            if let Some(err) = health.last_error {
                anyhow::bail!("clearing {key}: {err}");
            }
            println!("cleared {key}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ac_domain::capability::ExecutionStrategy;
    use ac_sessions::ConversationTurn;

    #[tokio::test]
    async fn store_reads_what_a_previous_process_wrote() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AgentConfig::default();
        config.sessions.state_path = dir.path().to_path_buf();
        let key = SessionKey::of("alice", "s1");

        open_store(&config)
            .append(&key, ConversationTurn::new("hi", "hello", ExecutionStrategy::ToolFree))
            .await;

        let reopened = open_store(&config);
        let listed = reopened.list_sessions("alice").await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].session_id, "s1");
        assert_eq!(reopened.history(&key).await[0].response, "hello");
    }
}
