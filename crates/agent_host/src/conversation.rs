//! Chat history kept in the key-value store.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use services::storage::{KeyValueStore, StoreExt};
use shared::agent_api::ChatMessage;

pub const HISTORY_KEY: &str = "chat_history";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl StoredMessage {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
            timestamp: Utc::now(),
        }
    }
}

pub fn load_history(store: &dyn KeyValueStore) -> Result<Vec<StoredMessage>> {
    Ok(store.get_as(HISTORY_KEY)?.unwrap_or_default())
}

/// Keep the newest `limit` messages, never starting on an assistant turn.
pub fn trim_history(mut history: Vec<StoredMessage>, limit: usize) -> Vec<StoredMessage> {
    if history.len() > limit {
        history.drain(..history.len() - limit);
    }
    let first_user = history
        .iter()
        .position(|m| m.role == "user")
        .unwrap_or(history.len());
    history.drain(..first_user);
    history
}

/// Record one user/assistant exchange.
pub fn append_turn(
    store: &dyn KeyValueStore,
    user: &str,
    assistant: &str,
    limit: usize,
) -> Result<()> {
    let mut history = load_history(store)?;
    history.push(StoredMessage::new("user", user));
    history.push(StoredMessage::new("assistant", assistant));
    store.set_as(HISTORY_KEY, &trim_history(history, limit))?;
    Ok(())
}

pub fn clear_history(store: &dyn KeyValueStore) -> Result<()> {
    store.remove(HISTORY_KEY)?;
    Ok(())
}

pub fn to_chat_messages(history: &[StoredMessage]) -> Vec<ChatMessage> {
    history
        .iter()
        .map(|m| match m.role.as_str() {
            "assistant" => ChatMessage::assistant(m.content.clone()),
            _ => ChatMessage::user(m.content.clone()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use services::storage::MemoryStore;

    #[test]
    fn test_append_and_load() {
        let store = MemoryStore::new();
        assert!(load_history(&store).unwrap().is_empty());

        append_turn(&store, "hi", "hello", 20).unwrap();
        let history = load_history(&store).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, "user");
        assert_eq!(history[1].content, "hello");

        let msgs = to_chat_messages(&history);
        assert_eq!(msgs[1].role, "assistant");
    }

    #[test]
    fn test_trim_keeps_newest_and_starts_on_user() {
        let store = MemoryStore::new();
        for i in 0..4 {
            append_turn(&store, &format!("q{}", i), &format!("a{}", i), 3).unwrap();
        }
        let history = load_history(&store).unwrap();
        // Three newest would start on "a2", so only the last pair survives
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "q3");
    }

    #[test]
    fn test_zero_limit_and_clear() {
        let store = MemoryStore::new();
        append_turn(&store, "q", "a", 0).unwrap();
        assert!(load_history(&store).unwrap().is_empty());

        append_turn(&store, "q", "a", 10).unwrap();
        clear_history(&store).unwrap();
        assert!(load_history(&store).unwrap().is_empty());
    }
}
