//! Registry of connected client sessions, keyed by session id.

use crate::models::{Message, SessionSummary, TurnState};
use chrono::{DateTime, Utc};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// Observable state of one session, updated by its orchestrator.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: Uuid,
    pub connected_at: DateTime<Utc>,
    pub turn_state: TurnState,
    pub messages: Vec<Message>,
}

impl SessionRecord {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            connected_at: Utc::now(),
            turn_state: TurnState::default(),
            messages: Vec::new(),
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id,
            connected_at: self.connected_at,
            turn_state: self.turn_state,
            message_count: self.messages.len(),
        }
    }
}

pub type SharedSessionRecord = Arc<Mutex<SessionRecord>>;

/// Every connected client gets its own entry; sessions never share state.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, SharedSessionRecord>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, id: Uuid) -> SharedSessionRecord {
        let record = Arc::new(Mutex::new(SessionRecord::new(id)));
        self.sessions.write().await.insert(id, record.clone());
        record
    }

    pub async fn remove(&self, id: Uuid) -> Option<SharedSessionRecord> {
        self.sessions.write().await.remove(&id)
    }

    pub async fn get(&self, id: Uuid) -> Option<SharedSessionRecord> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Summaries of all live sessions, oldest first.
    pub async fn summaries(&self) -> Vec<SessionSummary> {
        let records: Vec<SharedSessionRecord> =
            self.sessions.read().await.values().cloned().collect();
        let mut summaries = Vec::with_capacity(records.len());
        for record in records {
            summaries.push(record.lock().await.summary());
        }
        summaries.sort_by_key(|s| s.connected_at);
        summaries
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_remove() {
        let registry = SessionRegistry::new();
        let id = Uuid::new_v4();
        registry.register(id).await;
        assert_eq!(registry.len().await, 1);
        assert!(registry.get(id).await.is_some());

        assert!(registry.remove(id).await.is_some());
        assert!(registry.is_empty().await);
        assert!(registry.remove(id).await.is_none());
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let registry = SessionRegistry::new();
        let first = registry.register(Uuid::new_v4()).await;
        let second = registry.register(Uuid::new_v4()).await;

        first.lock().await.messages.push(Message::user("hello"));
        first.lock().await.turn_state = TurnState::AwaitingReply;

        let second = second.lock().await;
        assert!(second.messages.is_empty());
        assert_eq!(second.turn_state, TurnState::Listening);
    }

    #[tokio::test]
    async fn test_summaries_reflect_records() {
        let registry = SessionRegistry::new();
        let id = Uuid::new_v4();
        let record = registry.register(id).await;
        {
            let mut record = record.lock().await;
            record.messages.push(Message::user("hi"));
            record.messages.push(Message::assistant("hello"));
            record.turn_state = TurnState::Speaking;
        }

        let summaries = registry.summaries().await;
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].id, id);
        assert_eq!(summaries[0].message_count, 2);
        assert_eq!(summaries[0].turn_state, TurnState::Speaking);
    }
}
