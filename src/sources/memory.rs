// SPDX-License-Identifier: MIT

//! In-memory conversation log

use super::{ConversationEvent, EventMessage, MemoryStore, Role, SessionKey};
use crate::error::CollabError;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Append-only event log per session, kept for the life of the process
#[derive(Clone, Default)]
pub struct InMemoryConversationStore {
    events: Arc<RwLock<HashMap<SessionKey, Vec<ConversationEvent>>>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total events recorded for a session
    pub async fn len(&self, key: &SessionKey) -> usize {
        self.events.read().await.get(key).map_or(0, Vec::len)
    }
}

#[async_trait]
impl MemoryStore for InMemoryConversationStore {
    async fn list_recent_events(
        &self,
        key: &SessionKey,
        limit: usize,
    ) -> Result<Vec<ConversationEvent>, CollabError> {
        let events = self.events.read().await;
        let Some(entries) = events.get(key) else {
            return Ok(Vec::new());
        };
        let skip = entries.len().saturating_sub(limit);
        Ok(entries[skip..].to_vec())
    }

    async fn append_event(
        &self,
        key: &SessionKey,
        question: &str,
        answer: &str,
    ) -> Result<(), CollabError> {
        let event = ConversationEvent {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            messages: vec![
                EventMessage {
                    role: Role::User,
                    text: question.to_string(),
                },
                EventMessage {
                    role: Role::Assistant,
                    text: answer.to_string(),
                },
            ],
        };

        self.events
            .write()
            .await
            .entry(key.clone())
            .or_default()
            .push(event);
        Ok(())
    }
}
