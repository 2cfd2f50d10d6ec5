// SPDX-License-Identifier: MIT

//! Knowledge sources and quality checks consulted by the workflow
//!
//! Every collaborator sits behind a narrow capability trait so that remote
//! backends, local stores and test stubs are interchangeable:
//! - `Retriever` - ranked passages from the document store
//! - `DocumentStore` - a retriever that accepts ingested passages
//! - `Grader` - binary yes/no judgments (relevance, grounding, usefulness)
//! - `Generator` - answers from a question and a context string
//! - `WebSearch` - (title, url, content) hits for a query
//! - `MemoryStore` - append-only conversation log per session

mod generator;
mod grader;
mod memory;
mod search;
mod store;

pub use generator::LlmGenerator;
pub use grader::{GraderKind, LlmGrader};
pub use memory::InMemoryConversationStore;
pub use search::TavilySearch;
pub use store::{split_text, InMemoryDocumentStore};

use crate::error::CollabError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A unit of context text with attached metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    pub content: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Passage {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Passage tagged with a `source` metadata entry
    pub fn with_source(content: impl Into<String>, source: impl Into<String>) -> Self {
        let mut passage = Self::new(content);
        passage.metadata.insert("source".to_string(), source.into());
        passage
    }

    pub fn source_tag(&self) -> Option<&str> {
        self.metadata.get("source").map(String::as_str)
    }
}

/// A single web search result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub content: String,
}

/// Binary verdict returned by every grader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grade {
    Yes,
    No,
}

impl Grade {
    pub fn is_yes(self) -> bool {
        self == Grade::Yes
    }
}

/// Named inputs handed to a grader ("question", "document", "generation", ...)
pub type GradeFields = BTreeMap<String, String>;

/// Identifies one conversation log
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub space: String,
    pub actor: String,
    pub session: String,
}

impl SessionKey {
    pub fn new(
        space: impl Into<String>,
        actor: impl Into<String>,
        session: impl Into<String>,
    ) -> Self {
        Self {
            space: space.into(),
            actor: actor.into(),
            session: session.into(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.space, self.actor, self.session)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => f.write_str("USER"),
            Role::Assistant => f.write_str("ASSISTANT"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMessage {
    pub role: Role,
    pub text: String,
}

/// A persisted question/answer exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub messages: Vec<EventMessage>,
}

#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str) -> Result<Vec<Passage>, CollabError>;
}

/// A retriever that also accepts new passages
#[async_trait]
pub trait DocumentStore: Retriever {
    async fn add_documents(&self, passages: Vec<Passage>) -> Result<(), CollabError>;
}

#[async_trait]
pub trait Grader: Send + Sync {
    async fn grade(&self, fields: &GradeFields) -> Result<Grade, CollabError>;
}

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, question: &str, context: &str) -> Result<String, CollabError>;
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, CollabError>;
}

#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Up to `limit` most recent events, oldest first
    async fn list_recent_events(
        &self,
        key: &SessionKey,
        limit: usize,
    ) -> Result<Vec<ConversationEvent>, CollabError>;

    async fn append_event(
        &self,
        key: &SessionKey,
        question: &str,
        answer: &str,
    ) -> Result<(), CollabError>;
}
