// SPDX-License-Identifier: MIT

//! The six workflow steps
//!
//! Each handler reads the current state, consults its collaborators through
//! `safe_invoke`, and returns a partial update. Handlers always echo the
//! question back unchanged.

use super::graph::Node;
use super::invoke::safe_invoke;
use super::state::{FallbackSearch, StateDelta, WorkflowState, INSUFFICIENT_INFORMATION};
use crate::sources::{
    ConversationEvent, Generator, Grade, GradeFields, Grader, MemoryStore, Passage, Retriever,
    SessionKey, WebSearch,
};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Placeholder passage content when web search finds nothing
pub const NO_WEB_RESULTS: &str = "No relevant information found from web search.";

/// Conversation memory bound to one session
#[derive(Clone)]
pub struct MemoryBinding {
    pub store: Arc<dyn MemoryStore>,
    pub key: SessionKey,
    /// Events read by `search_memory`
    pub history_limit: usize,
    /// Events folded into the generation context
    pub context_limit: usize,
}

impl MemoryBinding {
    pub fn new(store: Arc<dyn MemoryStore>, key: SessionKey) -> Self {
        Self {
            store,
            key,
            history_limit: 10,
            context_limit: 5,
        }
    }

    pub fn with_limits(mut self, history_limit: usize, context_limit: usize) -> Self {
        self.history_limit = history_limit;
        self.context_limit = context_limit;
        self
    }

    /// Same store and limits, another conversation
    pub fn for_session(&self, key: SessionKey) -> Self {
        Self {
            key,
            ..self.clone()
        }
    }
}

/// Everything the nodes and routers consult
///
/// `memory` is `None` when conversation memory is disabled; the memory
/// nodes then behave as if the store were empty.
#[derive(Clone)]
pub struct Collaborators {
    pub retriever: Arc<dyn Retriever>,
    pub relevance: Arc<dyn Grader>,
    pub usefulness: Arc<dyn Grader>,
    pub generator: Arc<dyn Generator>,
    pub web_search: Arc<dyn WebSearch>,
    pub memory: Option<MemoryBinding>,
}

/// Workflow step identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    SearchMemory,
    GradeMemory,
    Retrieve,
    GradeDocuments,
    WebSearch,
    Generate,
}

impl NodeKind {
    pub const ALL: [NodeKind; 6] = [
        NodeKind::SearchMemory,
        NodeKind::GradeMemory,
        NodeKind::Retrieve,
        NodeKind::GradeDocuments,
        NodeKind::WebSearch,
        NodeKind::Generate,
    ];

    pub fn name(self) -> &'static str {
        match self {
            NodeKind::SearchMemory => "search_memory",
            NodeKind::GradeMemory => "grade_memory",
            NodeKind::Retrieve => "retrieve",
            NodeKind::GradeDocuments => "grade_documents",
            NodeKind::WebSearch => "websearch",
            NodeKind::Generate => "generate",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A workflow step bound to its collaborators
pub struct RagNode {
    kind: NodeKind,
    collaborators: Arc<Collaborators>,
}

impl RagNode {
    pub fn new(kind: NodeKind, collaborators: Arc<Collaborators>) -> Self {
        Self {
            kind,
            collaborators,
        }
    }
}

#[async_trait]
impl Node for RagNode {
    async fn run(&self, state: &WorkflowState) -> StateDelta {
        log::info!("---{}---", self.kind.name().to_uppercase());
        let c = self.collaborators.as_ref();
        match self.kind {
            NodeKind::SearchMemory => search_memory(state, c).await,
            NodeKind::GradeMemory => grade_memory(state, c).await,
            NodeKind::Retrieve => retrieve(state, c).await,
            NodeKind::GradeDocuments => grade_documents(state, c).await,
            NodeKind::WebSearch => web_search(state, c).await,
            NodeKind::Generate => generate(state, c).await,
        }
    }
}

/// Look up recent conversation history for the session
///
/// Always clears the fallback flag; whether memory is good enough is
/// decided by `grade_memory`.
pub async fn search_memory(state: &WorkflowState, c: &Collaborators) -> StateDelta {
    let events = match &c.memory {
        Some(memory) => {
            safe_invoke(
                "memory_store.list_recent_events",
                Vec::new(),
                memory
                    .store
                    .list_recent_events(&memory.key, memory.history_limit),
            )
            .await
        }
        None => {
            log::debug!("Conversation memory disabled");
            Vec::new()
        }
    };

    let documents = if events.is_empty() {
        Vec::new()
    } else {
        let mut passage = Passage::with_source(render_events(&events), "memory");
        passage
            .metadata
            .insert("events".to_string(), events.len().to_string());
        vec![passage]
    };

    StateDelta {
        question: Some(state.question().to_string()),
        documents: Some(documents),
        needs_fallback_search: Some(FallbackSearch::No),
        ..Default::default()
    }
}

/// Keep only the memory passages judged relevant
pub async fn grade_memory(state: &WorkflowState, c: &Collaborators) -> StateDelta {
    let kept = filter_relevant(state.question(), state.documents(), c.relevance.as_ref()).await;
    let fallback = if kept.is_empty() {
        log::info!("---DECISION: MEMORY NOT RELEVANT---");
        FallbackSearch::Yes
    } else {
        FallbackSearch::No
    };

    StateDelta {
        question: Some(state.question().to_string()),
        documents: Some(kept),
        needs_fallback_search: Some(fallback),
        ..Default::default()
    }
}

/// Fetch passages from the document store
pub async fn retrieve(state: &WorkflowState, c: &Collaborators) -> StateDelta {
    let documents = safe_invoke(
        "retriever.retrieve",
        Vec::new(),
        c.retriever.retrieve(state.question()),
    )
    .await;
    log::info!("Retrieved {} passages", documents.len());

    StateDelta {
        question: Some(state.question().to_string()),
        documents: Some(documents),
        ..Default::default()
    }
}

/// Keep only the retrieved passages judged relevant
pub async fn grade_documents(state: &WorkflowState, c: &Collaborators) -> StateDelta {
    if state.documents().is_empty() {
        log::info!("No documents to grade");
        return StateDelta {
            question: Some(state.question().to_string()),
            documents: Some(Vec::new()),
            needs_fallback_search: Some(FallbackSearch::Yes),
            ..Default::default()
        };
    }

    let kept = filter_relevant(state.question(), state.documents(), c.relevance.as_ref()).await;
    let fallback = if kept.is_empty() {
        log::info!("---DECISION: NO RELEVANT DOCUMENTS, USING WEB SEARCH---");
        FallbackSearch::Yes
    } else {
        FallbackSearch::No
    };

    StateDelta {
        question: Some(state.question().to_string()),
        documents: Some(kept),
        needs_fallback_search: Some(fallback),
        ..Default::default()
    }
}

/// Replace the documents with one passage built from web results
pub async fn web_search(state: &WorkflowState, c: &Collaborators) -> StateDelta {
    let hits = safe_invoke(
        "web_search.search",
        Vec::new(),
        c.web_search.search(state.question()),
    )
    .await;

    let content = if hits.is_empty() {
        NO_WEB_RESULTS.to_string()
    } else {
        hits.iter()
            .map(|hit| format!("Source: {}\n{}", hit.url, hit.content))
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    StateDelta {
        question: Some(state.question().to_string()),
        documents: Some(vec![Passage::with_source(content, "web")]),
        ..Default::default()
    }
}

/// Produce an answer from the documents and recent conversation
///
/// A successful answer is recorded in memory exactly once. The
/// insufficient-information fallback is never recorded.
pub async fn generate(state: &WorkflowState, c: &Collaborators) -> StateDelta {
    let mut context = render_documents(state.documents());

    if let Some(memory) = &c.memory {
        let recent = safe_invoke(
            "memory_store.list_recent_events",
            Vec::new(),
            memory
                .store
                .list_recent_events(&memory.key, memory.context_limit),
        )
        .await;
        if !recent.is_empty() {
            context.push_str("\n\nRecent conversation context:\n");
            context.push_str(&render_events(&recent));
        }
    }

    let generation = safe_invoke(
        "generator.generate",
        INSUFFICIENT_INFORMATION.to_string(),
        c.generator.generate(state.question(), &context),
    )
    .await;
    let generation = if generation.trim().is_empty() {
        INSUFFICIENT_INFORMATION.to_string()
    } else {
        generation
    };

    if generation != INSUFFICIENT_INFORMATION {
        if let Some(memory) = &c.memory {
            safe_invoke(
                "memory_store.append_event",
                (),
                memory
                    .store
                    .append_event(&memory.key, state.question(), &generation),
            )
            .await;
        }
    }

    StateDelta {
        question: Some(state.question().to_string()),
        generation: Some(generation),
        ..Default::default()
    }
}

/// Grade each passage in order; a failed grading counts as irrelevant
async fn filter_relevant(
    question: &str,
    documents: &[Passage],
    grader: &dyn Grader,
) -> Vec<Passage> {
    let mut kept = Vec::new();
    for document in documents {
        let mut fields = GradeFields::new();
        fields.insert("question".to_string(), question.to_string());
        fields.insert("document".to_string(), document.content.clone());

        let grade = safe_invoke("relevance_grader.grade", Grade::No, grader.grade(&fields)).await;
        if grade.is_yes() {
            log::debug!("---GRADE: DOCUMENT RELEVANT---");
            kept.push(document.clone());
        } else {
            log::debug!("---GRADE: DOCUMENT NOT RELEVANT---");
        }
    }
    kept
}

fn render_documents(documents: &[Passage]) -> String {
    documents
        .iter()
        .map(|d| d.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_events(events: &[ConversationEvent]) -> String {
    events
        .iter()
        .flat_map(|event| event.messages.iter())
        .map(|m| format!("{}: {}", m.role, m.text))
        .collect::<Vec<_>>()
        .join("\n")
}
