// SPDX-License-Identifier: MIT

//! Workflow manager
//!
//! Wires the six nodes and three routing predicates into a compiled graph
//! once, then serves any number of independent runs from it.

use super::executor::{CompiledGraph, RunEvent, RunOutcome};
use super::graph::{StateGraph, END};
use super::nodes::{Collaborators, MemoryBinding, NodeKind, RagNode};
use super::routing::{
    Predicate, RagRouter, GENERATE, NOT_SUPPORTED, NOT_USEFUL, RETRIEVE, USEFUL, WEBSEARCH,
};
use super::state::WorkflowState;
use crate::config::{GradingPolicy, RetrievalSettings, Settings, WorkflowSettings};
use crate::error::{GraphError, RagError};
use crate::model::{self, GenerationConfig};
use crate::sources::{
    split_text, DocumentStore, GraderKind, InMemoryConversationStore, InMemoryDocumentStore,
    LlmGenerator, LlmGrader, Passage, SessionKey, TavilySearch,
};
use futures::Stream;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Build and validate the retrieval-augmented answer graph
///
/// ```text
/// search_memory -> grade_memory -?-> generate | retrieve
/// retrieve -> grade_documents -?-> websearch | generate
/// websearch -> generate
/// generate -?-> END (useful) | websearch (not_useful) | generate (not_supported)
/// ```
pub fn build_graph(
    collaborators: Arc<Collaborators>,
    max_node_visits: usize,
    policy: GradingPolicy,
) -> Result<CompiledGraph, GraphError> {
    let router = |predicate| -> Arc<RagRouter> {
        Arc::new(RagRouter::new(
            predicate,
            collaborators.usefulness.clone(),
            policy,
        ))
    };

    let mut graph = StateGraph::new();
    for kind in NodeKind::ALL {
        graph.add_node(
            kind.name(),
            Arc::new(RagNode::new(kind, collaborators.clone())),
        );
    }

    graph
        .set_entry_point(NodeKind::SearchMemory.name())
        .add_edge(NodeKind::SearchMemory.name(), NodeKind::GradeMemory.name())
        .add_conditional_edges(
            NodeKind::GradeMemory.name(),
            router(Predicate::AfterMemory),
            [
                (GENERATE, NodeKind::Generate.name()),
                (RETRIEVE, NodeKind::Retrieve.name()),
            ],
        )
        .add_edge(NodeKind::Retrieve.name(), NodeKind::GradeDocuments.name())
        .add_conditional_edges(
            NodeKind::GradeDocuments.name(),
            router(Predicate::AfterDocumentGrading),
            [
                (WEBSEARCH, NodeKind::WebSearch.name()),
                (GENERATE, NodeKind::Generate.name()),
            ],
        )
        .add_edge(NodeKind::WebSearch.name(), NodeKind::Generate.name())
        .add_conditional_edges(
            NodeKind::Generate.name(),
            router(Predicate::AfterGeneration),
            [
                (NOT_SUPPORTED, NodeKind::Generate.name()),
                (USEFUL, END),
                (NOT_USEFUL, NodeKind::WebSearch.name()),
            ],
        );

    graph.compile(max_node_visits)
}

/// Which conversation a run reads from and records into
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryScope {
    /// The session configured at startup
    Shared,
    /// A caller-specific session in the configured memory store
    Session(SessionKey),
    /// No memory reads or writes for this run
    Off,
}

pub struct WorkflowManager {
    graph: Arc<CompiledGraph>,
    collaborators: Collaborators,
    options: WorkflowSettings,
    document_store: Option<Arc<dyn DocumentStore>>,
    retrieval: RetrievalSettings,
}

impl WorkflowManager {
    pub fn new(collaborators: Collaborators, options: &WorkflowSettings) -> Result<Self, RagError> {
        if options.max_node_visits == 0 {
            return Err(RagError::config("workflow.max_node_visits must be positive"));
        }

        let graph = build_graph(
            Arc::new(collaborators.clone()),
            options.max_node_visits,
            options.grading_policy,
        )?;
        log::info!(
            "Workflow compiled (entry: {}, max node visits: {})",
            graph.entry(),
            graph.max_node_visits()
        );

        Ok(Self {
            graph: Arc::new(graph),
            collaborators,
            options: options.clone(),
            document_store: None,
            retrieval: RetrievalSettings::default(),
        })
    }

    /// Accept ingestion into `store`, chunking text per `retrieval`
    pub fn with_document_store(
        mut self,
        store: Arc<dyn DocumentStore>,
        retrieval: RetrievalSettings,
    ) -> Self {
        self.document_store = Some(store);
        self.retrieval = retrieval;
        self
    }

    /// Wire the production collaborators described by `settings`
    pub fn from_settings(settings: &Settings) -> Result<Self, RagError> {
        let model = model::from_settings(&settings.model)?;

        let web_search = TavilySearch::new(settings.search.max_results)
            .map_err(|e| RagError::config(e.to_string()))?;

        let store = Arc::new(InMemoryDocumentStore::new(settings.retrieval.top_k));

        let memory = if settings.memory.enabled {
            let (actor, session) = settings.memory.actor_and_session();
            let key = SessionKey::new(settings.memory.space.clone(), actor, session);
            log::info!("Conversation memory enabled for {}", key);
            Some(
                MemoryBinding::new(Arc::new(InMemoryConversationStore::new()), key).with_limits(
                    settings.memory.history_limit,
                    settings.memory.context_limit,
                ),
            )
        } else {
            log::info!("Conversation memory disabled");
            None
        };

        let collaborators = Collaborators {
            retriever: store.clone(),
            relevance: Arc::new(LlmGrader::new(GraderKind::Relevance, model.clone())),
            usefulness: Arc::new(LlmGrader::new(GraderKind::Usefulness, model.clone())),
            generator: Arc::new(LlmGenerator::new(
                model,
                GenerationConfig::from(&settings.model),
            )),
            web_search: Arc::new(web_search),
            memory,
        };

        Ok(Self::new(collaborators, &settings.workflow)?
            .with_document_store(store, settings.retrieval.clone()))
    }

    /// Memory session for a named caller, or `None` when memory is disabled
    ///
    /// The key is stable across calls so a caller's follow-up questions see
    /// their earlier exchanges.
    pub fn session_key(&self, username: &str) -> Option<SessionKey> {
        self.collaborators.memory.as_ref().map(|memory| {
            SessionKey::new(
                memory.key.space.clone(),
                format!("user-{}", username),
                format!("session-{}", username),
            )
        })
    }

    fn graph_for(&self, scope: &MemoryScope) -> Result<Arc<CompiledGraph>, RagError> {
        let memory = match scope {
            MemoryScope::Shared => return Ok(self.graph.clone()),
            MemoryScope::Session(key) => self
                .collaborators
                .memory
                .as_ref()
                .map(|memory| memory.for_session(key.clone())),
            MemoryScope::Off => None,
        };
        let collaborators = Collaborators {
            memory,
            ..self.collaborators.clone()
        };
        let graph = build_graph(
            Arc::new(collaborators),
            self.options.max_node_visits,
            self.options.grading_policy,
        )?;
        Ok(Arc::new(graph))
    }

    /// Start a run in the shared session; steps are produced only as the
    /// stream is polled
    pub fn stream(
        &self,
        question: String,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Result<RunEvent, RagError>> + Send + 'static {
        self.graph.stream(WorkflowState::new(question), cancel)
    }

    /// Start a run whose memory is confined to `scope`
    pub fn stream_for(
        &self,
        scope: &MemoryScope,
        question: String,
        cancel: CancellationToken,
    ) -> Result<impl Stream<Item = Result<RunEvent, RagError>> + Send + 'static, RagError> {
        let graph = self.graph_for(scope)?;
        Ok(graph.stream(WorkflowState::new(question), cancel))
    }

    pub async fn run_workflow(&self, question: impl Into<String>) -> Result<RunOutcome, RagError> {
        self.run_workflow_for(&MemoryScope::Shared, question, CancellationToken::new())
            .await
    }

    pub async fn run_workflow_for(
        &self,
        scope: &MemoryScope,
        question: impl Into<String>,
        cancel: CancellationToken,
    ) -> Result<RunOutcome, RagError> {
        let question = question.into();
        log::info!("Running workflow for: {}", question);
        let outcome = self
            .graph_for(scope)?
            .invoke(WorkflowState::new(question), cancel)
            .await?;
        log::info!(
            "Workflow finished ({:?}) after {} node visits",
            outcome.termination,
            outcome.path.len()
        );
        Ok(outcome)
    }

    /// Forward passages to the document store; false when none is configured
    /// or the store rejected them
    pub async fn update_document_store(&self, passages: Vec<Passage>) -> bool {
        let Some(store) = &self.document_store else {
            log::warn!("No document store configured; dropping {} passages", passages.len());
            return false;
        };
        match store.add_documents(passages).await {
            Ok(()) => true,
            Err(e) => {
                log::error!("Failed to update document store: {}", e);
                false
            }
        }
    }

    /// Chunk `text`, tag each chunk with `source`, and add the chunks
    ///
    /// Returns the number of chunks stored.
    pub async fn ingest_text(&self, source: &str, text: &str) -> Result<usize, RagError> {
        let passages: Vec<Passage> = split_text(
            text,
            self.retrieval.chunk_size,
            self.retrieval.chunk_overlap,
        )?
        .into_iter()
        .map(|chunk| Passage::with_source(chunk, source))
        .collect();
        let count = passages.len();

        if count > 0 && !self.update_document_store(passages).await {
            return Err(RagError::other(format!(
                "document store rejected passages from {}",
                source
            )));
        }
        log::info!("Ingested {} chunks from {}", count, source);
        Ok(count)
    }
}
