// SPDX-License-Identifier: MIT

//! Graph workflow executor
//!
//! A run is a lazy stream: each poll executes exactly one node, merges its
//! delta, consults the node's outgoing edge and yields the step. Nothing
//! runs ahead of the consumer, and a fresh stream is built for every run.

use super::graph::{Edge, Node, END};
use super::state::{StateDelta, WorkflowState};
use crate::error::{GraphError, RagError};
use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// A predicate routed to `END`
    Completed,
    /// The node-visit budget ran out; the best available answer was kept
    BudgetExhausted,
}

/// Final result of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub state: WorkflowState,
    pub termination: Termination,
    /// Nodes in the order they were visited
    pub path: Vec<String>,
}

/// Item yielded by a run
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// A node finished and its delta was merged
    Step { node: String, delta: StateDelta },
    /// Last item of a run that was not cancelled
    Finished(RunOutcome),
}

/// Validated, immutable workflow graph
pub struct CompiledGraph {
    nodes: HashMap<String, Arc<dyn Node>>,
    edges: HashMap<String, Edge>,
    entry: String,
    max_node_visits: usize,
}

impl CompiledGraph {
    pub(crate) fn new(
        nodes: HashMap<String, Arc<dyn Node>>,
        edges: HashMap<String, Edge>,
        entry: String,
        max_node_visits: usize,
    ) -> Self {
        Self {
            nodes,
            edges,
            entry,
            max_node_visits,
        }
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn max_node_visits(&self) -> usize {
        self.max_node_visits
    }

    /// Start a run; `cancel` is checked between node transitions
    pub fn stream(
        self: &Arc<Self>,
        initial: WorkflowState,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Result<RunEvent, RagError>> + Send + 'static {
        let cursor = Cursor {
            graph: Arc::clone(self),
            state: initial,
            next: Some(self.entry.clone()),
            path: Vec::new(),
            cancel,
            done: false,
        };
        stream::unfold(cursor, |cursor| cursor.advance())
    }

    /// Drain a run and return its outcome
    pub async fn invoke(
        self: &Arc<Self>,
        initial: WorkflowState,
        cancel: CancellationToken,
    ) -> Result<RunOutcome, RagError> {
        let mut events = Box::pin(self.stream(initial, cancel));
        while let Some(event) = events.next().await {
            if let RunEvent::Finished(outcome) = event? {
                return Ok(outcome);
            }
        }
        Err(RagError::other("workflow stream ended without an outcome"))
    }

    /// Follow the outgoing edge of `node`; `None` means END
    async fn next_node(
        &self,
        node: &str,
        state: &WorkflowState,
    ) -> Result<Option<String>, GraphError> {
        let edge = self
            .edges
            .get(node)
            .ok_or_else(|| GraphError::MissingEdge(node.to_string()))?;

        let target = match edge {
            Edge::Direct(to) => to.clone(),
            Edge::Conditional { router, branches } => {
                let label = router.route(state).await;
                log::info!("Node {} routed via '{}'", node, label);
                branches
                    .get(label)
                    .cloned()
                    .ok_or_else(|| GraphError::UnmappedLabel {
                        node: node.to_string(),
                        label: label.to_string(),
                    })?
            }
        };

        Ok((target != END).then_some(target))
    }
}

type Advance = Option<(Result<RunEvent, RagError>, Cursor)>;

/// Per-run execution state behind the stream
struct Cursor {
    graph: Arc<CompiledGraph>,
    state: WorkflowState,
    next: Option<String>,
    path: Vec<String>,
    cancel: CancellationToken,
    done: bool,
}

impl Cursor {
    fn finish(mut self, state: WorkflowState, termination: Termination) -> Advance {
        self.done = true;
        let outcome = RunOutcome {
            state,
            termination,
            path: self.path.clone(),
        };
        Some((Ok(RunEvent::Finished(outcome)), self))
    }

    fn fail(mut self, err: RagError) -> Advance {
        self.done = true;
        Some((Err(err), self))
    }

    async fn advance(mut self) -> Advance {
        if self.done {
            return None;
        }

        // A run that already routed to END has no transition left to cancel
        let Some(name) = self.next.clone() else {
            log::info!("Run completed: {}", self.path.join(" -> "));
            let state = self.state.clone();
            return self.finish(state, Termination::Completed);
        };

        if self.cancel.is_cancelled() {
            log::warn!("Run cancelled after {} node visits", self.path.len());
            let visits = self.path.len();
            return self.fail(RagError::Cancelled { visits });
        }

        if self.path.len() >= self.graph.max_node_visits {
            log::warn!(
                "Node-visit budget of {} exhausted before '{}'; returning best available answer",
                self.graph.max_node_visits,
                name
            );
            let state = self.state.with_best_available_answer();
            return self.finish(state, Termination::BudgetExhausted);
        }

        let Some(node) = self.graph.nodes.get(&name).cloned() else {
            let from = self.path.last().cloned().unwrap_or_default();
            return self.fail(GraphError::UnknownNode { from, to: name }.into());
        };

        log::info!("Executing node: {}", name);
        let delta = node.run(&self.state).await;
        self.state = self.state.merge(delta.clone());
        self.path.push(name.clone());

        match self.graph.next_node(&name, &self.state).await {
            Ok(next) => {
                self.next = next;
                Some((Ok(RunEvent::Step { node: name, delta }), self))
            }
            Err(e) => {
                log::error!("Routing after '{}' failed: {}", name, e);
                self.fail(e.into())
            }
        }
    }
}
