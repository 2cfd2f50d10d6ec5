// SPDX-License-Identifier: MIT

//! Graph construction and validation
//!
//! Nodes are added by name, then wired with unconditional edges or with a
//! routing predicate whose labels map to targets. `compile` rejects any
//! topology fault before a run can start.

use super::executor::CompiledGraph;
use super::state::{StateDelta, WorkflowState};
use crate::error::GraphError;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Terminal marker; routing here ends the run
pub const END: &str = "__end__";

/// A step of the workflow
///
/// Nodes never fail: collaborator faults are absorbed inside the handler
/// and show up as conservative values in the returned delta.
#[async_trait]
pub trait Node: Send + Sync {
    async fn run(&self, state: &WorkflowState) -> StateDelta;
}

/// Decides which branch to follow after a node
#[async_trait]
pub trait Router: Send + Sync {
    /// Every label `route` can return
    fn labels(&self) -> &'static [&'static str];

    async fn route(&self, state: &WorkflowState) -> &'static str;
}

/// Outgoing edge of a node
pub(crate) enum Edge {
    Direct(String),
    Conditional {
        router: Arc<dyn Router>,
        branches: HashMap<String, String>,
    },
}

/// Graph builder
#[derive(Default)]
pub struct StateGraph {
    nodes: Vec<(String, Arc<dyn Node>)>,
    entry: Option<String>,
    edges: Vec<(String, Edge)>,
}

impl StateGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, name: impl Into<String>, node: Arc<dyn Node>) -> &mut Self {
        self.nodes.push((name.into(), node));
        self
    }

    pub fn set_entry_point(&mut self, name: impl Into<String>) -> &mut Self {
        self.entry = Some(name.into());
        self
    }

    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        self.edges.push((from.into(), Edge::Direct(to.into())));
        self
    }

    /// Route from `from` through `router`; `branches` maps each label to a target
    pub fn add_conditional_edges<'a>(
        &mut self,
        from: impl Into<String>,
        router: Arc<dyn Router>,
        branches: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> &mut Self {
        let branches = branches
            .into_iter()
            .map(|(label, target)| (label.to_string(), target.to_string()))
            .collect();
        self.edges
            .push((from.into(), Edge::Conditional { router, branches }));
        self
    }

    /// Validate the topology and freeze it
    pub fn compile(self, max_node_visits: usize) -> Result<CompiledGraph, GraphError> {
        let mut nodes: HashMap<String, Arc<dyn Node>> = HashMap::new();
        for (name, node) in self.nodes {
            if name == END || nodes.contains_key(&name) {
                return Err(GraphError::DuplicateNode(name));
            }
            nodes.insert(name, node);
        }

        let entry = self.entry.ok_or(GraphError::MissingEntry)?;
        if !nodes.contains_key(&entry) {
            return Err(GraphError::UnknownEntry(entry));
        }

        let is_target = |name: &str| name == END || nodes.contains_key(name);

        let mut edges: HashMap<String, Edge> = HashMap::new();
        for (from, edge) in self.edges {
            if !nodes.contains_key(&from) {
                return Err(GraphError::UnknownSource(from));
            }
            if edges.contains_key(&from) {
                return Err(GraphError::DuplicateEdge(from));
            }

            match &edge {
                Edge::Direct(to) => {
                    if !is_target(to) {
                        return Err(GraphError::UnknownNode {
                            from,
                            to: to.clone(),
                        });
                    }
                }
                Edge::Conditional { router, branches } => {
                    let declared: HashSet<&str> = router.labels().iter().copied().collect();
                    // Sorted for deterministic error reporting
                    let mut mapped: Vec<(&String, &String)> = branches.iter().collect();
                    mapped.sort();
                    for (label, to) in mapped {
                        if !declared.contains(label.as_str()) {
                            return Err(GraphError::UnknownLabel {
                                node: from,
                                label: label.clone(),
                            });
                        }
                        if !is_target(to) {
                            return Err(GraphError::UnknownNode {
                                from,
                                to: to.clone(),
                            });
                        }
                    }
                    let unmapped = router
                        .labels()
                        .iter()
                        .find(|l| !branches.contains_key(**l));
                    if let Some(label) = unmapped {
                        return Err(GraphError::UnmappedLabel {
                            node: from,
                            label: label.to_string(),
                        });
                    }
                }
            }

            edges.insert(from, edge);
        }

        let mut names: Vec<&String> = nodes.keys().collect();
        names.sort();
        if let Some(name) = names.into_iter().find(|n| !edges.contains_key(*n)) {
            return Err(GraphError::MissingEdge(name.clone()));
        }

        Ok(CompiledGraph::new(nodes, edges, entry, max_node_visits))
    }
}
