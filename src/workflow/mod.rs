// SPDX-License-Identifier: MIT

//! Retrieval-augmented answer workflow
//!
//! A small state-machine engine (`graph`, `executor`) driving six steps
//! (`nodes`) between memory, a document store, web search and an answer
//! generator, with routing decided by `routing`. `WorkflowManager` is the
//! entry point.

pub mod executor;
pub mod graph;
pub mod invoke;
pub mod manager;
pub mod nodes;
pub mod routing;
pub mod state;

pub use executor::{CompiledGraph, RunEvent, RunOutcome, Termination};
pub use graph::{Node, Router, StateGraph, END};
pub use invoke::safe_invoke;
pub use manager::{build_graph, MemoryScope, WorkflowManager};
pub use nodes::{Collaborators, MemoryBinding, NodeKind, RagNode, NO_WEB_RESULTS};
pub use state::{
    FallbackSearch, StateDelta, WorkflowState, FALLBACK_PHRASE, INSUFFICIENT_INFORMATION,
};
