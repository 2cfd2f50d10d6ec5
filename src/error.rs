// SPDX-License-Identifier: MIT

//! Typed error handling for agentic-rag
//!
//! Only two kinds of failure ever reach a caller of a workflow run: graph
//! configuration faults and cancellation. Collaborator faults are absorbed
//! by the safe-invoke barrier and surface as conservative defaults instead.

use thiserror::Error;

/// Top-level error type for agentic-rag
#[derive(Debug, Error)]
pub enum RagError {
    /// Configuration errors (missing env vars, invalid settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed workflow topology
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Model backend errors
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Collaborator faults outside a run, such as document ingestion
    #[error("Collaborator error: {0}")]
    Collab(#[from] CollabError),

    /// The run was cancelled between node transitions
    #[error("Workflow run cancelled after {visits} node visits")]
    Cancelled { visits: usize },

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error wrapper for compatibility
    #[error("{0}")]
    Other(String),
}

/// Workflow graph construction errors
///
/// All of these are detected when the graph is compiled, before any run
/// starts. `UnmappedLabel` can additionally be raised mid-run when a
/// predicate returns a label outside the set it declared.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    /// No entry point was set
    #[error("Graph has no entry point")]
    MissingEntry,

    /// Entry point names a node that was never added
    #[error("Entry point '{0}' is not a declared node")]
    UnknownEntry(String),

    /// The same node name was added twice
    #[error("Node '{0}' declared more than once")]
    DuplicateNode(String),

    /// An edge starts at a node that was never added
    #[error("Edge source '{0}' is not a declared node")]
    UnknownSource(String),

    /// An edge references a node that was never added
    #[error("Edge from '{from}' references undeclared node '{to}'")]
    UnknownNode { from: String, to: String },

    /// A node has more than one outgoing edge
    #[error("Node '{0}' has more than one outgoing edge")]
    DuplicateEdge(String),

    /// A node has no outgoing edge
    #[error("Node '{0}' has no outgoing edge")]
    MissingEdge(String),

    /// A branch is keyed by a label its predicate never produces
    #[error("Node '{node}' maps label '{label}' which its predicate does not declare")]
    UnknownLabel { node: String, label: String },

    /// A predicate label has no branch to follow
    #[error("Node '{node}' has no branch for predicate label '{label}'")]
    UnmappedLabel { node: String, label: String },
}

/// Collaborator faults
///
/// Raised by retrievers, graders, generators, search providers and memory
/// stores. The workflow never propagates these; see `workflow::invoke`.
#[derive(Debug, Error)]
pub enum CollabError {
    /// The backing service reported a failure
    #[error("{collaborator} failed: {message}")]
    Backend {
        collaborator: String,
        message: String,
    },

    /// Output could not be interpreted
    #[error("Malformed output: {0}")]
    Malformed(String),

    /// The collaborator returned nothing usable
    #[error("Empty result from {0}")]
    EmptyResult(String),

    /// Model call failed
    #[error(transparent)]
    Model(#[from] ModelError),

    /// HTTP request errors
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Model/LLM-specific errors
#[derive(Debug, Error)]
pub enum ModelError {
    /// API key not configured
    #[error("API key not configured for provider: {0}")]
    ApiKeyMissing(String),

    /// Provider not supported
    #[error("Provider not supported: {0}")]
    UnsupportedProvider(String),

    /// Invalid response from model
    #[error("Invalid response from model: {0}")]
    InvalidResponse(String),

    /// HTTP request errors
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl RagError {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create from a generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

impl CollabError {
    /// Create a backend error
    pub fn backend(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            collaborator: collaborator.into(),
            message: message.into(),
        }
    }
}

impl From<&str> for RagError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for RagError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_error_messages() {
        let err = GraphError::UnknownNode {
            from: "retrieve".to_string(),
            to: "rerank".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Edge from 'retrieve' references undeclared node 'rerank'"
        );

        let err = GraphError::UnmappedLabel {
            node: "generate".to_string(),
            label: "useful".to_string(),
        };
        assert!(err.to_string().contains("useful"));
    }

    #[test]
    fn test_graph_error_converts_into_rag_error() {
        let err: RagError = GraphError::MissingEntry.into();
        assert!(matches!(err, RagError::Graph(GraphError::MissingEntry)));
        assert_eq!(err.to_string(), "Graph error: Graph has no entry point");
    }

    #[test]
    fn test_ingestion_fault_converts_into_rag_error() {
        let err: RagError = CollabError::backend("tokenizer", "vocabulary missing").into();
        assert!(matches!(err, RagError::Collab(CollabError::Backend { .. })));
        assert_eq!(
            err.to_string(),
            "Collaborator error: tokenizer failed: vocabulary missing"
        );
    }

    #[test]
    fn test_collab_error_backend() {
        let err = CollabError::backend("retriever", "connection refused");
        assert_eq!(err.to_string(), "retriever failed: connection refused");
    }

    #[test]
    fn test_string_conversions() {
        let err: RagError = "boom".into();
        assert_eq!(err.to_string(), "boom");

        let err = RagError::config("max_node_visits must be positive");
        assert!(err.to_string().starts_with("Configuration error"));
    }
}
