// SPDX-License-Identifier: MIT

//! Run state threaded through every node
//!
//! `WorkflowState` is an immutable value: nodes read it and return a
//! `StateDelta`, and the executor builds the next state with `merge`.
//! Keeping every intermediate state intact makes a run replayable.

use crate::sources::Passage;
use serde::{Deserialize, Serialize};

/// Answer substituted whenever generation fails or the loop budget runs out
pub const INSUFFICIENT_INFORMATION: &str =
    "I don't have enough information to answer this question.";

/// Phrase that marks a gracefully degraded answer
pub const FALLBACK_PHRASE: &str = "I don't have enough information";

/// Routing signal set by the grading nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FallbackSearch {
    Yes,
    No,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowState {
    question: String,
    documents: Vec<Passage>,
    generation: Option<String>,
    needs_fallback_search: Option<FallbackSearch>,
}

/// Fields a node wants to change; `None` leaves the current value in place
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documents: Option<Vec<Passage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs_fallback_search: Option<FallbackSearch>,
}

impl WorkflowState {
    /// Initial state; the question is fixed for the rest of the run
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            documents: Vec::new(),
            generation: None,
            needs_fallback_search: None,
        }
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn documents(&self) -> &[Passage] {
        &self.documents
    }

    pub fn generation(&self) -> Option<&str> {
        self.generation.as_deref()
    }

    /// Unset reads as `Yes`: an extra search beats answering from nothing
    pub fn needs_fallback_search(&self) -> FallbackSearch {
        self.needs_fallback_search.unwrap_or(FallbackSearch::Yes)
    }

    /// Build the next state; delta fields overwrite, absent fields persist
    pub fn merge(&self, delta: StateDelta) -> WorkflowState {
        if let Some(question) = &delta.question {
            if question != &self.question {
                log::warn!("Ignoring attempt to rewrite the question mid-run");
            }
        }

        WorkflowState {
            question: self.question.clone(),
            documents: delta.documents.unwrap_or_else(|| self.documents.clone()),
            generation: delta.generation.or_else(|| self.generation.clone()),
            needs_fallback_search: delta.needs_fallback_search.or(self.needs_fallback_search),
        }
    }

    /// State forced to terminate with the best answer available
    pub(crate) fn with_best_available_answer(&self) -> WorkflowState {
        let generation = match self.generation.as_deref() {
            Some(g) if !g.trim().is_empty() => g.to_string(),
            _ => INSUFFICIENT_INFORMATION.to_string(),
        };
        WorkflowState {
            generation: Some(generation),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_defaults() {
        let state = WorkflowState::new("What is RAG?");
        assert_eq!(state.question(), "What is RAG?");
        assert!(state.documents().is_empty());
        assert_eq!(state.generation(), None);
        assert_eq!(state.needs_fallback_search(), FallbackSearch::Yes);
    }

    #[test]
    fn test_merge_overwrites_and_persists() {
        let state = WorkflowState::new("q").merge(StateDelta {
            documents: Some(vec![Passage::new("a"), Passage::new("b")]),
            needs_fallback_search: Some(FallbackSearch::No),
            ..Default::default()
        });

        let next = state.merge(StateDelta {
            generation: Some("answer".to_string()),
            ..Default::default()
        });

        assert_eq!(next.documents().len(), 2);
        assert_eq!(next.needs_fallback_search(), FallbackSearch::No);
        assert_eq!(next.generation(), Some("answer"));
        // The source state is untouched
        assert_eq!(state.generation(), None);
    }

    #[test]
    fn test_merge_replaces_documents_wholesale() {
        let state = WorkflowState::new("q").merge(StateDelta {
            documents: Some(vec![Passage::new("a"), Passage::new("b")]),
            ..Default::default()
        });
        let next = state.merge(StateDelta {
            documents: Some(vec![]),
            ..Default::default()
        });
        assert!(next.documents().is_empty());
    }

    #[test]
    fn test_merge_never_rewrites_question() {
        let state = WorkflowState::new("first question");
        let next = state.merge(StateDelta {
            question: Some("rewritten".to_string()),
            ..Default::default()
        });
        assert_eq!(next.question(), "first question");
    }

    #[test]
    fn test_best_available_answer() {
        let state = WorkflowState::new("q");
        assert_eq!(
            state.with_best_available_answer().generation(),
            Some(INSUFFICIENT_INFORMATION)
        );

        let answered = state.merge(StateDelta {
            generation: Some("partial answer".to_string()),
            ..Default::default()
        });
        assert_eq!(
            answered.with_best_available_answer().generation(),
            Some("partial answer")
        );
    }

    #[test]
    fn test_delta_serialization_skips_absent_fields() {
        let delta = StateDelta {
            needs_fallback_search: Some(FallbackSearch::Yes),
            ..Default::default()
        };
        let json = serde_json::to_value(&delta).unwrap();
        assert_eq!(json, serde_json::json!({ "needs_fallback_search": "Yes" }));
    }
}
