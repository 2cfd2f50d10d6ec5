// SPDX-License-Identifier: MIT

//! Routing predicates
//!
//! Each predicate maps the state after a node to one of a fixed set of
//! labels. The graph maps labels to targets.

use super::graph::Router;
use super::invoke::safe_invoke;
use super::state::{FallbackSearch, WorkflowState, FALLBACK_PHRASE};
use crate::config::GradingPolicy;
use crate::sources::{Grade, GradeFields, Grader};
use async_trait::async_trait;
use std::sync::Arc;

pub const GENERATE: &str = "generate";
pub const RETRIEVE: &str = "retrieve";
pub const WEBSEARCH: &str = "websearch";
pub const USEFUL: &str = "useful";
pub const NOT_USEFUL: &str = "not_useful";
pub const NOT_SUPPORTED: &str = "not_supported";

/// Answer from memory when it was judged relevant
pub fn after_memory(state: &WorkflowState) -> &'static str {
    match state.needs_fallback_search() {
        FallbackSearch::No => GENERATE,
        FallbackSearch::Yes => RETRIEVE,
    }
}

/// Fall back to the web when no retrieved passage survived grading
pub fn after_document_grading(state: &WorkflowState) -> &'static str {
    match state.needs_fallback_search() {
        FallbackSearch::Yes => WEBSEARCH,
        FallbackSearch::No => GENERATE,
    }
}

/// Accept the answer or search again
///
/// An explicit "not enough information" answer is accepted as-is so the
/// run terminates. `not_supported` is never produced here.
pub async fn after_generation(
    state: &WorkflowState,
    usefulness: &dyn Grader,
    policy: GradingPolicy,
) -> &'static str {
    let generation = state.generation().unwrap_or_default();
    if generation.contains(FALLBACK_PHRASE) {
        log::info!("---DECISION: FALLBACK ANSWER, ENDING RUN---");
        return USEFUL;
    }

    let mut fields = GradeFields::new();
    fields.insert("question".to_string(), state.question().to_string());
    fields.insert("generation".to_string(), generation.to_string());

    let default = match policy {
        GradingPolicy::FailOpen => Grade::Yes,
        GradingPolicy::FailClosed => Grade::No,
    };
    let grade = safe_invoke(
        "usefulness_grader.grade",
        default,
        usefulness.grade(&fields),
    )
    .await;

    if grade.is_yes() {
        log::info!("---DECISION: GENERATION ADDRESSES QUESTION---");
        USEFUL
    } else {
        log::info!("---DECISION: GENERATION DOES NOT ADDRESS QUESTION---");
        NOT_USEFUL
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate {
    AfterMemory,
    AfterDocumentGrading,
    AfterGeneration,
}

/// A predicate together with what it needs to evaluate
pub struct RagRouter {
    predicate: Predicate,
    usefulness: Arc<dyn Grader>,
    policy: GradingPolicy,
}

impl RagRouter {
    pub fn new(predicate: Predicate, usefulness: Arc<dyn Grader>, policy: GradingPolicy) -> Self {
        Self {
            predicate,
            usefulness,
            policy,
        }
    }
}

#[async_trait]
impl Router for RagRouter {
    fn labels(&self) -> &'static [&'static str] {
        match self.predicate {
            Predicate::AfterMemory => &[GENERATE, RETRIEVE],
            Predicate::AfterDocumentGrading => &[WEBSEARCH, GENERATE],
            Predicate::AfterGeneration => &[USEFUL, NOT_USEFUL, NOT_SUPPORTED],
        }
    }

    async fn route(&self, state: &WorkflowState) -> &'static str {
        match self.predicate {
            Predicate::AfterMemory => after_memory(state),
            Predicate::AfterDocumentGrading => after_document_grading(state),
            Predicate::AfterGeneration => {
                after_generation(state, self.usefulness.as_ref(), self.policy).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollabError;
    use crate::workflow::state::{StateDelta, INSUFFICIENT_INFORMATION};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedGrader {
        grade: Option<Grade>,
        calls: AtomicUsize,
    }

    impl FixedGrader {
        fn new(grade: Option<Grade>) -> Self {
            Self {
                grade,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Grader for FixedGrader {
        async fn grade(&self, fields: &GradeFields) -> Result<Grade, CollabError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(fields.contains_key("question"));
            assert!(fields.contains_key("generation"));
            self.grade
                .ok_or_else(|| CollabError::Malformed("no score".to_string()))
        }
    }

    fn with_fallback(flag: FallbackSearch) -> WorkflowState {
        WorkflowState::new("q").merge(StateDelta {
            needs_fallback_search: Some(flag),
            ..Default::default()
        })
    }

    fn with_generation(text: &str) -> WorkflowState {
        WorkflowState::new("q").merge(StateDelta {
            generation: Some(text.to_string()),
            ..Default::default()
        })
    }

    #[test]
    fn test_after_memory() {
        assert_eq!(after_memory(&with_fallback(FallbackSearch::No)), GENERATE);
        assert_eq!(after_memory(&with_fallback(FallbackSearch::Yes)), RETRIEVE);
        assert_eq!(after_memory(&WorkflowState::new("q")), RETRIEVE);
    }

    #[test]
    fn test_after_document_grading() {
        assert_eq!(
            after_document_grading(&with_fallback(FallbackSearch::Yes)),
            WEBSEARCH
        );
        assert_eq!(
            after_document_grading(&with_fallback(FallbackSearch::No)),
            GENERATE
        );
        assert_eq!(after_document_grading(&WorkflowState::new("q")), WEBSEARCH);
    }

    #[tokio::test]
    async fn test_after_generation_fallback_skips_grader() {
        let grader = FixedGrader::new(Some(Grade::No));
        let label = after_generation(
            &with_generation(INSUFFICIENT_INFORMATION),
            &grader,
            GradingPolicy::FailOpen,
        )
        .await;
        assert_eq!(label, USEFUL);
        assert_eq!(grader.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_after_generation_follows_grade() {
        let yes = FixedGrader::new(Some(Grade::Yes));
        let no = FixedGrader::new(Some(Grade::No));
        let state = with_generation("Paris");
        assert_eq!(
            after_generation(&state, &yes, GradingPolicy::FailOpen).await,
            USEFUL
        );
        assert_eq!(
            after_generation(&state, &no, GradingPolicy::FailOpen).await,
            NOT_USEFUL
        );
    }

    #[tokio::test]
    async fn test_after_generation_grader_failure_policy() {
        let broken = FixedGrader::new(None);
        let state = with_generation("Paris");
        assert_eq!(
            after_generation(&state, &broken, GradingPolicy::FailOpen).await,
            USEFUL
        );
        assert_eq!(
            after_generation(&state, &broken, GradingPolicy::FailClosed).await,
            NOT_USEFUL
        );
    }

    #[test]
    fn test_router_labels() {
        let grader: Arc<dyn Grader> = Arc::new(FixedGrader::new(Some(Grade::Yes)));
        let router = RagRouter::new(
            Predicate::AfterGeneration,
            grader.clone(),
            GradingPolicy::FailOpen,
        );
        assert_eq!(router.labels(), &[USEFUL, NOT_USEFUL, NOT_SUPPORTED]);

        let router = RagRouter::new(Predicate::AfterMemory, grader, GradingPolicy::FailOpen);
        assert_eq!(router.labels(), &[GENERATE, RETRIEVE]);
    }
}
