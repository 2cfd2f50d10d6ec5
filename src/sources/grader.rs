// SPDX-License-Identifier: MIT

//! LLM-backed binary graders

use super::{Grade, GradeFields, Grader};
use crate::error::CollabError;
use crate::model::{Content, GenerationConfig, Model};
use async_trait::async_trait;
use std::sync::Arc;

/// Which judgment a grader makes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraderKind {
    /// Is a document relevant to the question?
    Relevance,
    /// Is an answer supported by the documents?
    Grounding,
    /// Does an answer resolve the question?
    Usefulness,
}

impl GraderKind {
    pub fn name(self) -> &'static str {
        match self {
            GraderKind::Relevance => "relevance_grader",
            GraderKind::Grounding => "grounding_grader",
            GraderKind::Usefulness => "usefulness_grader",
        }
    }

    /// Fields the prompt template needs
    pub fn required_fields(self) -> &'static [&'static str] {
        match self {
            GraderKind::Relevance => &["question", "document"],
            GraderKind::Grounding => &["documents", "generation"],
            GraderKind::Usefulness => &["question", "generation"],
        }
    }

    fn instruction(self) -> &'static str {
        match self {
            GraderKind::Relevance => {
                "You grade whether a retrieved document is relevant to a user question. \
                 A document that shares keywords or meaning with the question counts as relevant; \
                 the check is lenient and only meant to weed out wrong retrievals."
            }
            GraderKind::Grounding => {
                "You grade whether an answer is grounded in and supported by a set of facts."
            }
            GraderKind::Usefulness => {
                "You grade whether an answer is useful for resolving a question."
            }
        }
    }

    fn render(self, fields: &GradeFields) -> String {
        let field = |name: &str| -> String { fields.get(name).cloned().unwrap_or_default() };
        match self {
            GraderKind::Relevance => format!(
                "Retrieved document:\n\n{}\n\nUser question: {}",
                field("document"),
                field("question")
            ),
            GraderKind::Grounding => format!(
                "Facts:\n-------\n{}\n-------\nAnswer: {}",
                field("documents"),
                field("generation")
            ),
            GraderKind::Usefulness => format!(
                "Answer:\n-------\n{}\n-------\nQuestion: {}",
                field("generation"),
                field("question")
            ),
        }
    }
}

/// Grader that asks a model for `{"score": "yes"|"no"}`
pub struct LlmGrader {
    kind: GraderKind,
    model: Arc<dyn Model>,
    config: GenerationConfig,
}

impl LlmGrader {
    pub fn new(kind: GraderKind, model: Arc<dyn Model>) -> Self {
        Self {
            kind,
            model,
            // Verdicts should be as repeatable as the backend allows
            config: GenerationConfig {
                temperature: Some(0.0),
                max_output_tokens: Some(64),
                top_p: None,
            },
        }
    }

    pub fn kind(&self) -> GraderKind {
        self.kind
    }
}

/// Parse a `{"score": ...}` verdict, tolerating code fences and surrounding prose
pub(crate) fn parse_score(raw: &str) -> Result<Grade, CollabError> {
    let start = raw.find('{');
    let end = raw.rfind('}');
    let body = match (start, end) {
        (Some(s), Some(e)) if s < e => &raw[s..=e],
        _ => return Err(CollabError::Malformed(format!("no JSON object in '{}'", raw))),
    };

    let value: serde_json::Value = serde_json::from_str(body)?;
    let score = value
        .get("score")
        .and_then(|s| s.as_str())
        .ok_or_else(|| CollabError::Malformed(format!("missing 'score' in '{}'", body)))?;

    match score.trim().to_lowercase().as_str() {
        "yes" => Ok(Grade::Yes),
        "no" => Ok(Grade::No),
        other => Err(CollabError::Malformed(format!("unexpected score '{}'", other))),
    }
}

#[async_trait]
impl Grader for LlmGrader {
    async fn grade(&self, fields: &GradeFields) -> Result<Grade, CollabError> {
        if let Some(missing) = self
            .kind
            .required_fields()
            .iter()
            .find(|f| !fields.contains_key(**f))
        {
            return Err(CollabError::Malformed(format!(
                "{} requires field '{}'",
                self.kind.name(),
                missing
            )));
        }

        let system = format!(
            "{} Give a binary score 'yes' or 'no'. Reply with a JSON object with the single \
             key 'score' and no preamble or explanation.",
            self.kind.instruction()
        );
        let history = [Content::system(system), Content::user(self.kind.render(fields))];

        let response = self
            .model
            .generate_content(&history, Some(&self.config))
            .await?;

        parse_score(&response.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use crate::model::Part;
    use std::sync::Mutex;

    struct ScriptedModel {
        reply: String,
        seen: Mutex<Vec<Content>>,
    }

    impl ScriptedModel {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Model for ScriptedModel {
        async fn generate_content(
            &self,
            history: &[Content],
            _config: Option<&GenerationConfig>,
        ) -> Result<Content, ModelError> {
            self.seen.lock().unwrap().extend(history.iter().cloned());
            Ok(Content {
                role: "model".to_string(),
                parts: vec![Part::Text(self.reply.clone())],
            })
        }
    }

    fn fields(pairs: &[(&str, &str)]) -> GradeFields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_score_variants() {
        assert_eq!(parse_score(r#"{"score": "yes"}"#).unwrap(), Grade::Yes);
        assert_eq!(parse_score(r#"{"score": " NO "}"#).unwrap(), Grade::No);
        assert_eq!(
            parse_score("```json\n{\"score\": \"Yes\"}\n```").unwrap(),
            Grade::Yes
        );
    }

    #[test]
    fn test_parse_score_malformed() {
        assert!(parse_score("yes").is_err());
        assert!(parse_score(r#"{"verdict": "yes"}"#).is_err());
        assert!(parse_score(r#"{"score": "maybe"}"#).is_err());
    }

    #[tokio::test]
    async fn test_relevance_grader_renders_fields() {
        let model = Arc::new(ScriptedModel::new(r#"{"score": "yes"}"#));
        let grader = LlmGrader::new(GraderKind::Relevance, model.clone());

        let grade = grader
            .grade(&fields(&[
                ("question", "What is prompt engineering?"),
                ("document", "Prompt engineering is the craft of writing inputs."),
            ]))
            .await
            .unwrap();

        assert_eq!(grade, Grade::Yes);
        let seen = model.seen.lock().unwrap();
        assert_eq!(seen[0].role, "system");
        assert!(seen[1].text().contains("What is prompt engineering?"));
        assert!(seen[1].text().contains("craft of writing inputs"));
    }

    #[tokio::test]
    async fn test_missing_field_is_malformed() {
        let model = Arc::new(ScriptedModel::new(r#"{"score": "yes"}"#));
        let grader = LlmGrader::new(GraderKind::Usefulness, model.clone());

        let result = grader.grade(&fields(&[("question", "q")])).await;
        assert!(matches!(result, Err(CollabError::Malformed(_))));
        assert!(model.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_prose_reply_is_malformed() {
        let model = Arc::new(ScriptedModel::new("I think it is relevant."));
        let grader = LlmGrader::new(GraderKind::Grounding, model);

        let result = grader
            .grade(&fields(&[("documents", "facts"), ("generation", "answer")]))
            .await;
        assert!(result.is_err());
    }
}
