// SPDX-License-Identifier: MIT

//! LLM-backed answer generator

use super::Generator;
use crate::error::CollabError;
use crate::model::{Content, GenerationConfig, Model};
use async_trait::async_trait;
use std::sync::Arc;

const SYSTEM_PROMPT: &str = "You are an AI research assistant for question-answering tasks. \
Use the retrieved context to answer questions accurately and concisely. \
When the context includes recent conversation, build on earlier questions where it helps. \
If you don't know the answer, say so. Keep responses to three sentences maximum.";

pub struct LlmGenerator {
    model: Arc<dyn Model>,
    config: GenerationConfig,
}

impl LlmGenerator {
    pub fn new(model: Arc<dyn Model>, config: GenerationConfig) -> Self {
        Self { model, config }
    }
}

#[async_trait]
impl Generator for LlmGenerator {
    async fn generate(&self, question: &str, context: &str) -> Result<String, CollabError> {
        let history = [
            Content::system(SYSTEM_PROMPT),
            Content::user(format!("Question: {}\nContext: {}", question, context)),
        ];

        let response = self
            .model
            .generate_content(&history, Some(&self.config))
            .await?;

        let text = response.text();
        if text.trim().is_empty() {
            log::warn!("Generator returned an empty response");
            return Err(CollabError::EmptyResult("generator".to_string()));
        }

        log::info!(
            "Generated answer (length: {}, preview: '{}')",
            text.len(),
            text.chars().take(100).collect::<String>()
        );
        Ok(text)
    }
}
