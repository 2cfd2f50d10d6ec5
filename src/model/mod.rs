// SPDX-License-Identifier: MIT

//! Model module - LLM backend trait and implementations
//!
//! Graders and the answer generator talk to an LLM through the `Model`
//! trait. Backends live in their own submodules:
//! - [anthropic] - Anthropic's Claude API
//! - [openai] - OpenAI-compatible chat completions

pub mod anthropic;
pub mod openai;

use crate::config::ModelSettings;
use crate::error::ModelError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Configuration for model generation
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GenerationConfig {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub top_p: Option<f32>,
}

impl From<&ModelSettings> for GenerationConfig {
    fn from(settings: &ModelSettings) -> Self {
        Self {
            temperature: Some(settings.temperature),
            max_output_tokens: Some(settings.max_tokens),
            top_p: None,
        }
    }
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

/// Parts of a message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Part {
    /// Regular text output from the model
    Text(String),
    /// Reasoning content from thinking models, never shown to users
    Thinking(String),
}

impl Content {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            parts: vec![Part::Text(text.into())],
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            parts: vec![Part::Text(text.into())],
        }
    }

    /// Concatenated text parts, thinking excluded
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                Part::Thinking(_) => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Core trait for LLM model implementations
#[async_trait]
pub trait Model: Send + Sync {
    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
    ) -> Result<Content, ModelError>;
}

/// Build the configured backend
pub fn from_settings(settings: &ModelSettings) -> Result<Arc<dyn Model>, ModelError> {
    let provider = settings.resolved_provider();
    log::info!("Using provider: {} with model: {}", provider, settings.name);

    match provider.as_str() {
        "openai" => Ok(Arc::new(openai::OpenAIModel::new(settings.name.clone())?)),
        "anthropic" => Ok(Arc::new(anthropic::AnthropicModel::new(
            settings.name.clone(),
        )?)),
        other => Err(ModelError::UnsupportedProvider(other.to_string())),
    }
}
