// SPDX-License-Identifier: MIT

//! Settings loading
//!
//! Settings come from an optional YAML file and are then overridden by
//! environment variables (a `.env` file is honoured by the binary).

use crate::error::RagError;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

/// Top-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub model: ModelSettings,
    pub memory: MemorySettings,
    pub search: SearchSettings,
    pub retrieval: RetrievalSettings,
    pub workflow: WorkflowSettings,
    pub server: ServerSettings,
}

/// LLM backend used by graders and the generator
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelSettings {
    /// "anthropic" or "openai"; inferred from `name` when unset
    pub provider: Option<String>,
    pub name: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            provider: None,
            name: "claude-3-haiku-20240307".to_string(),
            temperature: 0.7,
            max_tokens: 2000,
        }
    }
}

impl ModelSettings {
    /// Resolve the provider, inferring it from the model name when unset
    pub fn resolved_provider(&self) -> String {
        if let Some(provider) = &self.provider {
            return provider.to_lowercase();
        }
        if self.name.starts_with("gpt") || self.name.starts_with("o1") {
            "openai".to_string()
        } else {
            "anthropic".to_string()
        }
    }
}

/// Conversation memory
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MemorySettings {
    pub enabled: bool,
    /// Memory space shared by all actors of this deployment
    pub space: String,
    /// Drives actor and session ids when set
    pub username: Option<String>,
    /// Events read by the search-memory node
    pub history_limit: usize,
    /// Events folded into the generation context
    pub context_limit: usize,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            space: "rag_memory".to_string(),
            username: None,
            history_limit: 10,
            context_limit: 5,
        }
    }
}

impl MemorySettings {
    /// Actor and session identifiers for this process
    pub fn actor_and_session(&self) -> (String, String) {
        let stamp = Local::now().format("%Y%m%d%H%M%S").to_string();
        match &self.username {
            Some(user) => (
                format!("user-{}", user),
                format!("session-{}-{}", user, stamp),
            ),
            None => (format!("user-{}", stamp), format!("rag-{}", stamp)),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SearchSettings {
    pub max_results: u32,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self { max_results: 3 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 5,
            chunk_size: 512,
            chunk_overlap: 50,
        }
    }
}

/// What `after_generation` concludes when the usefulness grader fails
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GradingPolicy {
    /// Treat the answer as useful
    #[default]
    FailOpen,
    /// Treat the answer as not useful and search again
    FailClosed,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkflowSettings {
    pub max_node_visits: usize,
    pub grading_policy: GradingPolicy,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            max_node_visits: 10,
            grading_policy: GradingPolicy::FailOpen,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSettings {
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { port: 3000 }
    }
}

impl Settings {
    /// Load settings from an optional YAML file, then apply env overrides
    pub fn load(path: Option<&Path>) -> Result<Self, RagError> {
        let mut settings = match path {
            Some(path) => Self::parse_yaml(&fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        settings.apply_env();
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from a YAML string
    pub fn parse_yaml(content: &str) -> Result<Self, RagError> {
        Ok(serde_yaml::from_str(content)?)
    }

    fn apply_env(&mut self) {
        if let Ok(provider) = env::var("MODEL_PROVIDER") {
            self.model.provider = Some(provider);
        }
        if let Ok(name) = env::var("MODEL_NAME") {
            self.model.name = name;
        }
        if let Ok(user) = env::var("RAG_USERNAME") {
            self.memory.username = Some(user);
        }
        if let Some(visits) = env::var("RAG_MAX_NODE_VISITS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.workflow.max_node_visits = visits;
        }
    }

    /// Reject settings the workflow cannot run with
    pub fn validate(&self) -> Result<(), RagError> {
        if self.workflow.max_node_visits == 0 {
            return Err(RagError::config("workflow.max_node_visits must be positive"));
        }
        if self.retrieval.chunk_size == 0 {
            return Err(RagError::config("retrieval.chunk_size must be positive"));
        }
        if self.retrieval.chunk_overlap >= self.retrieval.chunk_size {
            return Err(RagError::config(
                "retrieval.chunk_overlap must be smaller than retrieval.chunk_size",
            ));
        }
        Ok(())
    }
}
