// SPDX-License-Identifier: MIT

//! In-memory document store
//!
//! Ranks passages by term overlap with the query. Ingestion may run
//! concurrently with retrieval; a read sees whatever was committed when
//! it took the lock.

use super::{DocumentStore, Passage, Retriever};
use crate::error::CollabError;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::sync::Arc;
use tiktoken_rs::CoreBPE;
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct InMemoryDocumentStore {
    passages: Arc<RwLock<Vec<Passage>>>,
    top_k: usize,
}

impl InMemoryDocumentStore {
    pub fn new(top_k: usize) -> Self {
        Self {
            passages: Arc::new(RwLock::new(Vec::new())),
            top_k,
        }
    }

    pub async fn len(&self) -> usize {
        self.passages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Words too common to say anything about relevance
static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "and", "for", "are", "was", "were", "what", "which", "who", "how", "why",
        "when", "where", "with", "this", "that", "from", "does", "have", "has", "you",
        "your", "about", "can", "into", "its",
    ]
    .into_iter()
    .collect()
});

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(str::to_lowercase)
        .filter(|t| !STOPWORDS.contains(t.as_str()))
        .collect()
}

static TOKENIZER: Lazy<Result<CoreBPE, String>> =
    Lazy::new(|| tiktoken_rs::cl100k_base().map_err(|e| e.to_string()));

fn tokenizer() -> Result<&'static CoreBPE, CollabError> {
    TOKENIZER
        .as_ref()
        .map_err(|e| CollabError::backend("tokenizer", e.clone()))
}

/// Split text into chunks of at most `chunk_size` cl100k tokens
///
/// Chunks break on whitespace; a single word longer than `chunk_size`
/// becomes its own chunk. Consecutive chunks share up to `overlap` tokens
/// of trailing words.
pub fn split_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<String>, CollabError> {
    if chunk_size == 0 {
        return Ok(Vec::new());
    }
    let bpe = tokenizer()?;

    let words: Vec<(&str, usize)> = text
        .split_inclusive(char::is_whitespace)
        .filter(|w| !w.trim().is_empty())
        .map(|w| (w, bpe.encode_ordinary(w).len()))
        .collect();

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let mut end = start;
        let mut tokens = 0;
        while end < words.len() && (end == start || tokens + words[end].1 <= chunk_size) {
            tokens += words[end].1;
            end += 1;
        }

        let chunk: String = words[start..end].iter().map(|(w, _)| *w).collect();
        chunks.push(chunk.trim().to_string());
        if end == words.len() {
            break;
        }

        // Back off over trailing words that fit in the overlap
        let mut next = end;
        let mut shared = 0;
        while next > start + 1 && shared + words[next - 1].1 <= overlap {
            shared += words[next - 1].1;
            next -= 1;
        }
        start = next;
    }
    Ok(chunks)
}

#[async_trait]
impl Retriever for InMemoryDocumentStore {
    async fn retrieve(&self, query: &str) -> Result<Vec<Passage>, CollabError> {
        let query_terms = terms(query);
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }

        let passages = self.passages.read().await;
        let mut scored: Vec<(usize, &Passage)> = passages
            .iter()
            .map(|p| (terms(&p.content).intersection(&query_terms).count(), p))
            .filter(|(score, _)| *score > 0)
            .collect();

        // Stable sort keeps insertion order among equal scores
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(self.top_k)
            .map(|(_, p)| p.clone())
            .collect())
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn add_documents(&self, passages: Vec<Passage>) -> Result<(), CollabError> {
        if passages.is_empty() {
            return Ok(());
        }
        log::info!("Adding {} passages to document store", passages.len());
        self.passages.write().await.extend(passages);
        Ok(())
    }
}
