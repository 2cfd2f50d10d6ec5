// SPDX-License-Identifier: MIT

//! Tavily web search

use super::{SearchHit, WebSearch};
use crate::error::CollabError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;

const TAVILY_ENDPOINT: &str = "https://api.tavily.com/search";

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: u32,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

pub struct TavilySearch {
    client: Client,
    api_key: String,
    max_results: u32,
    endpoint: String,
}

impl TavilySearch {
    /// Requires `TAVILY_API_KEY`; `TAVILY_BASE_URL` overrides the endpoint.
    pub fn new(max_results: u32) -> Result<Self, CollabError> {
        let api_key = env::var("TAVILY_API_KEY")
            .map_err(|_| CollabError::backend("web_search", "TAVILY_API_KEY must be set"))?;
        let endpoint = env::var("TAVILY_BASE_URL").unwrap_or_else(|_| TAVILY_ENDPOINT.to_string());

        Ok(Self {
            client: Client::new(),
            api_key,
            max_results,
            endpoint,
        })
    }

    fn parse_response(body: serde_json::Value) -> Result<Vec<SearchHit>, CollabError> {
        let parsed: TavilyResponse = serde_json::from_value(body)?;
        Ok(parsed.results)
    }
}

#[async_trait]
impl WebSearch for TavilySearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, CollabError> {
        let request = TavilyRequest {
            api_key: &self.api_key,
            query,
            max_results: self.max_results,
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .header("Accept", "application/json")
            .json(&request)
            .send()
            .await?;

        if !resp.status().is_success() {
            let text = resp.text().await?;
            return Err(CollabError::backend(
                "web_search",
                format!("Tavily API error: {}", text),
            ));
        }

        let body: serde_json::Value = resp.json().await?;
        Self::parse_response(body)
    }
}
