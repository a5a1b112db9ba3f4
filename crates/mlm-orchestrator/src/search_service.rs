// Client for the external SearchService collaborator (spec.md §6).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_RESULTS: u32 = 5;

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    max_results: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<SearchResult>,
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, query: &str) -> anyhow::Result<Vec<SearchResult>>;
}

#[derive(Clone)]
pub struct SearchServiceClient {
    client: reqwest::Client,
    base_url: String,
}

impl SearchServiceClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(SEARCH_TIMEOUT)
                .build()
                .expect("failed to build search service client"),
            base_url: base_url.into(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            std::env::var("MLM_SEARCH_SERVICE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8091".to_string()),
        )
    }
}

#[async_trait]
impl SearchBackend for SearchServiceClient {
    async fn search(&self, query: &str) -> anyhow::Result<Vec<SearchResult>> {
        let url = format!("{}/api/search", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&SearchRequest {
                query,
                max_results: DEFAULT_MAX_RESULTS,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("search service returned {}", response.status());
        }

        let parsed: SearchResponse = response.json().await?;
        Ok(parsed.results)
    }
}
