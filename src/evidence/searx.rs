use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::EvidenceGatherer;
use crate::config::SearchConfig;
use crate::error::{AppError, Result};

const NO_RESULTS: &str = "No good search result was found";

/// Client for a SearXNG instance's JSON search API.
pub struct SearxClient {
    client: Client,
    base_url: String,
    max_results: usize,
}

impl SearxClient {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_results: config.max_results,
        })
    }

    fn search_url(&self, query: &str) -> String {
        format!(
            "{}/search?q={}&format=json",
            self.base_url,
            urlencoding::encode(query)
        )
    }
}

#[async_trait]
impl EvidenceGatherer for SearxClient {
    async fn fetch(&self, query: &str) -> Result<String> {
        if query.trim().is_empty() {
            return Err(AppError::Validation("search query is empty".to_string()));
        }

        let response = self
            .client
            .get(self.search_url(query))
            .send()
            .await
            .map_err(|e| AppError::SearchApi(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let body = response
            .json::<SearchResponse>()
            .await
            .map_err(|e| AppError::SearchApi(format!("invalid search response: {e}")))?;

        tracing::debug!(query = %query, results = body.results.len(), "Search completed");

        Ok(format_results(&body.results, self.max_results))
    }
}

/// Map a non-success status to an error. Only rate limits, timeouts and server
/// faults are worth retrying; anything else (e.g. JSON output disabled) is not.
fn classify_status(status: StatusCode, body: &str) -> AppError {
    let message = format!("search returned {status}: {body}");
    match status.as_u16() {
        429 => AppError::RateLimited(message),
        408 | 500..=599 => AppError::SearchApi(message),
        _ => AppError::SearchRejected(message),
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: Option<String>,
}

/// Join the top hits into one evidence blob, skipping hits without a snippet.
fn format_results(hits: &[SearchHit], max_results: usize) -> String {
    let snippets: Vec<String> = hits
        .iter()
        .filter_map(|hit| {
            let content = hit.content.as_deref()?.trim();
            if content.is_empty() {
                return None;
            }
            Some(if hit.title.is_empty() {
                content.to_string()
            } else {
                format!("{}: {content}", hit.title.trim())
            })
        })
        .take(max_results)
        .collect();

    if snippets.is_empty() {
        NO_RESULTS.to_string()
    } else {
        snippets.join("\n")
    }
}
