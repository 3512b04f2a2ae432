//! Web search through a metasearch instance with mirror fallback.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::WebSearchConfig;
use crate::document::Document;
use crate::error::{Error, Result};

use super::params::{ToolParams, WebSearchParams};
use super::web_scraper::WebScraper;
use super::{wrong_params, Tool, ToolResult};

/// One hit from the metasearch `web` list.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    web: Vec<SearchHit>,
}

pub struct WebSearchTool {
    config: WebSearchConfig,
    http: Client,
    scraper: Arc<WebScraper>,
}

impl WebSearchTool {
    pub fn new(config: WebSearchConfig, scraper: Arc<WebScraper>) -> Self {
        Self {
            config,
            http: Client::builder().build().unwrap_or_default(),
            scraper,
        }
    }

    /// Try the primary instance, then each fallback mirror in order.
    async fn search_with_fallback(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        let mut instances = vec![self.config.base_url.clone()];
        instances.extend(self.config.fallback_urls.iter().cloned());

        for instance in &instances {
            match self.search_instance(instance, query, limit).await {
                Ok(hits) if !hits.is_empty() => {
                    info!(%instance, count = hits.len(), "search succeeded");
                    return hits;
                }
                Ok(_) => debug!(%instance, "instance returned no results"),
                Err(e) => warn!(%instance, error = %e, "search instance failed"),
            }
        }

        warn!("all search instances failed");
        Vec::new()
    }

    /// Query one instance, retrying up to the configured count.
    async fn search_instance(
        &self,
        base_url: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let url = format!("{}/api/v1/web", base_url.trim_end_matches('/'));
        let timeout = Duration::from_secs(self.config.timeout_s);

        let mut last_error = None;
        for attempt in 0..=self.config.retry_count {
            if attempt > 0 {
                debug!(attempt, "retrying search request");
            }

            let outcome = self
                .http
                .get(&url)
                .query(&[("s", query), ("nsfw", "no")])
                .header(reqwest::header::ACCEPT, "application/json")
                .timeout(timeout)
                .send()
                .await;

            match outcome {
                Ok(response) if response.status().is_success() => {
                    let parsed: SearchResponse = response
                        .json()
                        .await
                        .map_err(|e| Error::Http(format!("bad search response: {e}")))?;
                    return Ok(parsed.web.into_iter().take(limit).collect());
                }
                Ok(response) => {
                    last_error = Some(format!("HTTP {}", response.status()));
                }
                Err(e) => {
                    last_error = Some(e.to_string());
                }
            }
        }

        Err(Error::Http(
            last_error.unwrap_or_else(|| "search retries exhausted".to_string()),
        ))
    }

    /// Drop blacklisted domains and weight the rest by domain priority.
    fn filter_and_rank(&self, hits: Vec<SearchHit>) -> Vec<(SearchHit, f64)> {
        let mut ranked: Vec<(SearchHit, f64)> = hits
            .into_iter()
            .filter(|hit| {
                let host = result_host(&hit.url);
                let blacklisted = self.config.blacklist.iter().any(|b| host.contains(b.as_str()));
                if blacklisted {
                    debug!(url = %hit.url, "blacklisted");
                }
                !blacklisted
            })
            .map(|hit| {
                let host = result_host(&hit.url);
                let priority = self
                    .config
                    .domain_priorities
                    .iter()
                    .find(|(domain, _)| host.contains(domain.as_str()))
                    .map(|(_, weight)| *weight)
                    .unwrap_or(1.0);
                (hit, priority)
            })
            .collect();

        // Stable: equal priorities keep search-engine order.
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &'static str {
        "web_search"
    }

    async fn execute(&self, params: ToolParams) -> ToolResult {
        let ToolParams::WebSearch(WebSearchParams {
            query,
            num_results,
            scrape_content,
        }) = params
        else {
            return wrong_params(self.name());
        };
        if query.is_empty() {
            return ToolResult::failure("query parameter is required");
        }

        let started = Instant::now();
        let limit = num_results.unwrap_or(self.config.results_limit);
        let scrape = scrape_content.unwrap_or(true);

        let mut query: String = query.chars().take(200).collect();
        if let Some(suffix) = &self.config.context_suffix {
            if !suffix.is_empty() && !query.contains(suffix.as_str()) {
                query = format!("{query} {suffix}");
            }
        }

        let hits = self.search_with_fallback(&query, limit).await;
        if hits.is_empty() {
            return ToolResult::failure("all search instances failed")
                .with_time(started.elapsed().as_millis() as f64);
        }

        let total_results = hits.len();
        let ranked = self.filter_and_rank(hits);
        let filtered_results = ranked.len();
        info!(
            total = total_results,
            kept = filtered_results,
            "filtered search results"
        );

        let documents = if scrape {
            let urls: Vec<String> = ranked.iter().map(|(hit, _)| hit.url.clone()).collect();
            self.scraper
                .scrape_all(&urls, Duration::from_secs(self.config.timeout_s))
                .await
        } else {
            ranked
                .iter()
                .map(|(hit, priority)| {
                    Document::new(hit.description.clone(), "web_search")
                        .with_metadata("url", json!(hit.url))
                        .with_metadata("title", json!(hit.title))
                        .with_metadata("source", json!("web_search"))
                        .with_metadata("priority_score", json!(priority))
                })
                .collect()
        };

        let scraped_pages = documents.len();
        ToolResult::ok(documents)
            .with_metadata("query", json!(query))
            .with_metadata("total_results", json!(total_results))
            .with_metadata("filtered_results", json!(filtered_results))
            .with_metadata("scraped_pages", json!(scraped_pages))
            .with_time(started.elapsed().as_millis() as f64)
    }
}

/// Host of a result URL; falls back to the raw string when unparsable
/// so domain matching still has something to work with.
fn result_host(raw: &str) -> String {
    url::Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| raw.to_string())
}
