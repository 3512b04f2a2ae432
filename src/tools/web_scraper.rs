//! Web scraper: batched HTML fetching and text extraction.

use async_trait::async_trait;
use futures::future::join_all;
use rand::seq::SliceRandom;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use serde_json::json;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::WebScraperConfig;
use crate::document::Document;
use crate::error::{Error, Result};

use super::params::{ToolParams, WebScraperParams};
use super::{wrong_params, Tool, ToolResult};

fn multi_space() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r" +").unwrap())
}

/// Fetching and extraction engine, shared by the scraper tool and the
/// web search tool's scrape mode.
pub struct WebScraper {
    http: Client,
    config: WebScraperConfig,
}

impl WebScraper {
    pub fn new(config: WebScraperConfig) -> Self {
        Self {
            http: Client::builder().build().unwrap_or_default(),
            config,
        }
    }

    /// Fetch and parse a list of URLs in bounded concurrent batches.
    /// Failed URLs are skipped.
    pub async fn scrape_all(&self, urls: &[String], timeout: Duration) -> Vec<Document> {
        let mut documents = Vec::new();

        for batch in urls.chunks(self.config.batch_size) {
            let fetches = batch.iter().map(|url| self.fetch_and_parse(url, timeout));
            for (url, outcome) in batch.iter().zip(join_all(fetches).await) {
                match outcome {
                    Ok(document) => documents.push(document),
                    Err(e) => warn!(%url, error = %e, "failed to scrape url"),
                }
            }
        }

        info!(scraped = documents.len(), requested = urls.len(), "scraping complete");
        documents
    }

    /// Fetch one URL; a timeout gets a single retry at the extended
    /// timeout, any other failure fails the URL.
    async fn fetch_and_parse(&self, url: &str, timeout: Duration) -> Result<Document> {
        let html = match self.fetch(url, timeout).await {
            Ok(html) => html,
            Err(Error::Timeout { .. }) => {
                warn!(%url, "timeout, retrying with extended timeout");
                self.fetch(url, Duration::from_secs(self.config.extended_timeout_s))
                    .await?
            }
            Err(e) => return Err(e),
        };

        let text = self.extract_text(&html);
        let length = text.chars().count();
        Ok(Document::new(text, url)
            .with_metadata("url", json!(url))
            .with_metadata("source", json!("web_scraper"))
            .with_metadata("length", json!(length)))
    }

    async fn fetch(&self, url: &str, timeout: Duration) -> Result<String> {
        let user_agent = self
            .config
            .user_agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or("Mozilla/5.0");

        let response = self
            .http
            .get(url)
            .header(reqwest::header::USER_AGENT, user_agent)
            .header(
                reqwest::header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header(
                reqwest::header::ACCEPT_LANGUAGE,
                "ru-RU,ru;q=0.9,en-US;q=0.8,en;q=0.7",
            )
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::timeout(timeout.as_millis() as u64)
                } else {
                    Error::Http(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(Error::Http(format!("HTTP {}", response.status())));
        }

        response.text().await.map_err(|e| Error::Http(e.to_string()))
    }

    /// Extract readable text: drop noise tags, prefer the configured
    /// content selectors, fall back to the whole body.
    pub fn extract_text(&self, html: &str) -> String {
        let mut document = Html::parse_document(html);

        for tag in &self.config.remove_tags {
            let Ok(selector) = Selector::parse(tag) else {
                continue;
            };
            let ids: Vec<_> = document.select(&selector).map(|el| el.id()).collect();
            for id in ids {
                if let Some(mut node) = document.tree.get_mut(id) {
                    node.detach();
                }
            }
        }

        let mut text = String::new();
        for raw_selector in &self.config.content_selectors {
            let Ok(selector) = Selector::parse(raw_selector) else {
                warn!(selector = %raw_selector, "invalid content selector, skipping");
                continue;
            };
            let parts: Vec<String> = document
                .select(&selector)
                .map(|el| el.text().collect::<Vec<_>>().join(" "))
                .collect();
            if !parts.is_empty() {
                text = parts.join(" ");
                break;
            }
        }

        if text.trim().is_empty() {
            if let Ok(body) = Selector::parse("body") {
                text = document
                    .select(&body)
                    .map(|el| el.text().collect::<Vec<_>>().join(" "))
                    .collect::<Vec<_>>()
                    .join(" ");
            }
        }

        let cleaned = clean_text(&text);
        if cleaned.chars().count() > self.config.max_length {
            let mut truncated: String = cleaned.chars().take(self.config.max_length).collect();
            truncated.push_str("...");
            truncated
        } else {
            cleaned
        }
    }
}

fn clean_text(text: &str) -> String {
    let joined = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    multi_space().replace_all(&joined, " ").trim().to_string()
}

/// The registry-facing scraper tool.
pub struct WebScraperTool {
    scraper: std::sync::Arc<WebScraper>,
    config: WebScraperConfig,
}

impl WebScraperTool {
    pub fn new(scraper: std::sync::Arc<WebScraper>, config: WebScraperConfig) -> Self {
        Self { scraper, config }
    }
}

#[async_trait]
impl Tool for WebScraperTool {
    fn name(&self) -> &'static str {
        "web_scraper"
    }

    async fn execute(&self, params: ToolParams) -> ToolResult {
        let ToolParams::WebScraper(WebScraperParams { urls, timeout_s }) = params else {
            return wrong_params(self.name());
        };
        if urls.is_empty() {
            // Nothing to fetch is not an error: succeed immediately
            // with no documents and no time waited.
            return ToolResult {
                success: true,
                documents: Vec::new(),
                error: None,
                metadata: std::collections::HashMap::from([
                    ("requested_urls".to_string(), json!(0)),
                    ("successful_scrapes".to_string(), json!(0)),
                ]),
                execution_time_ms: 0.0,
            };
        }

        let started = Instant::now();
        let timeout = Duration::from_secs(timeout_s.unwrap_or(self.config.timeout_s));
        let documents = self.scraper.scrape_all(&urls, timeout).await;
        let elapsed = started.elapsed().as_millis() as f64;

        let requested = urls.len();
        let scraped = documents.len();
        ToolResult::ok(documents)
            .with_metadata("requested_urls", json!(requested))
            .with_metadata("successful_scrapes", json!(scraped))
            .with_metadata("failed_scrapes", json!(requested - scraped))
            .with_time(elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scraper() -> WebScraper {
        WebScraper::new(WebScraperConfig::default())
    }

    #[test]
    fn test_extract_prefers_article_content() {
        let html = r#"
            <html><head><script>var x = 1;</script></head>
            <body>
                <nav>Меню сайта</nav>
                <article>Быстрая сортировка работает так.</article>
                <footer>Подвал сайта</footer>
            </body></html>
        "#;
        let text = scraper().extract_text(html);
        assert!(text.contains("Быстрая сортировка"));
        assert!(!text.contains("Меню сайта"));
        assert!(!text.contains("Подвал"));
        assert!(!text.contains("var x"));
    }

    #[test]
    fn test_extract_falls_back_to_body() {
        let html = "<html><body><div>Просто текст без article.</div></body></html>";
        let text = scraper().extract_text(html);
        assert_eq!(text, "Просто текст без article.");
    }

    #[test]
    fn test_noise_tags_removed_from_body_fallback() {
        let html = r#"
            <html><body>
                <script>alert('x')</script>
                <div>Полезный контент страницы.</div>
                <aside>Реклама сбоку</aside>
            </body></html>
        "#;
        let text = scraper().extract_text(html);
        assert!(text.contains("Полезный контент"));
        assert!(!text.contains("alert"));
        assert!(!text.contains("Реклама"));
    }

    #[test]
    fn test_truncation_to_max_length() {
        let config = WebScraperConfig {
            max_length: 20,
            ..WebScraperConfig::default()
        };
        let scraper = WebScraper::new(config);
        let html = format!("<html><body><article>{}</article></body></html>", "а".repeat(100));
        let text = scraper.extract_text(&html);
        assert!(text.ends_with("..."));
        assert_eq!(text.chars().count(), 23);
    }

    #[tokio::test]
    async fn test_empty_url_list_is_immediate() {
        let tool = WebScraperTool::new(
            std::sync::Arc::new(scraper()),
            WebScraperConfig::default(),
        );
        let started = Instant::now();
        let result = tool
            .execute(ToolParams::WebScraper(WebScraperParams::default()))
            .await;
        assert!(result.success);
        assert!(result.documents.is_empty());
        assert_eq!(result.execution_time_ms, 0.0);
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn test_clean_text_collapses_whitespace() {
        let cleaned = clean_text("  строка  одна  \n\n   строка   две   \n");
        assert_eq!(cleaned, "строка одна\nстрока две");
    }
}
