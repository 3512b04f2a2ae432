//! Configuration for every component of the research pipeline.
//!
//! One [`Settings`] aggregate holds a config struct per component.
//! Defaults reflect the tuned production values; everything is plain
//! data so callers can override any knob before wiring the engine.

use serde::{Deserialize, Serialize};

/// Aggregated settings for the whole pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    pub search: SearchConfig,
    pub adaptive_rag: AdaptiveRagConfig,
    pub corrective: CorrectiveConfig,
    pub web_search: WebSearchConfig,
    pub web_scraper: WebScraperConfig,
    pub content_guard: ContentGuardConfig,
    pub memory: MemoryConfig,
    pub validation: ValidationConfig,
}

/// Tree-of-Thoughts search parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Cap on node depth
    pub max_depth: u32,
    /// Number of candidates generated per iteration
    pub branching_factor: usize,
    /// Goal score; search terminates at or above it
    pub completeness_threshold: f64,
    /// Candidates below this promise are pruned
    pub promise_threshold: f64,
    /// Post-evaluation relevance below this demotes to dead end
    pub dead_end_relevance: f64,
    /// Post-evaluation quality below this demotes to dead end
    pub dead_end_quality: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_depth: 4,
            branching_factor: 3,
            completeness_threshold: 0.85,
            promise_threshold: 0.5,
            dead_end_relevance: 0.3,
            dead_end_quality: 0.3,
        }
    }
}

impl SearchConfig {
    /// Iteration budget for one search.
    pub fn max_iterations(&self) -> u32 {
        self.max_depth * self.branching_factor as u32
    }

    pub fn with_max_depth(mut self, depth: u32) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_branching_factor(mut self, factor: usize) -> Self {
        self.branching_factor = factor;
        self
    }

    pub fn with_completeness_threshold(mut self, threshold: f64) -> Self {
        self.completeness_threshold = threshold;
        self
    }

    pub fn with_promise_threshold(mut self, threshold: f64) -> Self {
        self.promise_threshold = threshold;
        self
    }
}

/// Adaptive RAG strategy selection and fusion parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveRagConfig {
    /// Queries shorter than this (chars) are simple
    pub simple_threshold: usize,
    /// Queries longer than this (chars) are complex
    pub complex_threshold: usize,
    /// Word count at or above which a query is no longer simple
    pub simple_max_words: usize,
    /// RRF smoothing constant
    pub rrf_k_constant: f64,
    /// Default number of documents to retrieve
    pub top_k: usize,
    /// Vector store collection holding the RAG corpus
    pub collection: String,
}

impl Default for AdaptiveRagConfig {
    fn default() -> Self {
        Self {
            simple_threshold: 60,
            complex_threshold: 200,
            simple_max_words: 12,
            rrf_k_constant: 60.0,
            top_k: 5,
            collection: "rag_corpus".to_string(),
        }
    }
}

/// Corrective RAG relevance filtering parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectiveConfig {
    /// Documents below this relevance are dropped
    pub min_relevance: f64,
    /// Documents scored per model call
    pub batch_size: usize,
    /// Per-batch model timeout in seconds
    pub timeout_s: u64,
    /// Warn when fewer documents than this survive
    pub min_docs_after_filter: usize,
}

impl Default for CorrectiveConfig {
    fn default() -> Self {
        Self {
            min_relevance: 0.6,
            batch_size: 10,
            timeout_s: 10,
            min_docs_after_filter: 2,
        }
    }
}

/// Metasearch transport and result weighting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchConfig {
    /// Primary metasearch instance
    pub base_url: String,
    /// Ordered list of fallback mirrors
    pub fallback_urls: Vec<String>,
    /// Per-request timeout in seconds
    pub timeout_s: u64,
    /// Retries per instance before moving to the next mirror
    pub retry_count: u32,
    /// Default number of results
    pub results_limit: usize,
    /// Domains excluded from results (substring match)
    pub blacklist: Vec<String>,
    /// Domain priority weights, first match wins
    pub domain_priorities: Vec<(String, f64)>,
    /// Suffix appended to queries for topical context, if any
    pub context_suffix: Option<String>,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://4get.ca".to_string(),
            fallback_urls: vec![
                "https://4get.konakona.moe".to_string(),
                "https://4get.lunar.icu".to_string(),
            ],
            timeout_s: 10,
            retry_count: 1,
            results_limit: 5,
            blacklist: vec![
                "pinterest.".to_string(),
                "facebook.com".to_string(),
                "instagram.com".to_string(),
                "tiktok.com".to_string(),
            ],
            domain_priorities: vec![
                (".edu".to_string(), 1.5),
                (".gov".to_string(), 1.45),
                ("wikipedia.org".to_string(), 1.4),
                (".org".to_string(), 1.3),
                ("habr.com".to_string(), 1.25),
                ("stackoverflow.com".to_string(), 1.2),
                (".com".to_string(), 1.0),
                (".ru".to_string(), 1.0),
            ],
            context_suffix: None,
        }
    }
}

/// Web scraper fetch and parse policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebScraperConfig {
    /// Standard per-request timeout in seconds
    pub timeout_s: u64,
    /// Extended timeout used for the single retry
    pub extended_timeout_s: u64,
    /// URLs fetched concurrently
    pub batch_size: usize,
    /// Maximum extracted text length (chars)
    pub max_length: usize,
    /// User-Agent pool, rotated per request
    pub user_agents: Vec<String>,
    /// Noise tags removed before extraction
    pub remove_tags: Vec<String>,
    /// Content selectors tried in order
    pub content_selectors: Vec<String>,
}

impl Default for WebScraperConfig {
    fn default() -> Self {
        Self {
            timeout_s: 5,
            extended_timeout_s: 10,
            batch_size: 5,
            max_length: 10_000,
            user_agents: vec![
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".to_string(),
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15".to_string(),
                "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0".to_string(),
            ],
            remove_tags: vec![
                "script", "style", "nav", "header", "footer", "aside", "iframe", "noscript",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            content_selectors: vec![
                "article", "main", ".content", "#content", ".post", ".article-body",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

/// Content Guard filtering policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentGuardConfig {
    /// Master switch; disabled passes documents through untouched
    pub enabled: bool,
    /// Documents at or above this toxicity are dropped
    pub toxicity_threshold: f64,
    /// Documents per toxicity model call
    pub toxicity_batch_size: usize,
    /// Per-batch toxicity model timeout in seconds
    pub toxicity_timeout_s: u64,
    /// Policy stage switch
    pub policy_check_enabled: bool,
    /// Per-document policy model timeout in seconds
    pub policy_timeout_s: u64,
    /// Remove suspicious URLs during sanitization
    pub sanitize_remove_urls: bool,
    /// Remove email addresses during sanitization
    pub sanitize_remove_emails: bool,
    /// Per-document maximum length after sanitization (chars)
    pub sanitize_max_length: usize,
    /// Quality gate: minimum content length
    pub min_content_length: usize,
    /// Quality gate: maximum content length
    pub max_content_length: usize,
    /// Quality gate: minimum sentence count
    pub min_sentence_count: usize,
    /// Quality gate: maximum fraction of URL characters
    pub max_url_ratio: f64,
}

impl Default for ContentGuardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            toxicity_threshold: 0.7,
            toxicity_batch_size: 5,
            toxicity_timeout_s: 10,
            policy_check_enabled: true,
            policy_timeout_s: 5,
            sanitize_remove_urls: true,
            sanitize_remove_emails: true,
            sanitize_max_length: 8_000,
            min_content_length: 50,
            max_content_length: 20_000,
            min_sentence_count: 2,
            max_url_ratio: 0.3,
        }
    }
}

/// Memory subsystem policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Working-memory sessions older than this are expired
    pub working_ttl_hours: i64,
    /// Patterns below this success score are never saved or returned
    pub procedural_min_success_score: f64,
    /// Maximum patterns loaded into a new session context
    pub procedural_max_patterns: usize,
    /// Vector store collection for per-session traces
    pub working_collection: String,
    /// Vector store collection for procedural patterns
    pub procedural_collection: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            working_ttl_hours: 24,
            procedural_min_success_score: 0.8,
            procedural_max_patterns: 3,
            working_collection: "working_memory".to_string(),
            procedural_collection: "procedural_patterns".to_string(),
        }
    }
}

/// Input validation policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Master switch
    pub enabled: bool,
    /// Minimum input length (chars)
    pub min_input_length: usize,
    /// Maximum input length (chars)
    pub max_input_length: usize,
    /// Model-assisted validation timeout in seconds
    pub timeout_s: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_input_length: 3,
            max_input_length: 2_000,
            timeout_s: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let s = Settings::default();
        assert_eq!(s.search.completeness_threshold, 0.85);
        assert_eq!(s.search.max_iterations(), 12);
        assert_eq!(s.adaptive_rag.rrf_k_constant, 60.0);
        assert_eq!(s.corrective.min_relevance, 0.6);
        assert_eq!(s.corrective.batch_size, 10);
        assert_eq!(s.content_guard.toxicity_threshold, 0.7);
        assert_eq!(s.memory.procedural_min_success_score, 0.8);
        assert_eq!(s.web_scraper.batch_size, 5);
    }

    #[test]
    fn test_search_config_builder() {
        let cfg = SearchConfig::default()
            .with_max_depth(2)
            .with_branching_factor(1)
            .with_completeness_threshold(0.0)
            .with_promise_threshold(1.0);
        assert_eq!(cfg.max_depth, 2);
        assert_eq!(cfg.branching_factor, 1);
        assert_eq!(cfg.max_iterations(), 2);
    }

    #[test]
    fn test_settings_serde_round_trip() {
        let s = Settings::default();
        let json = serde_json::to_string(&s).unwrap();
        let back: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.search.max_depth, s.search.max_depth);
        assert_eq!(back.web_search.fallback_urls, s.web_search.fallback_urls);
    }
}
