//! Typed tool parameters, parsed from the model's free-form maps at
//! the registry boundary. Ill-typed invocations are rejected before
//! any I/O.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Retrieval strategy for adaptive RAG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RagStrategy {
    Auto,
    Tfidf,
    Semantic,
    Hybrid,
}

impl Default for RagStrategy {
    fn default() -> Self {
        Self::Auto
    }
}

/// Concept extraction method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConceptMethod {
    Auto,
    Keyword,
    Entity,
    Hybrid,
    Heuristic,
}

impl Default for ConceptMethod {
    fn default() -> Self {
        Self::Auto
    }
}

/// Memory tier to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    Working,
    Procedural,
    All,
}

impl Default for MemoryKind {
    fn default() -> Self {
        Self::Procedural
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveRagParams {
    pub query: String,
    pub strategy: RagStrategy,
    pub k: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectiveParams {
    pub query: String,
    /// Document texts to score; filled from the node's collected
    /// evidence when the model leaves it empty
    pub documents: Vec<String>,
    pub min_relevance: Option<f64>,
    pub evaluate_coverage: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSearchParams {
    pub query: String,
    pub num_results: Option<usize>,
    pub scrape_content: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebScraperParams {
    pub urls: Vec<String>,
    pub timeout_s: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConceptParams {
    pub text: String,
    pub method: ConceptMethod,
    pub top_n: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryLookupParams {
    pub query: String,
    pub memory_type: MemoryKind,
    pub limit: Option<usize>,
    pub min_success_score: Option<f64>,
    pub session_id: Option<String>,
}

/// Tagged parameters for every tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ToolParams {
    AdaptiveRag(AdaptiveRagParams),
    Corrective(CorrectiveParams),
    WebSearch(WebSearchParams),
    WebScraper(WebScraperParams),
    Concepts(ConceptParams),
    MemoryLookup(MemoryLookupParams),
}

impl ToolParams {
    /// Parse a free-form map for the given canonical tool name.
    pub fn parse(canonical_name: &str, raw: &Value) -> Result<Self> {
        if !raw.is_object() && !raw.is_null() {
            return Err(Error::tool(
                canonical_name,
                format!("tool_params must be an object, got {raw}"),
            ));
        }
        let raw = if raw.is_null() {
            Value::Object(serde_json::Map::new())
        } else {
            raw.clone()
        };

        let map_err = |e: serde_json::Error| {
            Error::tool(canonical_name, format!("invalid parameters: {e}"))
        };

        match canonical_name {
            "adaptive_rag_search" => Ok(Self::AdaptiveRag(
                serde_json::from_value(raw).map_err(map_err)?,
            )),
            "corrective_check" => Ok(Self::Corrective(
                serde_json::from_value(raw).map_err(map_err)?,
            )),
            "web_search" => Ok(Self::WebSearch(
                serde_json::from_value(raw).map_err(map_err)?,
            )),
            "web_scraper" => Ok(Self::WebScraper(
                serde_json::from_value(raw).map_err(map_err)?,
            )),
            "extract_concepts" => Ok(Self::Concepts(
                serde_json::from_value(raw).map_err(map_err)?,
            )),
            "memory_retrieval" => Ok(Self::MemoryLookup(
                serde_json::from_value(raw).map_err(map_err)?,
            )),
            other => Err(Error::tool(other, "unknown tool")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_adaptive_rag_defaults() {
        let params = ToolParams::parse(
            "adaptive_rag_search",
            &json!({"query": "быстрая сортировка"}),
        )
        .unwrap();
        match params {
            ToolParams::AdaptiveRag(p) => {
                assert_eq!(p.query, "быстрая сортировка");
                assert_eq!(p.strategy, RagStrategy::Auto);
                assert_eq!(p.k, None);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_parse_explicit_strategy() {
        let params = ToolParams::parse(
            "adaptive_rag_search",
            &json!({"query": "q", "strategy": "hybrid", "k": 8}),
        )
        .unwrap();
        match params {
            ToolParams::AdaptiveRag(p) => {
                assert_eq!(p.strategy, RagStrategy::Hybrid);
                assert_eq!(p.k, Some(8));
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_ill_typed_params_rejected() {
        let err = ToolParams::parse("adaptive_rag_search", &json!({"k": "пять"})).unwrap_err();
        assert!(matches!(err, Error::ToolExecution { .. }));

        let err = ToolParams::parse("web_scraper", &json!({"urls": "не список"})).unwrap_err();
        assert!(matches!(err, Error::ToolExecution { .. }));

        let err = ToolParams::parse("web_search", &json!("строка")).unwrap_err();
        assert!(matches!(err, Error::ToolExecution { .. }));
    }

    #[test]
    fn test_unknown_tool_rejected() {
        let err = ToolParams::parse("teleport", &json!({})).unwrap_err();
        assert!(matches!(err, Error::ToolExecution { .. }));
    }

    #[test]
    fn test_null_params_become_defaults() {
        let params = ToolParams::parse("extract_concepts", &Value::Null).unwrap();
        match params {
            ToolParams::Concepts(p) => {
                assert!(p.text.is_empty());
                assert_eq!(p.method, ConceptMethod::Auto);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_memory_kind_parsing() {
        let params = ToolParams::parse(
            "memory_retrieval",
            &json!({"query": "q", "memory_type": "all", "limit": 5}),
        )
        .unwrap();
        match params {
            ToolParams::MemoryLookup(p) => {
                assert_eq!(p.memory_type, MemoryKind::All);
                assert_eq!(p.limit, Some(5));
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }
}
