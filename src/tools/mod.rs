//! Retrieval and analysis tools behind a uniform contract.
//!
//! Tools never fail at the call boundary: every failure is encoded in
//! the returned [`ToolResult`]. Parameters arrive as free-form maps
//! from the model and are parsed into typed variants at the registry
//! boundary before any I/O happens.

pub mod adaptive_rag;
pub mod concepts;
pub mod corrective;
pub mod memory_lookup;
pub mod params;
pub mod registry;
pub mod web_scraper;
pub mod web_search;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::document::Document;

pub use params::{
    AdaptiveRagParams, ConceptMethod, ConceptParams, CorrectiveParams, MemoryKind,
    MemoryLookupParams, RagStrategy, ToolParams, WebScraperParams, WebSearchParams,
};
pub use registry::{ToolContext, ToolRegistry};

/// Result of one tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub documents: Vec<Document>,
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    pub execution_time_ms: f64,
}

impl ToolResult {
    /// Successful result carrying documents.
    pub fn ok(documents: Vec<Document>) -> Self {
        Self {
            success: !documents.is_empty(),
            documents,
            error: None,
            metadata: HashMap::new(),
            execution_time_ms: 0.0,
        }
    }

    /// Failed result with an error message.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            documents: Vec::new(),
            error: Some(error.into()),
            metadata: HashMap::new(),
            execution_time_ms: 0.0,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_time(mut self, elapsed_ms: f64) -> Self {
        self.execution_time_ms = elapsed_ms;
        self
    }

    /// Cheap-tier model calls this execution made, from metadata.
    pub fn cheap_model_calls(&self) -> u64 {
        self.metadata
            .get("model_calls_cheap")
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }
}

/// A tool in the registry.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Canonical tool name.
    fn name(&self) -> &'static str;

    /// Execute with already-validated parameters. Must not fail; all
    /// failure is encoded in the result.
    async fn execute(&self, params: ToolParams) -> ToolResult;
}

/// Failure result for a parameter variant the tool does not accept.
pub(crate) fn wrong_params(tool: &str) -> ToolResult {
    ToolResult::failure(format!("wrong parameter variant for tool {tool}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ok_requires_documents_for_success() {
        assert!(ToolResult::ok(vec![Document::new("d", "s")]).success);
        assert!(!ToolResult::ok(Vec::new()).success);
    }

    #[test]
    fn test_failure_carries_error() {
        let result = ToolResult::failure("timeout");
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_cheap_model_calls_from_metadata() {
        let result = ToolResult::ok(vec![Document::new("d", "s")])
            .with_metadata("model_calls_cheap", json!(3));
        assert_eq!(result.cheap_model_calls(), 3);
        assert_eq!(ToolResult::failure("x").cheap_model_calls(), 0);
    }
}
