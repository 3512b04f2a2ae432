//! Memory retrieval: surface past successful strategies as documents.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::config::MemoryConfig;
use crate::document::Document;
use crate::memory::{format_pattern, MemoryManager, ProceduralPattern};

use super::params::{MemoryKind, MemoryLookupParams, ToolParams};
use super::{wrong_params, Tool, ToolResult};

pub struct MemoryRetrievalTool {
    config: MemoryConfig,
    memory: Arc<MemoryManager>,
}

impl MemoryRetrievalTool {
    pub fn new(config: MemoryConfig, memory: Arc<MemoryManager>) -> Self {
        Self { config, memory }
    }

    fn patterns_to_documents(patterns: Vec<ProceduralPattern>) -> Vec<Document> {
        patterns
            .into_iter()
            .map(|pattern| {
                let content = format_pattern(&pattern);
                Document::new(content, "memory")
                    .with_metadata("pattern_id", json!(pattern.pattern_id))
                    .with_metadata("category", json!(pattern.category))
                    .with_metadata("success_score", json!(pattern.success_score))
                    .with_metadata("usage_count", json!(pattern.usage_count))
                    .with_metadata("source", json!("procedural_memory"))
            })
            .collect()
    }

    async fn working_documents(&self, session_id: Option<&str>, limit: usize) -> Vec<Document> {
        let Some(session_id) = session_id else {
            // Working memory is session-scoped; nothing to return for
            // a request that does not name one.
            return Vec::new();
        };

        let steps = self.memory.working.get_session_context(session_id).await;
        steps
            .into_iter()
            .rev()
            .take(limit)
            .map(|step| {
                Document::new(step.thought.clone(), "working_memory")
                    .with_metadata("iteration", json!(step.iteration))
                    .with_metadata("tool_used", json!(step.tool_used))
                    .with_metadata("completeness", json!(step.completeness))
                    .with_metadata("source", json!("working_memory"))
            })
            .collect()
    }
}

#[async_trait]
impl Tool for MemoryRetrievalTool {
    fn name(&self) -> &'static str {
        "memory_retrieval"
    }

    async fn execute(&self, params: ToolParams) -> ToolResult {
        let ToolParams::MemoryLookup(MemoryLookupParams {
            query,
            memory_type,
            limit,
            min_success_score,
            session_id,
        }) = params
        else {
            return wrong_params(self.name());
        };
        if query.is_empty() {
            return ToolResult::failure("query parameter is required");
        }

        let started = Instant::now();
        let limit = limit.unwrap_or(3);
        let min_success =
            min_success_score.unwrap_or(self.config.procedural_min_success_score);

        let documents = match memory_type {
            MemoryKind::Procedural => {
                let patterns = self
                    .memory
                    .procedural
                    .find_similar_patterns(&query, limit, min_success)
                    .await;
                Self::patterns_to_documents(patterns)
            }
            MemoryKind::Working => self.working_documents(session_id.as_deref(), limit).await,
            MemoryKind::All => {
                let half = limit / 2 + 1;
                let patterns = self
                    .memory
                    .procedural
                    .find_similar_patterns(&query, half, min_success)
                    .await;
                let mut documents = Self::patterns_to_documents(patterns);
                documents.extend(self.working_documents(session_id.as_deref(), half).await);
                documents
            }
        };

        info!(count = documents.len(), ?memory_type, "memory retrieval complete");

        let found = documents.len();
        ToolResult::ok(documents)
            .with_metadata("memory_type", json!(format!("{memory_type:?}").to_lowercase()))
            .with_metadata("patterns_found", json!(found))
            .with_metadata("min_success_score", json!(min_success))
            .with_time(started.elapsed().as_millis() as f64)
    }
}
