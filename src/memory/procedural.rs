//! Procedural memory: a durable, similarity-queryable store of
//! successful tool sequences and reasoning patterns.

use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::MemoryConfig;
use crate::document::Document;
use crate::fallback::RetryPolicy;
use crate::store::{MetadataFilter, VectorStore};

use super::types::ProceduralPattern;

pub struct ProceduralMemoryStore {
    vector: Arc<dyn VectorStore>,
    config: MemoryConfig,
    retry: RetryPolicy,
    degraded: AtomicBool,
}

impl ProceduralMemoryStore {
    pub fn new(vector: Arc<dyn VectorStore>, config: MemoryConfig) -> Self {
        Self {
            vector,
            config,
            retry: RetryPolicy::default(),
            degraded: AtomicBool::new(false),
        }
    }

    /// Whether writes are currently skipped.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    /// Persist a successful pattern. The reasoning text is embedded
    /// for similarity lookup; the full record travels in metadata.
    ///
    /// When the store is unavailable the save is logged and skipped:
    /// the system degrades to no-memory mode for writes.
    pub async fn save_pattern(&self, pattern: &ProceduralPattern) {
        if self.is_degraded() {
            warn!(pattern = %pattern.pattern_id, "vector store unavailable, pattern not saved");
            return;
        }

        let record = match serde_json::to_string(pattern) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "failed to serialize pattern");
                return;
            }
        };

        let document = Document::new(pattern.reasoning_pattern.clone(), "procedural_memory")
            .with_metadata("id", json!(pattern.pattern_id.clone()))
            .with_metadata("pattern_json", json!(record))
            .with_metadata("category", json!(pattern.category.clone()))
            .with_metadata("user_level", json!(pattern.user_level.clone()))
            .with_metadata("success_score", json!(pattern.success_score));

        let outcome = self
            .retry
            .run("save_pattern", || {
                self.vector
                    .upsert(&self.config.procedural_collection, &pattern.pattern_id, &document)
            })
            .await;

        match outcome {
            Ok(()) => info!(
                pattern = %pattern.pattern_id,
                category = %pattern.category,
                "saved procedural pattern"
            ),
            Err(e) => {
                warn!(error = %e, "failed to save pattern, degrading to no-memory writes");
                self.degraded.store(true, Ordering::Relaxed);
            }
        }
    }

    /// Patterns similar to the query, filtered by success score.
    ///
    /// Reads return empty on storage failure; callers treat an empty
    /// list as a cold start.
    pub async fn find_similar_patterns(
        &self,
        query: &str,
        limit: usize,
        min_success_score: f64,
    ) -> Vec<ProceduralPattern> {
        let filter = MetadataFilter::new().with_min_score("success_score", min_success_score);

        let documents = match self
            .vector
            .similarity_search(&self.config.procedural_collection, query, limit * 2, Some(&filter))
            .await
        {
            Ok(docs) => docs,
            Err(e) => {
                warn!(error = %e, "procedural memory unavailable, returning no patterns");
                return Vec::new();
            }
        };

        let patterns: Vec<ProceduralPattern> = documents
            .iter()
            .filter_map(|doc| {
                doc.metadata
                    .get("pattern_json")
                    .and_then(serde_json::Value::as_str)
                    .and_then(|json| serde_json::from_str(json).ok())
            })
            .take(limit)
            .collect();

        debug!(count = patterns.len(), "found similar patterns");
        patterns
    }

    /// Bump a pattern's usage counter and last-used timestamp.
    pub async fn increment_usage(&self, pattern_id: &str) {
        let filter = MetadataFilter::new().with_equals("id", json!(pattern_id));
        let documents = match self
            .vector
            .get(&self.config.procedural_collection, &filter)
            .await
        {
            Ok(docs) => docs,
            Err(e) => {
                warn!(error = %e, "failed to read pattern for usage bump");
                return;
            }
        };

        let Some(mut pattern) = documents.first().and_then(|doc| {
            doc.metadata
                .get("pattern_json")
                .and_then(serde_json::Value::as_str)
                .and_then(|json| serde_json::from_str::<ProceduralPattern>(json).ok())
        }) else {
            warn!(pattern = pattern_id, "pattern not found for usage bump");
            return;
        };

        pattern.usage_count += 1;
        pattern.last_used = chrono::Utc::now();
        self.save_pattern(&pattern).await;
        debug!(pattern = pattern_id, usage = pattern.usage_count, "incremented usage");
    }
}
