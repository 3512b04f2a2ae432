//! Two-tier memory: the per-session working trace and the durable
//! repository of successful strategies.

pub mod procedural;
pub mod types;
pub mod working;

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::MemoryConfig;
use crate::store::{RelationalLog, VectorStore};
use crate::tree::ToTResult;

pub use procedural::ProceduralMemoryStore;
pub use types::{
    detect_category, format_hints, format_pattern, MemoryContext, ProceduralPattern,
    WorkingMemoryEntry,
};
pub use working::WorkingMemoryStore;

/// Unified manager over working and procedural memory.
pub struct MemoryManager {
    config: MemoryConfig,
    pub working: WorkingMemoryStore,
    pub procedural: ProceduralMemoryStore,
    relational: Option<Arc<RelationalLog>>,
}

impl MemoryManager {
    pub fn new(
        vector: Arc<dyn VectorStore>,
        config: MemoryConfig,
        relational: Option<Arc<RelationalLog>>,
    ) -> Self {
        Self {
            working: WorkingMemoryStore::new(Arc::clone(&vector), config.clone()),
            procedural: ProceduralMemoryStore::new(vector, config.clone()),
            config,
            relational,
        }
    }

    /// Load memory context for a new request: a fresh session id plus
    /// prose hints built from similar successful patterns.
    pub async fn load_context(&self, user_id: &str, query: &str) -> MemoryContext {
        let hex = uuid::Uuid::new_v4().simple().to_string();
        let session_id = format!("sess_{}", &hex[..12]);
        info!(session = %session_id, "loading memory context");

        let patterns = self
            .procedural
            .find_similar_patterns(
                query,
                self.config.procedural_max_patterns,
                self.config.procedural_min_success_score,
            )
            .await;

        if patterns.is_empty() {
            info!("no procedural patterns found");
            return MemoryContext::empty(session_id, user_id);
        }

        info!(count = patterns.len(), "loaded procedural patterns");
        MemoryContext {
            session_id,
            user_id: user_id.to_string(),
            procedural_hints: format_hints(&patterns),
            patterns,
        }
    }

    /// Persist a procedural pattern after a successful generation and
    /// bump usage on the patterns that seeded this session.
    ///
    /// Skipped entirely when the final completeness is below the save
    /// threshold.
    pub async fn save_successful_generation(
        &self,
        context: &MemoryContext,
        result: &ToTResult,
        query: &str,
        user_level: &str,
    ) {
        if result.final_completeness < self.config.procedural_min_success_score {
            info!(
                completeness = result.final_completeness,
                threshold = self.config.procedural_min_success_score,
                "completeness below save threshold, not persisting pattern"
            );
            return;
        }

        let tools_sequence: Vec<String> = result
            .best_path
            .iter()
            .filter_map(|node| node.planned_tool().map(str::to_string))
            .collect();

        let reasoning_pattern = result
            .best_path
            .iter()
            .filter(|node| !node.thought.is_empty())
            .map(|node| node.thought.chars().take(100).collect::<String>())
            .collect::<Vec<_>>()
            .join(" → ");

        let pattern = ProceduralPattern::new(
            detect_category(query),
            user_level,
            tools_sequence,
            result.best_path.len() as f64,
            result.final_completeness,
            reasoning_pattern,
        );

        self.procedural.save_pattern(&pattern).await;

        if let Some(relational) = &self.relational {
            if let Err(e) = relational.upsert_pattern(&pattern) {
                warn!(error = %e, "failed to mirror pattern into relational backup");
            }
        }

        for seed in &context.patterns {
            self.procedural.increment_usage(&seed.pattern_id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::llm::TierUsage;
    use crate::store::{HashedNgramEmbedder, InMemoryVectorStore};
    use crate::tree::{NodeStatus, PlannedAction, TreeNode};
    use std::collections::BTreeSet;

    fn manager() -> MemoryManager {
        let vector = Arc::new(InMemoryVectorStore::new(Arc::new(HashedNgramEmbedder::default())));
        MemoryManager::new(vector, MemoryConfig::default(), None)
    }

    fn successful_result(completeness: f64) -> ToTResult {
        let root = TreeNode::root("быстрая сортировка");
        let mut child = TreeNode::child_of(&root);
        child.thought = "Ищу теорию сортировки в локальной базе".to_string();
        child.planned_action = Some(PlannedAction::new(
            "adaptive_rag_search",
            serde_json::json!({"query": "сортировка"}),
        ));
        child.completeness_score = completeness;
        child.status = NodeStatus::GoalReached;

        ToTResult {
            best_path: vec![root.clone(), child],
            explored_nodes: vec![root],
            collected_documents: vec![Document::new("материал", "rag")],
            final_completeness: completeness,
            iterations: 1,
            tools_used: BTreeSet::from(["adaptive_rag_search".to_string()]),
            total_time_ms: 100.0,
            model_usage: TierUsage::default(),
        }
    }

    #[tokio::test]
    async fn test_load_context_generates_session_ids() {
        let manager = manager();
        let a = manager.load_context("user", "сортировка").await;
        let b = manager.load_context("user", "сортировка").await;
        assert_ne!(a.session_id, b.session_id);
        assert!(a.session_id.starts_with("sess_"));
        assert_eq!(a.procedural_hints, "No prior patterns available");
    }

    #[tokio::test]
    async fn test_successful_generation_saved_and_reloaded() {
        let manager = manager();
        let context = manager.load_context("user", "быстрая сортировка").await;

        manager
            .save_successful_generation(&context, &successful_result(0.9), "быстрая сортировка", "beginner")
            .await;

        let warm = manager.load_context("user", "пузырьковая сортировка").await;
        assert_eq!(warm.patterns.len(), 1);
        assert!(warm.procedural_hints.contains("adaptive_rag_search"));
        assert_eq!(warm.patterns[0].category, "sorting");
    }

    #[tokio::test]
    async fn test_below_threshold_not_saved() {
        let manager = manager();
        let context = manager.load_context("user", "сортировка").await;

        manager
            .save_successful_generation(&context, &successful_result(0.5), "сортировка", "beginner")
            .await;

        let warm = manager.load_context("user", "сортировка").await;
        assert!(warm.patterns.is_empty());
    }

    #[tokio::test]
    async fn test_seed_patterns_get_usage_bump() {
        let manager = manager();
        let context = manager.load_context("user", "сортировка слиянием").await;
        manager
            .save_successful_generation(&context, &successful_result(0.9), "сортировка слиянием", "beginner")
            .await;

        // Second run warm-starts from the first pattern and bumps it.
        let warm = manager.load_context("user", "сортировка слиянием").await;
        assert_eq!(warm.patterns.len(), 1);
        let seed_id = warm.patterns[0].pattern_id.clone();
        let seed_usage = warm.patterns[0].usage_count;

        manager
            .save_successful_generation(&warm, &successful_result(0.95), "сортировка слиянием", "beginner")
            .await;

        let after = manager
            .procedural
            .find_similar_patterns("сортировка слиянием", 5, 0.8)
            .await;
        let bumped = after.iter().find(|p| p.pattern_id == seed_id).unwrap();
        assert_eq!(bumped.usage_count, seed_usage + 1);
    }
}
