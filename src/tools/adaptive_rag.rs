//! Adaptive RAG: per-query strategy selection over the local corpus.
//!
//! Simple queries go through the tf-idf index, mid-size natural
//! language queries through the semantic store, comparison-style and
//! long queries through both with Reciprocal Rank Fusion.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::config::AdaptiveRagConfig;
use crate::document::Document;
use crate::error::Result;
use crate::retrieval::TfidfIndex;
use crate::store::VectorStore;

use super::params::{AdaptiveRagParams, RagStrategy, ToolParams};
use super::{wrong_params, Tool, ToolResult};

/// Markers that push a query onto the hybrid strategy.
const COMPARISON_MARKERS: &[&str] = &[
    "сравнение",
    "разница",
    "разница между",
    "преимущества и недостатки",
    "когда использовать",
    "vs",
    "или",
    "лучше",
    "против",
];

pub struct AdaptiveRagTool {
    config: AdaptiveRagConfig,
    vector: Arc<dyn VectorStore>,
    tfidf: Option<Arc<TfidfIndex>>,
}

impl AdaptiveRagTool {
    pub fn new(
        config: AdaptiveRagConfig,
        vector: Arc<dyn VectorStore>,
        tfidf: Option<Arc<TfidfIndex>>,
    ) -> Self {
        Self { config, vector, tfidf }
    }

    /// Deterministic strategy selection for `auto`.
    pub(crate) fn classify(&self, query: &str) -> RagStrategy {
        let chars = query.chars().count();
        let words = query.split_whitespace().count();
        let lowered = query.to_lowercase();

        let has_marker = COMPARISON_MARKERS.iter().any(|m| lowered.contains(m));

        if has_marker || chars > self.config.complex_threshold {
            RagStrategy::Hybrid
        } else if words < self.config.simple_max_words && chars < self.config.simple_threshold {
            RagStrategy::Tfidf
        } else {
            RagStrategy::Semantic
        }
    }

    async fn tfidf_search(&self, query: &str, k: usize) -> Result<Vec<Document>> {
        match &self.tfidf {
            Some(index) if index.is_ready() => Ok(index.search(query, k)),
            _ => {
                warn!("tf-idf index missing, falling back to semantic");
                self.semantic_search(query, k).await
            }
        }
    }

    async fn semantic_search(&self, query: &str, k: usize) -> Result<Vec<Document>> {
        self.vector
            .similarity_search(&self.config.collection, query, k, None)
            .await
    }

    async fn hybrid_search(&self, query: &str, k: usize) -> Result<Vec<Document>> {
        // Both branches fetch k*2 for a meaningful fusion.
        let (tfidf_result, semantic_result) =
            tokio::join!(self.tfidf_search(query, k * 2), self.semantic_search(query, k * 2));

        let tfidf_docs = tfidf_result.unwrap_or_else(|e| {
            warn!(error = %e, "tf-idf branch failed in hybrid");
            Vec::new()
        });
        let semantic_docs = semantic_result.unwrap_or_else(|e| {
            warn!(error = %e, "semantic branch failed in hybrid");
            Vec::new()
        });

        if tfidf_docs.is_empty() {
            return Ok(semantic_docs.into_iter().take(k).collect());
        }
        if semantic_docs.is_empty() {
            return Ok(tfidf_docs.into_iter().take(k).collect());
        }

        Ok(rrf_fuse(
            &[tfidf_docs, semantic_docs],
            self.config.rrf_k_constant,
            k,
        ))
    }

    async fn search_with_strategy(
        &self,
        strategy: RagStrategy,
        query: &str,
        k: usize,
    ) -> Result<Vec<Document>> {
        match strategy {
            RagStrategy::Tfidf => self.tfidf_search(query, k).await,
            RagStrategy::Semantic => self.semantic_search(query, k).await,
            RagStrategy::Hybrid => self.hybrid_search(query, k).await,
            // Resolved before dispatch.
            RagStrategy::Auto => self.semantic_search(query, k).await,
        }
    }
}

#[async_trait]
impl Tool for AdaptiveRagTool {
    fn name(&self) -> &'static str {
        "adaptive_rag_search"
    }

    async fn execute(&self, params: ToolParams) -> ToolResult {
        let ToolParams::AdaptiveRag(AdaptiveRagParams { query, strategy, k }) = params else {
            return wrong_params(self.name());
        };
        if query.is_empty() {
            return ToolResult::failure("query parameter is required");
        }

        let k = k.unwrap_or(self.config.top_k);
        let started = Instant::now();

        let strategy = if strategy == RagStrategy::Auto {
            let selected = self.classify(&query);
            info!(?selected, "auto-selected retrieval strategy");
            selected
        } else {
            strategy
        };

        let documents = match self.search_with_strategy(strategy, &query, k).await {
            Ok(docs) => docs,
            Err(e) if strategy != RagStrategy::Semantic => {
                warn!(error = %e, "retrieval failed, falling back to semantic");
                match self.semantic_search(&query, k).await {
                    Ok(docs) => docs,
                    Err(e2) => {
                        return ToolResult::failure(e2.to_string())
                            .with_metadata("strategy_attempted", json!(format!("{strategy:?}")))
                            .with_time(started.elapsed().as_millis() as f64);
                    }
                }
            }
            Err(e) => {
                return ToolResult::failure(e.to_string())
                    .with_metadata("strategy_attempted", json!(format!("{strategy:?}")))
                    .with_time(started.elapsed().as_millis() as f64);
            }
        };

        let elapsed = started.elapsed().as_millis() as f64;
        info!(count = documents.len(), ?strategy, "retrieval complete");

        ToolResult::ok(documents)
            .with_metadata("strategy_used", json!(format!("{strategy:?}").to_lowercase()))
            .with_time(elapsed)
    }
}

/// Reciprocal Rank Fusion over ranked lists.
///
/// score(d) = Σ 1/(C + rank_i(d)) over every list where d appears;
/// ranks are 1-based, ties keep first-seen order (stable sort).
pub fn rrf_fuse(lists: &[Vec<Document>], c: f64, k: usize) -> Vec<Document> {
    let mut order: Vec<String> = Vec::new();
    let mut scores: HashMap<String, f64> = HashMap::new();
    let mut originals: HashMap<String, Document> = HashMap::new();

    for list in lists {
        for (rank, doc) in list.iter().enumerate() {
            let key = doc.dedup_key();
            let contribution = 1.0 / (c + (rank + 1) as f64);
            if let Some(score) = scores.get_mut(&key) {
                *score += contribution;
            } else {
                scores.insert(key.clone(), contribution);
                order.push(key.clone());
                originals.insert(key, doc.clone());
            }
        }
    }

    let mut fused: Vec<(f64, String)> = order
        .into_iter()
        .map(|key| (scores[&key], key))
        .collect();
    // Stable: equal scores preserve first-seen order.
    fused.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    fused
        .into_iter()
        .take(k)
        .filter_map(|(score, key)| {
            originals.remove(&key).map(|doc| {
                doc.with_metadata("rrf_score", json!(score))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{HashedNgramEmbedder, InMemoryVectorStore};

    fn doc(text: &str) -> Document {
        Document::new(text, "rag_corpus")
    }

    fn tool_with_corpus(texts: &[&str]) -> AdaptiveRagTool {
        let vector = Arc::new(InMemoryVectorStore::new(Arc::new(HashedNgramEmbedder::default())));
        let docs: Vec<Document> = texts.iter().map(|t| doc(t)).collect();
        let index = TfidfIndex::build(docs.clone(), crate::retrieval::TfidfOptions::default());
        // Seed the semantic store synchronously.
        futures::executor::block_on(vector.add_documents("rag_corpus", &docs)).unwrap();
        AdaptiveRagTool::new(AdaptiveRagConfig::default(), vector, Some(Arc::new(index)))
    }

    #[test]
    fn test_auto_classification_rules() {
        let tool = tool_with_corpus(&["текст про сортировку"]);

        // Short query: tf-idf.
        assert_eq!(tool.classify("быстрая сортировка"), RagStrategy::Tfidf);

        // Comparison markers: hybrid.
        assert_eq!(
            tool.classify("сравнение времени и памяти quicksort vs mergesort"),
            RagStrategy::Hybrid
        );
        assert_eq!(tool.classify("что лучше для больших данных"), RagStrategy::Hybrid);

        // Long query without markers: hybrid by length.
        let long = "расскажи подробно ".repeat(15);
        assert_eq!(tool.classify(&long), RagStrategy::Hybrid);

        // Medium natural language question: semantic.
        assert_eq!(
            tool.classify("как работает этот знаменитый переборный метод на практике в проде"),
            RagStrategy::Semantic
        );
    }

    #[tokio::test]
    async fn test_empty_query_fails() {
        let tool = tool_with_corpus(&["текст"]);
        let result = tool
            .execute(ToolParams::AdaptiveRag(AdaptiveRagParams::default()))
            .await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_short_query_uses_tfidf() {
        let tool = tool_with_corpus(&[
            "Быстрая сортировка делит массив вокруг опорного элемента",
            "Быстрая сортировка работает за квадратичное время в худшем случае",
            "Обход графа в ширину использует очередь",
        ]);

        let result = tool
            .execute(ToolParams::AdaptiveRag(AdaptiveRagParams {
                query: "быстрая сортировка".to_string(),
                strategy: RagStrategy::Auto,
                k: Some(5),
            }))
            .await;

        assert!(result.success);
        assert_eq!(result.metadata["strategy_used"], json!("tfidf"));
        assert!(result.documents[0].content.contains("сортировка"));
    }

    #[test]
    fn test_rrf_scores_match_formula() {
        let a = doc("альфа документ о сортировке");
        let b = doc("бета документ о графах");

        // a is rank 1 in list one and rank 2 in list two.
        let fused = rrf_fuse(
            &[vec![a.clone(), b.clone()], vec![b.clone(), a.clone()]],
            60.0,
            2,
        );

        let expected_a = 1.0 / 61.0 + 1.0 / 62.0;
        let score_a = fused
            .iter()
            .find(|d| d.content.starts_with("альфа"))
            .and_then(|d| d.metadata["rrf_score"].as_f64())
            .unwrap();
        assert!((score_a - expected_a).abs() < 1e-12);
    }

    #[test]
    fn test_rrf_identical_lists_preserve_order() {
        let docs: Vec<Document> = (0..4).map(|i| doc(&format!("документ номер {i}"))).collect();
        let fused = rrf_fuse(&[docs.clone(), docs.clone()], 60.0, 4);
        let order: Vec<&str> = fused.iter().map(|d| d.content.as_str()).collect();
        let expected: Vec<&str> = docs.iter().map(|d| d.content.as_str()).collect();
        assert_eq!(order, expected);
    }

    proptest::proptest! {
        #[test]
        fn prop_rrf_score_is_sum_of_reciprocal_ranks(r1 in 0usize..8, r2 in 0usize..8) {
            let target = doc("целевой документ о быстрой сортировке");
            let mut list1: Vec<Document> =
                (0..8).map(|i| doc(&format!("наполнитель первого списка {i}"))).collect();
            let mut list2: Vec<Document> =
                (0..8).map(|i| doc(&format!("наполнитель второго списка {i}"))).collect();
            list1.insert(r1, target.clone());
            list2.insert(r2, target.clone());

            let fused = rrf_fuse(&[list1, list2], 60.0, 20);
            let expected = 1.0 / (60.0 + (r1 + 1) as f64) + 1.0 / (60.0 + (r2 + 1) as f64);
            let score = fused
                .iter()
                .find(|d| d.content.starts_with("целевой"))
                .and_then(|d| d.metadata["rrf_score"].as_f64())
                .unwrap();
            proptest::prop_assert!((score - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn test_rrf_surfaces_unique_documents_from_both_lists() {
        // Three docs unique to each list, overlapping on none.
        let keyword_hits: Vec<Document> =
            (0..3).map(|i| doc(&format!("ключевой документ {i}"))).collect();
        let semantic_hits: Vec<Document> =
            (0..3).map(|i| doc(&format!("семантический документ {i}"))).collect();

        let fused = rrf_fuse(&[keyword_hits, semantic_hits], 60.0, 5);
        assert_eq!(fused.len(), 5);
        let unique: std::collections::HashSet<String> =
            fused.iter().map(|d| d.dedup_key()).collect();
        assert!(unique.len() >= 4);
    }
}
