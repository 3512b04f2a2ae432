//! Corrective RAG: batch relevance filtering of collected documents.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::chains::parsers;
use crate::config::CorrectiveConfig;
use crate::document::Document;
use crate::llm::{CompletionRequest, ModelRouter, TaskKind};
use crate::prompts;

use super::concepts::DOMAIN_VOCABULARY;
use super::params::{CorrectiveParams, ToolParams};
use super::{wrong_params, Tool, ToolResult};

pub struct CorrectiveRagTool {
    config: CorrectiveConfig,
    router: Arc<ModelRouter>,
}

impl CorrectiveRagTool {
    pub fn new(config: CorrectiveConfig, router: Arc<ModelRouter>) -> Self {
        Self { config, router }
    }

    /// Score a batch of documents; fallback chain batch → per-document
    /// → neutral 0.5. Returns scores plus the model-call count.
    async fn batch_relevance(&self, query: &str, documents: &[String]) -> (Vec<f64>, u64) {
        let mut scores = Vec::with_capacity(documents.len());
        let mut model_calls = 0u64;

        for batch in documents.chunks(self.config.batch_size) {
            match self.score_batch(query, batch).await {
                Ok(batch_scores) => {
                    model_calls += 1;
                    scores.extend(batch_scores);
                }
                Err(message) => {
                    warn!(%message, "batch scoring failed, scoring per document");
                    for doc in batch {
                        match self.score_batch(query, std::slice::from_ref(doc)).await {
                            Ok(single) => {
                                model_calls += 1;
                                scores.extend(single);
                            }
                            Err(_) => scores.push(0.5),
                        }
                    }
                }
            }
        }

        (scores, model_calls)
    }

    async fn score_batch(&self, query: &str, batch: &[String]) -> Result<Vec<f64>, String> {
        let mut docs_text = String::new();
        for (i, doc) in batch.iter().enumerate() {
            let snippet: String = doc.chars().take(500).collect();
            docs_text.push_str(&format!("{i}. {snippet}\n\n"));
        }

        let model = self.router.model_for(TaskKind::RelevanceScoring);
        let request = CompletionRequest::new(prompts::relevance_scoring(query, &docs_text))
            .with_timeout(Duration::from_secs(self.config.timeout_s));

        let response = model.complete(request).await.map_err(|e| e.to_string())?;
        let entries = parsers::parse_batch_results(&response.content)
            .ok_or_else(|| "unparsable relevance response".to_string())?;
        if entries.len() != batch.len() {
            return Err(format!(
                "relevance response covered {}/{} documents",
                entries.len(),
                batch.len()
            ));
        }

        Ok(entries
            .iter()
            .map(|entry| {
                entry
                    .get("relevance_score")
                    .and_then(Value::as_f64)
                    .unwrap_or(0.5)
                    .clamp(0.0, 1.0)
            })
            .collect())
    }
}

/// Fraction of the domain vocabulary present in the query that the
/// surviving documents also cover.
pub(crate) fn concept_coverage(query: &str, documents: &[&str]) -> f64 {
    let query_lower = query.to_lowercase();
    let query_concepts: Vec<&str> = DOMAIN_VOCABULARY
        .iter()
        .copied()
        .filter(|term| query_lower.contains(term))
        .collect();

    if query_concepts.is_empty() {
        return 1.0;
    }

    let combined = documents
        .iter()
        .map(|d| d.to_lowercase())
        .collect::<Vec<_>>()
        .join("\n");

    let covered = query_concepts
        .iter()
        .filter(|term| combined.contains(**term))
        .count();

    covered as f64 / query_concepts.len() as f64
}

#[async_trait]
impl Tool for CorrectiveRagTool {
    fn name(&self) -> &'static str {
        "corrective_check"
    }

    async fn execute(&self, params: ToolParams) -> ToolResult {
        let ToolParams::Corrective(CorrectiveParams {
            query,
            documents,
            min_relevance,
            evaluate_coverage,
        }) = params
        else {
            return wrong_params(self.name());
        };
        if query.is_empty() || documents.is_empty() {
            return ToolResult::failure("query and documents are required");
        }

        let started = Instant::now();
        let min_relevance = min_relevance.unwrap_or(self.config.min_relevance);
        let evaluate_coverage = evaluate_coverage.unwrap_or(true);

        info!(count = documents.len(), "corrective check started");

        let (scores, model_calls) = self.batch_relevance(&query, &documents).await;

        let avg_relevance = if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        };

        let filtered: Vec<Document> = documents
            .iter()
            .zip(&scores)
            .filter(|(_, score)| **score >= min_relevance)
            .map(|(content, score)| {
                Document::new(content.clone(), "corrective_check")
                    .with_metadata("source", json!("rag_corrective"))
                    .with_relevance(*score)
            })
            .collect();

        info!(
            original = documents.len(),
            kept = filtered.len(),
            min_relevance,
            "relevance filter applied"
        );
        if filtered.len() < self.config.min_docs_after_filter {
            warn!(kept = filtered.len(), "below minimum document count after filtering");
        }

        let coverage = if evaluate_coverage && !filtered.is_empty() {
            let texts: Vec<&str> = filtered.iter().map(|d| d.content.as_str()).collect();
            concept_coverage(&query, &texts)
        } else {
            1.0
        };

        let original_count = documents.len();
        let filtered_count = filtered.len();
        ToolResult::ok(filtered)
            .with_metadata("original_count", json!(original_count))
            .with_metadata("filtered_count", json!(filtered_count))
            .with_metadata("avg_relevance", json!(avg_relevance))
            .with_metadata("concept_coverage", json!(coverage))
            .with_metadata("min_relevance_threshold", json!(min_relevance))
            .with_metadata("model_calls_cheap", json!(model_calls))
            .with_time(started.elapsed().as_millis() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::llm::{CompletionResponse, ModelClient};

    /// Scores documents by whether they mention the query topic.
    struct ScoringModel;

    #[async_trait]
    impl ModelClient for ScoringModel {
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
            // Pull the numbered snippets back out of the prompt.
            let mut results = Vec::new();
            for line in request.prompt.lines() {
                if let Some((id, text)) = line.split_once(". ") {
                    if id.trim().parse::<usize>().is_ok() {
                        let score = if text.contains("сортировк") { 0.9 } else { 0.2 };
                        results.push(format!(
                            r#"{{"doc_id": {}, "relevance_score": {score}}}"#,
                            id.trim()
                        ));
                    }
                }
            }
            Ok(CompletionResponse {
                content: format!(r#"{{"results": [{}]}}"#, results.join(",")),
                model: "stub".to_string(),
                elapsed_ms: 1.0,
            })
        }

        fn model_id(&self) -> &str {
            "stub"
        }
    }

    struct DownModel;

    #[async_trait]
    impl ModelClient for DownModel {
        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse> {
            Err(Error::model_unavailable("stub", "down"))
        }

        fn model_id(&self) -> &str {
            "stub"
        }
    }

    fn tool(model: Arc<dyn ModelClient>) -> CorrectiveRagTool {
        CorrectiveRagTool::new(
            CorrectiveConfig::default(),
            Arc::new(ModelRouter::new(model.clone(), model)),
        )
    }

    #[tokio::test]
    async fn test_filters_below_min_relevance() {
        let tool = tool(Arc::new(ScoringModel));
        let result = tool
            .execute(ToolParams::Corrective(CorrectiveParams {
                query: "быстрая сортировка".to_string(),
                documents: vec![
                    "глава про быструю сортировку".to_string(),
                    "страница про кулинарию".to_string(),
                ],
                min_relevance: None,
                evaluate_coverage: Some(false),
            }))
            .await;

        assert!(result.success);
        assert_eq!(result.documents.len(), 1);
        assert!(result.documents[0].content.contains("сортировку"));
        assert!(result.documents[0].relevance_score >= 0.6);
        assert_eq!(result.metadata["original_count"], json!(2));
        assert_eq!(result.cheap_model_calls(), 1);
    }

    #[tokio::test]
    async fn test_model_failure_gives_neutral_scores() {
        let tool = tool(Arc::new(DownModel));
        let result = tool
            .execute(ToolParams::Corrective(CorrectiveParams {
                query: "сортировка".to_string(),
                documents: vec!["документ".to_string()],
                min_relevance: Some(0.6),
                evaluate_coverage: Some(false),
            }))
            .await;

        // Neutral 0.5 scores fall below the 0.6 threshold.
        assert!(!result.success);
        assert_eq!(result.metadata["avg_relevance"], json!(0.5));
        assert_eq!(result.cheap_model_calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_inputs_fail() {
        let tool = tool(Arc::new(ScoringModel));
        let result = tool
            .execute(ToolParams::Corrective(CorrectiveParams::default()))
            .await;
        assert!(!result.success);
    }

    #[test]
    fn test_concept_coverage() {
        // Query mentions a graph and a stack; documents only cover graphs.
        let coverage = concept_coverage(
            "граф и стек",
            &["документ про граф и обходы"],
        );
        assert!((coverage - 0.5).abs() < 1e-9);

        // Query with no domain terms is fully covered by definition.
        assert_eq!(concept_coverage("привет мир", &["текст"]), 1.0);

        // Full coverage.
        assert_eq!(
            concept_coverage("дерево", &["двоичное дерево поиска"]),
            1.0
        );
    }
}
