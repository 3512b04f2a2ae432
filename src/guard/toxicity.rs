//! Toxicity stage: batch model scoring with per-document and
//! rule-based fallbacks.

use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

use crate::config::ContentGuardConfig;
use crate::llm::{CompletionRequest, ModelRouter, TaskKind};
use crate::prompts;

/// Toxicity verdict for a single document.
#[derive(Debug, Clone)]
pub struct ToxicityVerdict {
    pub doc_id: usize,
    pub is_safe: bool,
    pub toxicity_score: f64,
    pub issues: Vec<String>,
}

/// Aggregated batch outcome.
#[derive(Debug, Clone)]
pub struct ToxicityBatchOutcome {
    pub verdicts: Vec<ToxicityVerdict>,
    pub avg_toxicity: f64,
    pub filtered_count: usize,
    /// Cheap-tier model calls made while scoring
    pub model_calls: u64,
}

/// Words that raise the rule-based toxicity score.
const BLACKLIST_WORDS: &[&str] = &[
    "насилие",
    "убийство",
    "наркотики",
    "суицид",
    "экстремизм",
    "оружие массового",
    "казино",
    "порнография",
];

pub struct ToxicityChecker {
    router: Arc<ModelRouter>,
    config: ContentGuardConfig,
}

impl ToxicityChecker {
    pub fn new(router: Arc<ModelRouter>, config: ContentGuardConfig) -> Self {
        Self { router, config }
    }

    /// Score a list of document texts.
    ///
    /// Fallback chain: batch model call → per-document model call →
    /// blacklist-word scan. Never fails.
    pub async fn check_batch(&self, documents: &[String]) -> ToxicityBatchOutcome {
        let mut verdicts: Vec<ToxicityVerdict> = Vec::with_capacity(documents.len());
        let mut model_calls = 0u64;

        for (batch_index, batch) in documents.chunks(self.config.toxicity_batch_size).enumerate() {
            let start = batch_index * self.config.toxicity_batch_size;

            match self.score_with_model(batch, start).await {
                Ok(batch_verdicts) => {
                    model_calls += 1;
                    verdicts.extend(batch_verdicts);
                }
                Err(message) => {
                    warn!(%message, "batch toxicity check failed, falling back per document");
                    for (offset, doc) in batch.iter().enumerate() {
                        let doc_id = start + offset;
                        match self.score_with_model(std::slice::from_ref(doc), doc_id).await {
                            Ok(mut single) if !single.is_empty() => {
                                model_calls += 1;
                                verdicts.push(single.remove(0));
                            }
                            _ => verdicts.push(self.score_rule_based(doc, doc_id)),
                        }
                    }
                }
            }
        }

        let filtered_count = verdicts.iter().filter(|v| !v.is_safe).count();
        let avg_toxicity = if verdicts.is_empty() {
            0.0
        } else {
            verdicts.iter().map(|v| v.toxicity_score).sum::<f64>() / verdicts.len() as f64
        };

        ToxicityBatchOutcome {
            verdicts,
            avg_toxicity,
            filtered_count,
            model_calls,
        }
    }

    async fn score_with_model(
        &self,
        batch: &[String],
        start_id: usize,
    ) -> Result<Vec<ToxicityVerdict>, String> {
        let mut docs_text = String::new();
        for (i, doc) in batch.iter().enumerate() {
            let snippet: String = doc.chars().take(500).collect();
            docs_text.push_str(&format!("{}. {}\n\n", i + 1, snippet));
        }

        let model = self.router.model_for(TaskKind::ToxicityCheck);
        let request = CompletionRequest::new(prompts::toxicity_check(&docs_text))
            .with_timeout(std::time::Duration::from_secs(self.config.toxicity_timeout_s));

        let response = model.complete(request).await.map_err(|e| e.to_string())?;

        let entries = crate::chains::parsers::parse_batch_results(&response.content)
            .ok_or_else(|| "unparsable toxicity response".to_string())?;
        if entries.len() != batch.len() {
            return Err(format!(
                "toxicity response covered {}/{} documents",
                entries.len(),
                batch.len()
            ));
        }

        Ok(entries
            .iter()
            .enumerate()
            .map(|(offset, entry)| {
                let score = entry
                    .get("toxicity_score")
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0)
                    .clamp(0.0, 1.0);
                let model_safe = entry.get("is_safe").and_then(Value::as_bool).unwrap_or(true);
                ToxicityVerdict {
                    doc_id: start_id + offset,
                    is_safe: model_safe && score < self.config.toxicity_threshold,
                    toxicity_score: score,
                    issues: entry
                        .get("issues")
                        .and_then(Value::as_array)
                        .map(|items| {
                            items
                                .iter()
                                .filter_map(Value::as_str)
                                .map(str::to_string)
                                .collect()
                        })
                        .unwrap_or_default(),
                }
            })
            .collect())
    }

    /// Blacklist-word scan: +0.3 per hit, capped at 1.0.
    pub(crate) fn score_rule_based(&self, document: &str, doc_id: usize) -> ToxicityVerdict {
        let lowered = document.to_lowercase();
        let mut issues = Vec::new();
        let mut score = 0.0f64;

        for word in BLACKLIST_WORDS {
            if lowered.contains(word) {
                issues.push(format!("содержит запрещенное слово: {word}"));
                score += 0.3;
            }
        }
        let score = score.min(1.0);

        ToxicityVerdict {
            doc_id,
            is_safe: score < self.config.toxicity_threshold,
            toxicity_score: score,
            issues,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::llm::{CompletionResponse, ModelClient};
    use async_trait::async_trait;

    struct FailingModel;

    #[async_trait]
    impl ModelClient for FailingModel {
        async fn complete(
            &self,
            _request: crate::llm::CompletionRequest,
        ) -> Result<CompletionResponse> {
            Err(Error::model_unavailable("stub", "down"))
        }

        fn model_id(&self) -> &str {
            "stub"
        }
    }

    fn checker() -> ToxicityChecker {
        let model = Arc::new(FailingModel);
        let router = Arc::new(ModelRouter::new(model.clone(), model));
        ToxicityChecker::new(router, ContentGuardConfig::default())
    }

    #[test]
    fn test_rule_based_scoring_accumulates() {
        let c = checker();
        let verdict = c.score_rule_based("обычный учебный текст про сортировку", 0);
        assert!(verdict.is_safe);
        assert_eq!(verdict.toxicity_score, 0.0);

        let verdict = c.score_rule_based("насилие и наркотики и экстремизм", 1);
        assert!((verdict.toxicity_score - 0.9).abs() < 1e-9);
        assert!(!verdict.is_safe);
        assert_eq!(verdict.issues.len(), 3);
    }

    #[test]
    fn test_rule_based_score_caps_at_one() {
        let c = checker();
        let text = "насилие убийство наркотики суицид экстремизм казино";
        let verdict = c.score_rule_based(text, 0);
        assert_eq!(verdict.toxicity_score, 1.0);
    }

    #[tokio::test]
    async fn test_model_failure_falls_back_to_rules() {
        let c = checker();
        let outcome = c
            .check_batch(&["нормальный текст про алгоритмы".to_string()])
            .await;
        assert_eq!(outcome.verdicts.len(), 1);
        assert!(outcome.verdicts[0].is_safe);
        assert_eq!(outcome.model_calls, 0);
    }
}
