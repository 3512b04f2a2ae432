//! Content Guard: the four-stage filter every retrieved document must
//! pass before entering the reasoning trace.
//!
//! Stage order: toxicity → policy → sanitize → quality. Each stage may
//! reduce the list; the pipeline short-circuits when it becomes empty.

pub mod policy;
pub mod quality;
pub mod sanitize;
pub mod toxicity;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ContentGuardConfig;
use crate::document::{CleanDocument, Document};
use crate::llm::ModelRouter;

pub use policy::{PolicyChecker, PolicyVerdict};
pub use quality::{QualityGate, QualityVerdict};
pub use sanitize::{SanitizeOutcome, Sanitizer};
pub use toxicity::{ToxicityBatchOutcome, ToxicityChecker, ToxicityVerdict};

/// Per-run filtering report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentGuardReport {
    pub total_documents: usize,
    pub passed_documents: usize,
    pub filtered_by_toxicity: usize,
    pub filtered_by_policy: usize,
    pub filtered_by_quality: usize,
    pub avg_toxicity_score: f64,
    pub processing_time_ms: f64,
}

impl ContentGuardReport {
    /// Fraction of documents any stage removed.
    pub fn filter_rate(&self) -> f64 {
        if self.total_documents == 0 {
            return 0.0;
        }
        let filtered =
            self.filtered_by_toxicity + self.filtered_by_policy + self.filtered_by_quality;
        filtered as f64 / self.total_documents as f64
    }
}

/// Outcome of one pipeline run.
#[derive(Debug)]
pub struct GuardOutcome {
    pub documents: Vec<CleanDocument>,
    pub report: ContentGuardReport,
    /// Cheap-tier model calls made by the toxicity and policy stages
    pub cheap_calls: u64,
}

/// The sequential filtering pipeline.
pub struct ContentGuard {
    config: ContentGuardConfig,
    toxicity: ToxicityChecker,
    policy: PolicyChecker,
    sanitizer: Sanitizer,
    quality: QualityGate,
}

impl ContentGuard {
    pub fn new(router: Arc<ModelRouter>, config: ContentGuardConfig) -> Self {
        Self {
            toxicity: ToxicityChecker::new(Arc::clone(&router), config.clone()),
            policy: PolicyChecker::new(router, config.clone()),
            sanitizer: Sanitizer::new(config.clone()),
            quality: QualityGate::new(config.clone()),
            config,
        }
    }

    /// Run the pipeline over a tool's documents.
    pub async fn process(&self, documents: Vec<Document>) -> GuardOutcome {
        let total = documents.len();
        if total == 0 {
            return GuardOutcome {
                documents: Vec::new(),
                report: ContentGuardReport::default(),
                cheap_calls: 0,
            };
        }

        if !self.config.enabled {
            debug!("content guard disabled, passing all documents through");
            return GuardOutcome {
                documents: documents.into_iter().map(CleanDocument::unguarded).collect(),
                report: ContentGuardReport {
                    total_documents: total,
                    passed_documents: total,
                    ..ContentGuardReport::default()
                },
                cheap_calls: 0,
            };
        }

        let started = Instant::now();
        let mut cheap_calls = 0u64;
        info!(count = total, "content guard processing documents");

        // Stage 1: batch toxicity.
        let contents: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
        let toxicity = self.toxicity.check_batch(&contents).await;
        cheap_calls += toxicity.model_calls;

        let mut survivors: Vec<(Document, f64)> = Vec::new();
        let mut filtered_by_toxicity = 0;
        for (doc, verdict) in documents.into_iter().zip(&toxicity.verdicts) {
            if verdict.is_safe {
                survivors.push((doc, verdict.toxicity_score));
            } else {
                filtered_by_toxicity += 1;
                debug!(score = verdict.toxicity_score, "filtered by toxicity");
            }
        }

        if survivors.is_empty() {
            warn!("all documents filtered by toxicity");
            return GuardOutcome {
                documents: Vec::new(),
                report: ContentGuardReport {
                    total_documents: total,
                    passed_documents: 0,
                    filtered_by_toxicity,
                    avg_toxicity_score: toxicity.avg_toxicity,
                    processing_time_ms: started.elapsed().as_millis() as f64,
                    ..ContentGuardReport::default()
                },
                cheap_calls,
            };
        }

        // Stage 2: per-document policy compliance.
        let mut compliant: Vec<(Document, f64)> = Vec::new();
        let mut filtered_by_policy = 0;
        for (doc, tox_score) in survivors {
            let (verdict, from_model) = self.policy.check(&doc.content).await;
            if from_model {
                cheap_calls += 1;
            }
            if verdict.compliant {
                compliant.push((doc, tox_score));
            } else {
                filtered_by_policy += 1;
                debug!(violations = ?verdict.violations, "filtered by policy");
            }
        }

        if compliant.is_empty() {
            warn!("all documents filtered by policy");
            return GuardOutcome {
                documents: Vec::new(),
                report: ContentGuardReport {
                    total_documents: total,
                    passed_documents: 0,
                    filtered_by_toxicity,
                    filtered_by_policy,
                    avg_toxicity_score: toxicity.avg_toxicity,
                    processing_time_ms: started.elapsed().as_millis() as f64,
                    ..ContentGuardReport::default()
                },
                cheap_calls,
            };
        }

        // Stage 3: rule-based sanitization (rewrites, never drops).
        let sanitized: Vec<(Document, f64)> = compliant
            .into_iter()
            .map(|(mut doc, tox_score)| {
                let outcome = self.sanitizer.sanitize(&doc.content, doc.is_web_sourced());
                doc.content = outcome.content;
                doc.metadata.insert(
                    "removed_elements".to_string(),
                    serde_json::json!(outcome.removed),
                );
                (doc, tox_score)
            })
            .collect();

        // Stage 4: quality gate.
        let mut cleaned = Vec::new();
        let mut filtered_by_quality = 0;
        for (doc, tox_score) in sanitized {
            let verdict = self.quality.check(&doc.content);
            if verdict.passed {
                cleaned.push(CleanDocument {
                    document: doc,
                    content_guarded: true,
                    toxicity_score: tox_score,
                    policy_compliant: true,
                    sanitized: true,
                    quality_passed: true,
                });
            } else {
                filtered_by_quality += 1;
                debug!(reason = ?verdict.reason, "filtered by quality");
            }
        }

        let report = ContentGuardReport {
            total_documents: total,
            passed_documents: cleaned.len(),
            filtered_by_toxicity,
            filtered_by_policy,
            filtered_by_quality,
            avg_toxicity_score: toxicity.avg_toxicity,
            processing_time_ms: started.elapsed().as_millis() as f64,
        };

        info!(
            total = report.total_documents,
            passed = report.passed_documents,
            toxicity = filtered_by_toxicity,
            policy = filtered_by_policy,
            quality = filtered_by_quality,
            "content guard complete"
        );

        GuardOutcome {
            documents: cleaned,
            report,
            cheap_calls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::llm::{CompletionRequest, CompletionResponse, ModelClient};
    use async_trait::async_trait;

    /// Model that approves everything with low toxicity.
    struct PermissiveModel;

    #[async_trait]
    impl ModelClient for PermissiveModel {
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
            let content = if request.prompt.contains("токсичность") {
                // Count numbered documents in the batch prompt.
                let count = request
                    .prompt
                    .lines()
                    .filter(|l| {
                        l.split_once(". ")
                            .is_some_and(|(n, _)| n.trim().parse::<usize>().is_ok())
                    })
                    .count()
                    .max(1);
                let results: Vec<String> = (1..=count)
                    .map(|i| {
                        format!(r#"{{"doc_id": {i}, "is_safe": true, "toxicity_score": 0.05, "issues": []}}"#)
                    })
                    .collect();
                format!(r#"{{"results": [{}]}}"#, results.join(","))
            } else {
                r#"{"compliant": true, "violations": [], "confidence": 0.95}"#.to_string()
            };
            Ok(CompletionResponse {
                content,
                model: "stub".to_string(),
                elapsed_ms: 1.0,
            })
        }

        fn model_id(&self) -> &str {
            "stub"
        }
    }

    fn guard(config: ContentGuardConfig) -> ContentGuard {
        let model = Arc::new(PermissiveModel);
        let router = Arc::new(ModelRouter::new(model.clone(), model));
        ContentGuard::new(router, config)
    }

    fn good_doc(i: usize) -> Document {
        Document::new(
            format!(
                "Документ номер {i} рассказывает про сортировку. \
                 Он объясняет алгоритм шаг за шагом. \
                 Примеры кода прилагаются к каждому разделу."
            ),
            "rag_corpus",
        )
    }

    #[tokio::test]
    async fn test_empty_input_is_constant_time() {
        let outcome = guard(ContentGuardConfig::default()).process(Vec::new()).await;
        assert!(outcome.documents.is_empty());
        assert_eq!(outcome.report.total_documents, 0);
        assert_eq!(outcome.report.passed_documents, 0);
        assert_eq!(outcome.cheap_calls, 0);
    }

    #[tokio::test]
    async fn test_disabled_pipeline_passes_unguarded() {
        let config = ContentGuardConfig {
            enabled: false,
            ..ContentGuardConfig::default()
        };
        let outcome = guard(config).process(vec![good_doc(1)]).await;
        assert_eq!(outcome.documents.len(), 1);
        assert!(!outcome.documents[0].content_guarded);
        assert_eq!(outcome.cheap_calls, 0);
    }

    #[tokio::test]
    async fn test_clean_documents_pass_all_stages() {
        let outcome = guard(ContentGuardConfig::default())
            .process(vec![good_doc(1), good_doc(2)])
            .await;
        assert_eq!(outcome.documents.len(), 2);
        for doc in &outcome.documents {
            assert!(doc.content_guarded);
            assert!(doc.policy_compliant);
            assert!(doc.sanitized);
            assert!(doc.quality_passed);
            assert!(doc.toxicity_score < 0.7);
        }
        assert_eq!(outcome.report.passed_documents, 2);
        assert_eq!(outcome.report.filter_rate(), 0.0);
        // One toxicity batch + one policy call per document.
        assert_eq!(outcome.cheap_calls, 3);
    }

    #[tokio::test]
    async fn test_quality_gate_drops_short_documents() {
        let outcome = guard(ContentGuardConfig::default())
            .process(vec![good_doc(1), Document::new("Мало.", "rag")])
            .await;
        assert_eq!(outcome.documents.len(), 1);
        assert_eq!(outcome.report.filtered_by_quality, 1);
        assert!(outcome.report.filter_rate() > 0.0);
    }
}
