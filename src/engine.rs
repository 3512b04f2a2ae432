//! The research engine: the full per-request pipeline around the
//! search — validation, memory context, search, final synthesis and
//! persistence.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Settings;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::guard::ContentGuard;
use crate::llm::{CompletionRequest, ModelClient, ModelRouter, ModelTier, TaskKind};
use crate::memory::MemoryManager;
use crate::metrics::MetricsCollector;
use crate::orchestrator::ToTOrchestrator;
use crate::prompts;
use crate::retrieval::TfidfIndex;
use crate::store::{HashedNgramEmbedder, InMemoryVectorStore, RelationalLog, VectorStore};
use crate::tools::{ToolContext, ToolRegistry};
use crate::tree::ToTResult;
use crate::validate::InputValidator;

/// Outcome of one full generation request.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub session_id: String,
    /// Synthesized material
    pub content: String,
    /// The underlying search result with metrics
    pub result: ToTResult,
}

/// Builder wiring the engine's external adapters.
pub struct EngineBuilder {
    settings: Settings,
    expensive: Option<Arc<dyn ModelClient>>,
    cheap: Option<Arc<dyn ModelClient>>,
    vector: Option<Arc<dyn VectorStore>>,
    tfidf: Option<Arc<TfidfIndex>>,
    relational: Option<Arc<RelationalLog>>,
}

impl EngineBuilder {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            expensive: None,
            cheap: None,
            vector: None,
            tfidf: None,
            relational: None,
        }
    }

    /// Expensive-tier client (thought generation, final synthesis).
    pub fn expensive_model(mut self, client: Arc<dyn ModelClient>) -> Self {
        self.expensive = Some(client);
        self
    }

    /// Cheap-tier client (every evaluation and filtering task).
    pub fn cheap_model(mut self, client: Arc<dyn ModelClient>) -> Self {
        self.cheap = Some(client);
        self
    }

    pub fn vector_store(mut self, vector: Arc<dyn VectorStore>) -> Self {
        self.vector = Some(vector);
        self
    }

    pub fn tfidf_index(mut self, index: Arc<TfidfIndex>) -> Self {
        self.tfidf = Some(index);
        self
    }

    pub fn relational_log(mut self, log: Arc<RelationalLog>) -> Self {
        self.relational = Some(log);
        self
    }

    pub fn build(self) -> Result<ResearchEngine> {
        let expensive = self
            .expensive
            .ok_or_else(|| Error::Config("expensive model client is required".to_string()))?;
        let cheap = self
            .cheap
            .ok_or_else(|| Error::Config("cheap model client is required".to_string()))?;

        let settings = Arc::new(self.settings);
        let router = Arc::new(ModelRouter::new(expensive, cheap));
        let vector = self
            .vector
            .unwrap_or_else(|| Arc::new(InMemoryVectorStore::new(Arc::new(HashedNgramEmbedder::default()))));
        let metrics = Arc::new(MetricsCollector::new());

        let memory = Arc::new(MemoryManager::new(
            Arc::clone(&vector),
            settings.memory.clone(),
            self.relational.clone(),
        ));

        let registry = Arc::new(ToolRegistry::new(ToolContext {
            settings: Arc::clone(&settings),
            router: Arc::clone(&router),
            vector,
            tfidf: self.tfidf,
            memory: Arc::clone(&memory),
        }));

        let guard = ContentGuard::new(Arc::clone(&router), settings.content_guard.clone());
        let validator = InputValidator::new(Arc::clone(&router), settings.validation.clone());
        let orchestrator = ToTOrchestrator::new(
            settings.search.clone(),
            Arc::clone(&router),
            registry,
            guard,
            Arc::clone(&memory),
            self.relational.clone(),
            Arc::clone(&metrics),
        );

        Ok(ResearchEngine {
            settings,
            router,
            validator,
            memory,
            orchestrator,
            relational: self.relational,
            metrics,
        })
    }
}

/// Full request pipeline: validate → load context → search →
/// synthesize → persist.
pub struct ResearchEngine {
    #[allow(dead_code)]
    settings: Arc<Settings>,
    router: Arc<ModelRouter>,
    validator: InputValidator,
    memory: Arc<MemoryManager>,
    orchestrator: ToTOrchestrator,
    relational: Option<Arc<RelationalLog>>,
    metrics: Arc<MetricsCollector>,
}

impl ResearchEngine {
    pub fn builder(settings: Settings) -> EngineBuilder {
        EngineBuilder::new(settings)
    }

    /// Metrics collector shared across requests.
    pub fn metrics(&self) -> Arc<MetricsCollector> {
        Arc::clone(&self.metrics)
    }

    /// Memory manager, for maintenance tasks (TTL cleanup and the
    /// like).
    pub fn memory(&self) -> Arc<MemoryManager> {
        Arc::clone(&self.memory)
    }

    /// Run one request end to end.
    pub async fn generate(
        &self,
        query: &str,
        user_level: &str,
        user_id: &str,
    ) -> Result<GenerationOutcome> {
        self.validator.validate(query).await?;

        let context = self.memory.load_context(user_id, query).await;
        let result = self.orchestrator.search(query, user_level, &context).await?;

        let content = self.synthesize(query, user_level, &result).await?;
        self.metrics.model_calls(ModelTier::Expensive, 1);

        if let Some(relational) = &self.relational {
            if let Err(e) = relational.log_generation(
                &context.session_id,
                user_id,
                query,
                user_level,
                &result,
            ) {
                warn!(error = %e, "failed to log generation");
            }
        }

        self.memory
            .save_successful_generation(&context, &result, query, user_level)
            .await;

        info!(
            session = %context.session_id,
            completeness = result.final_completeness,
            "generation complete"
        );

        Ok(GenerationOutcome {
            session_id: context.session_id.clone(),
            content,
            result,
        })
    }

    /// Like [`generate`](Self::generate) but bounded by a request
    /// deadline. On expiry the pipeline unwinds at the next suspension
    /// point without persisting to procedural memory.
    pub async fn generate_with_deadline(
        &self,
        query: &str,
        user_level: &str,
        user_id: &str,
        deadline: Duration,
    ) -> Result<GenerationOutcome> {
        match tokio::time::timeout(deadline, self.generate(query, user_level, user_id)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::timeout(deadline.as_millis() as u64)),
        }
    }

    /// Ask the expensive model to synthesize the final material from
    /// the collected evidence.
    async fn synthesize(
        &self,
        query: &str,
        user_level: &str,
        result: &ToTResult,
    ) -> Result<String> {
        let digest = documents_digest(&result.collected_documents);
        let prompt = prompts::final_synthesis(query, user_level, &digest);

        let model = self.router.model_for(TaskKind::FinalSynthesis);
        let request = CompletionRequest::new(prompt)
            .with_timeout(self.router.timeout_for(TaskKind::FinalSynthesis));

        let response = model.complete(request).await?;
        Ok(response.content)
    }
}

/// Deduplicated, numbered digest of collected documents for the
/// synthesis prompt.
fn documents_digest(documents: &[Document]) -> String {
    if documents.is_empty() {
        return "Документы не собраны; отвечай на основе общих знаний и отметь это.".to_string();
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut digest = String::new();
    let mut index = 0;

    for doc in documents {
        if !seen.insert(doc.dedup_key()) {
            continue;
        }
        index += 1;
        let snippet: String = doc.content.chars().take(1500).collect();
        digest.push_str(&format!("## Документ {index} [{}]\n{snippet}\n\n", doc.source));
        if index >= 20 {
            break;
        }
    }
    digest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_deduplicates_by_content_prefix() {
        let base: String = "x".repeat(100);
        let docs = vec![
            Document::new(format!("{base} вариант один"), "rag"),
            Document::new(format!("{base} вариант два"), "web"),
            Document::new("другой документ", "rag"),
        ];
        let digest = documents_digest(&docs);
        assert!(digest.contains("Документ 1"));
        assert!(digest.contains("Документ 2"));
        assert!(!digest.contains("Документ 3"));
    }

    #[test]
    fn test_digest_empty() {
        assert!(documents_digest(&[]).contains("не собраны"));
    }

    #[test]
    fn test_builder_requires_models() {
        assert!(matches!(
            EngineBuilder::new(Settings::default()).build(),
            Err(Error::Config(_))
        ));
    }
}
