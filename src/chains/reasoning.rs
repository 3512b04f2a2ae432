//! Thought generation: prompt assembly, model call, candidate
//! materialization.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::document::Document;
use crate::error::{Error, Result};
use crate::llm::{CompletionRequest, ModelRouter, TaskKind};
use crate::memory::MemoryContext;
use crate::prompts;
use crate::tree::{PlannedAction, TreeNode};

use super::parsers;

/// Chain generating candidate thoughts for the next search step.
///
/// The only consumer of the Expensive tier besides final synthesis.
pub struct ReasoningChain {
    router: Arc<ModelRouter>,
}

impl ReasoningChain {
    pub fn new(router: Arc<ModelRouter>) -> Self {
        Self { router }
    }

    /// Generate up to `branching_factor` candidate child nodes.
    ///
    /// Fails with [`Error::ModelUnavailable`] when the model cannot be
    /// reached or its output yields no usable thoughts; the caller then
    /// switches to the rule-based fallback strategy.
    pub async fn generate_thoughts(
        &self,
        current: &TreeNode,
        query: &str,
        user_level: &str,
        memory: &MemoryContext,
        branching_factor: usize,
    ) -> Result<Vec<TreeNode>> {
        debug!(depth = current.depth, branching_factor, "generating thoughts");

        let prompt = prompts::thought_generation(
            query,
            user_level,
            current.depth,
            current.completeness_score,
            &summarize_collected(&current.collected_info),
            &memory.procedural_hints,
            branching_factor,
        );

        let model = self.router.model_for(TaskKind::ThoughtGeneration);
        let request = CompletionRequest::new(prompt)
            .with_timeout(self.router.timeout_for(TaskKind::ThoughtGeneration));

        let response = model.complete(request).await.map_err(|e| {
            warn!(error = %e, "thought generation call failed");
            Error::model_unavailable(model.model_id(), e.to_string())
        })?;

        let thoughts = parsers::parse_thoughts(&response.content);
        if thoughts.is_empty() {
            return Err(Error::model_unavailable(
                model.model_id(),
                "no thoughts in response",
            ));
        }

        let candidates: Vec<TreeNode> = thoughts
            .into_iter()
            .take(branching_factor)
            .map(|spec| {
                TreeNode::child_of(current)
                    .with_thought(spec.reasoning.clone())
                    .with_reasoning(spec.reasoning)
                    .with_action(PlannedAction::new(spec.tool_name, spec.tool_params))
            })
            .collect();

        info!(count = candidates.len(), "generated candidate thoughts");
        Ok(candidates)
    }
}

/// Summarize collected documents for the prompt: counts by source
/// family plus the last three snippets.
pub(crate) fn summarize_collected(documents: &[Document]) -> String {
    if documents.is_empty() {
        return "Нет собранной информации".to_string();
    }

    let web_count = documents.iter().filter(|d| d.is_web_sourced()).count();
    let rag_count = documents.len() - web_count;

    let mut summary = format!(
        "{} документов (RAG: {}, Web: {})",
        documents.len(),
        rag_count,
        web_count
    );

    summary.push_str("\n\nПоследние документы:\n");
    let tail_start = documents.len().saturating_sub(3);
    for (i, doc) in documents[tail_start..].iter().enumerate() {
        let snippet: String = doc.content.chars().take(100).collect::<String>().replace('\n', " ");
        summary.push_str(&format!("{}. {}...\n", i + 1, snippet));
    }

    summary
}
