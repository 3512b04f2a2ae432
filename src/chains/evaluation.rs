//! Promise scoring and post-execution node evaluation.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::document::Document;
use crate::llm::{CompletionRequest, ModelRouter, TaskKind};
use crate::prompts;
use crate::tree::{NodeEvaluation, TreeNode};

use super::parsers;

/// Result of a scoring call, flagging whether a model call succeeded
/// (for tier cost attribution) or a heuristic was used.
#[derive(Debug, Clone, Copy)]
pub struct ScoredOutcome<T> {
    pub value: T,
    pub from_model: bool,
}

/// Chain for cheap-tier node scoring.
pub struct EvaluationChain {
    router: Arc<ModelRouter>,
}

impl EvaluationChain {
    pub fn new(router: Arc<ModelRouter>) -> Self {
        Self { router }
    }

    /// Pre-execution promise score of a candidate in [0, 1].
    ///
    /// Falls back to a per-tool heuristic when the model call fails.
    pub async fn promise(
        &self,
        candidate: &TreeNode,
        current: &TreeNode,
        query: &str,
    ) -> ScoredOutcome<f64> {
        let (tool_name, tool_params) = match &candidate.planned_action {
            Some(action) => (action.tool_name.clone(), action.tool_params.to_string()),
            None => (String::new(), String::new()),
        };

        let prompt = prompts::promise_evaluation(
            query,
            current.collected_info.len(),
            &tool_name,
            &tool_params,
            &candidate.reasoning,
        );

        let model = self.router.model_for(TaskKind::PromiseEvaluation);
        let request = CompletionRequest::new(prompt)
            .with_timeout(self.router.timeout_for(TaskKind::PromiseEvaluation));

        match model.complete(request).await {
            Ok(response) => {
                let score = parsers::parse_promise(&response.content);
                debug!(node = %candidate.id, score, "promise scored");
                ScoredOutcome { value: score, from_model: true }
            }
            Err(e) => {
                warn!(error = %e, "promise evaluation failed, using heuristic");
                ScoredOutcome {
                    value: heuristic_promise(candidate.planned_tool()),
                    from_model: false,
                }
            }
        }
    }

    /// Post-execution evaluation of a node.
    ///
    /// Falls back to document-count completeness when the model call
    /// fails.
    pub async fn evaluate_node(
        &self,
        node: &TreeNode,
        query: &str,
    ) -> ScoredOutcome<NodeEvaluation> {
        let tail_start = node.collected_info.len().saturating_sub(3);
        let latest = summarize_docs(&node.collected_info[tail_start..]);
        let prompt = prompts::node_evaluation(query, node.collected_info.len(), &latest);

        let model = self.router.model_for(TaskKind::NodeEvaluation);
        let request = CompletionRequest::new(prompt)
            .with_timeout(self.router.timeout_for(TaskKind::NodeEvaluation));

        match model.complete(request).await {
            Ok(response) => ScoredOutcome {
                value: parsers::parse_node_evaluation(&response.content),
                from_model: true,
            },
            Err(e) => {
                warn!(error = %e, "node evaluation failed, using heuristic");
                let completeness = heuristic_completeness(node);
                ScoredOutcome {
                    value: NodeEvaluation {
                        completeness,
                        relevance: 0.8,
                        quality: 0.8,
                        should_continue: completeness < 0.85,
                    },
                    from_model: false,
                }
            }
        }
    }
}

/// Heuristic promise by planned tool name.
pub(crate) fn heuristic_promise(tool_name: Option<&str>) -> f64 {
    match tool_name {
        Some("adaptive_rag_search") => 0.9,
        Some("memory_retrieval") => 0.8,
        Some("corrective_check") => 0.7,
        Some("web_search") => 0.6,
        Some("extract_concepts") => 0.6,
        _ => 0.5,
    }
}

/// Heuristic completeness: 0.15 per collected document, capped at 1.
pub(crate) fn heuristic_completeness(node: &TreeNode) -> f64 {
    (0.15 * node.collected_info.len() as f64).min(1.0)
}

fn summarize_docs(documents: &[Document]) -> String {
    if documents.is_empty() {
        return "Нет документов".to_string();
    }
    let mut summary = String::new();
    for (i, doc) in documents.iter().enumerate() {
        let snippet: String = doc.content.chars().take(200).collect::<String>().replace('\n', " ");
        summary.push_str(&format!("{}. [{}] {}...\n\n", i + 1, doc.source, snippet));
    }
    summary
}
