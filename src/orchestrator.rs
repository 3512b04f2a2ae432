//! The Tree-of-Thoughts orchestrator: a promise-ranked depth-first
//! search over reasoning steps.
//!
//! Each iteration pops the most promising node, generates candidate
//! thoughts with the expensive model, scores their promise with the
//! cheap model, executes the best candidate's tool, filters the
//! evidence through the Content Guard and re-evaluates. Termination on
//! the completeness threshold, the depth cap or an exhausted stack.

use futures::future::join_all;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::chains::{EvaluationChain, ReasoningChain};
use crate::config::SearchConfig;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::guard::ContentGuard;
use crate::llm::{ModelRouter, ModelTier, TierUsage};
use crate::memory::{MemoryContext, MemoryManager, WorkingMemoryEntry};
use crate::metrics::MetricsCollector;
use crate::store::RelationalLog;
use crate::tools::{ToolParams, ToolRegistry, ToolResult};
use crate::tree::{NodeId, NodeIndex, NodeStatus, PlannedAction, ToTResult, TreeNode};

pub struct ToTOrchestrator {
    config: SearchConfig,
    reasoning: ReasoningChain,
    evaluation: EvaluationChain,
    registry: Arc<ToolRegistry>,
    guard: ContentGuard,
    memory: Arc<MemoryManager>,
    relational: Option<Arc<RelationalLog>>,
    metrics: Arc<MetricsCollector>,
}

impl ToTOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SearchConfig,
        router: Arc<ModelRouter>,
        registry: Arc<ToolRegistry>,
        guard: ContentGuard,
        memory: Arc<MemoryManager>,
        relational: Option<Arc<RelationalLog>>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            config,
            reasoning: ReasoningChain::new(Arc::clone(&router)),
            evaluation: EvaluationChain::new(router),
            registry,
            guard,
            memory,
            relational,
            metrics,
        }
    }

    /// Run the search for one query.
    pub async fn search(
        &self,
        query: &str,
        user_level: &str,
        memory_context: &MemoryContext,
    ) -> Result<ToTResult> {
        let started = Instant::now();
        self.metrics.search_started();

        let mut index = NodeIndex::new();
        let root = TreeNode::root(query);
        let root_id = root.id.clone();
        index.insert(root);

        let mut stack: Vec<NodeId> = vec![root_id.clone()];
        let mut explored: Vec<NodeId> = Vec::new();
        let mut best: Option<NodeId> = None;
        let mut best_score = 0.0f64;
        let mut usage = TierUsage::default();
        let mut tools_used: BTreeSet<String> = BTreeSet::new();

        let mut generation_attempted = false;
        let mut generation_succeeded = false;
        let mut any_tool_success = false;

        let max_iterations = self.config.max_iterations().max(1);
        let mut iteration = 0u32;

        info!(
            %query,
            max_depth = self.config.max_depth,
            completeness_threshold = self.config.completeness_threshold,
            "search started"
        );

        while iteration < max_iterations {
            let Some(current_id) = stack.pop() else {
                break;
            };
            iteration += 1;
            explored.push(current_id.clone());

            let current = {
                let Some(node) = index.get_mut(&current_id) else {
                    continue;
                };
                node.visited = true;
                node.clone()
            };

            info!(
                iteration,
                node = %current.id,
                depth = current.depth,
                completeness = current.completeness_score,
                documents = current.collected_info.len(),
                "exploring node"
            );
            self.log_node(&memory_context.session_id, &current);

            // Termination checks, in order.
            if current.completeness_score >= self.config.completeness_threshold {
                info!(node = %current.id, "goal reached");
                if let Some(node) = index.get_mut(&current_id) {
                    node.status = NodeStatus::GoalReached;
                }
                best = Some(current_id);
                break;
            }
            if current.depth >= self.config.max_depth {
                debug!(node = %current.id, "max depth reached");
                if current.completeness_score > best_score {
                    best_score = current.completeness_score;
                    best = Some(current_id);
                }
                continue;
            }
            if current.status == NodeStatus::DeadEnd {
                debug!(node = %current.id, "dead end, skipping");
                continue;
            }

            // Candidate generation; rule-based fallback on failure.
            generation_attempted = true;
            let mut candidates = match self
                .reasoning
                .generate_thoughts(
                    &current,
                    query,
                    user_level,
                    memory_context,
                    self.config.branching_factor,
                )
                .await
            {
                Ok(candidates) => {
                    generation_succeeded = true;
                    usage.record(ModelTier::Expensive);
                    candidates
                }
                Err(e) => {
                    warn!(error = %e, "thought generation unavailable, using rule-based fallback");
                    vec![fallback_candidate(&current, query)]
                }
            };
            if candidates.is_empty() {
                continue;
            }

            // Promise scoring, issued concurrently to the cheap tier.
            let outcomes = join_all(
                candidates
                    .iter()
                    .map(|candidate| self.evaluation.promise(candidate, &current, query)),
            )
            .await;
            for (candidate, outcome) in candidates.iter_mut().zip(outcomes) {
                candidate.promise_score = outcome.value;
                if outcome.from_model {
                    usage.record(ModelTier::Cheap);
                }
            }

            // Prune below the promise threshold.
            let pruned = candidates.len();
            let mut promising: Vec<TreeNode> = candidates
                .into_iter()
                .filter(|c| c.promise_score >= self.config.promise_threshold)
                .collect();
            if promising.is_empty() {
                warn!("all candidates pruned");
                if let Some(node) = index.get_mut(&current_id) {
                    node.status = NodeStatus::DeadEnd;
                }
                continue;
            }
            debug!(kept = promising.len(), pruned = pruned - promising.len(), "pruned candidates");

            // Best-first: sort by promise descending (stable), push in
            // reverse so the best candidate ends on top of the stack.
            promising.sort_by(|a, b| {
                b.promise_score
                    .partial_cmp(&a.promise_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            for child in promising.iter().rev() {
                stack.push(child.id.clone());
            }
            if let Some(parent) = index.get_mut(&current_id) {
                parent.children.extend(promising.iter().map(|c| c.id.clone()));
            }
            for child in promising {
                index.insert(child);
            }

            // Execute the top child's planned action.
            let Some(best_child_id) = stack.last().cloned() else {
                continue;
            };
            let exec_started = Instant::now();
            if let Some(child) = index.get_mut(&best_child_id) {
                child.status = NodeStatus::Executing;
            }

            let action = index.get(&best_child_id).and_then(|n| n.planned_action.clone());
            let collected_snapshot = index
                .get(&best_child_id)
                .map(|n| n.collected_info.clone())
                .unwrap_or_default();

            let tool_result = match &action {
                Some(action) => {
                    info!(tool = %action.tool_name, "executing action");
                    tools_used.insert(action.tool_name.clone());
                    self.metrics.tool_invoked();
                    self.run_tool(action, query, &collected_snapshot).await
                }
                None => ToolResult::failure("no planned action"),
            };
            usage.record_many(ModelTier::Cheap, tool_result.cheap_model_calls());
            if tool_result.success {
                any_tool_success = true;
            }
            if let (Some(relational), Some(action)) = (&self.relational, &action) {
                if let Err(e) = relational.record_tool_usage(
                    &action.tool_name,
                    tool_result.success,
                    tool_result.documents.len(),
                ) {
                    warn!(error = %e, "failed to record tool usage");
                }
            }

            // Content Guard over the new evidence.
            let mut attached_result = tool_result.clone();
            if tool_result.success && !tool_result.documents.is_empty() {
                let outcome = self.guard.process(tool_result.documents).await;
                usage.record_many(ModelTier::Cheap, outcome.cheap_calls);
                let filtered =
                    outcome.report.total_documents - outcome.report.passed_documents;
                self.metrics.documents_filtered(filtered as u64);
                if let Some(relational) = &self.relational {
                    if let Err(e) = relational
                        .log_content_guard(&memory_context.session_id, &outcome.report)
                    {
                        warn!(error = %e, "failed to log content guard report");
                    }
                }

                if outcome.documents.is_empty() {
                    // Not fatal for the node; the evaluation simply
                    // sees no new evidence.
                    warn!(
                        "{}",
                        Error::ContentGuardAllFiltered {
                            count: outcome.report.total_documents
                        }
                    );
                }

                let survivors: Vec<Document> = outcome
                    .documents
                    .into_iter()
                    .map(|clean| clean.into_document())
                    .collect();
                attached_result.documents = survivors.clone();
                if let Some(child) = index.get_mut(&best_child_id) {
                    child.extend_info(survivors);
                }
            }

            if let Some(child) = index.get_mut(&best_child_id) {
                child.action_result = Some(attached_result);
                child.execution_time_ms = exec_started.elapsed().as_millis() as f64;
                child.status = NodeStatus::Executed;
            }

            // Post-execution evaluation.
            let child_snapshot = match index.get(&best_child_id) {
                Some(node) => node.clone(),
                None => continue,
            };
            let outcome = self.evaluation.evaluate_node(&child_snapshot, query).await;
            if outcome.from_model {
                usage.record(ModelTier::Cheap);
            }
            let eval = outcome.value;
            info!(
                completeness = eval.completeness,
                relevance = eval.relevance,
                quality = eval.quality,
                "node evaluated"
            );

            let mut goal_reached = false;
            if let Some(child) = index.get_mut(&best_child_id) {
                child.completeness_score = eval.completeness;
                child.relevance_score = eval.relevance;
                child.quality_score = eval.quality;

                if eval.relevance < self.config.dead_end_relevance
                    || eval.quality < self.config.dead_end_quality
                {
                    warn!(node = %child.id, "dead end: low relevance or quality");
                    child.status = NodeStatus::DeadEnd;
                } else if eval.completeness >= self.config.completeness_threshold {
                    info!(node = %child.id, "goal reached in evaluation");
                    child.status = NodeStatus::GoalReached;
                    goal_reached = true;
                } else {
                    child.status = NodeStatus::Promising;
                }
            }
            if goal_reached {
                best = Some(best_child_id);
                break;
            }
            if eval.completeness > best_score {
                best_score = eval.completeness;
                best = Some(best_child_id.clone());
            }

            // Working-memory trace for this iteration.
            if let Some(child) = index.get(&best_child_id) {
                self.memory
                    .working
                    .append_step(WorkingMemoryEntry {
                        session_id: memory_context.session_id.clone(),
                        iteration,
                        node_id: child.id.to_string(),
                        depth: child.depth,
                        thought: child.thought.clone(),
                        tool_used: child.planned_tool().map(str::to_string),
                        tool_params: child
                            .planned_action
                            .as_ref()
                            .map(|a| a.tool_params.clone())
                            .unwrap_or(serde_json::Value::Null),
                        observation: format!(
                            "{} документов собрано",
                            child.collected_info.len()
                        ),
                        completeness: child.completeness_score,
                        timestamp: chrono::Utc::now(),
                    })
                    .await;
                if self.memory.working.is_degraded() {
                    self.metrics.memory_degraded();
                }
            }
        }

        // Resolve the best solution: goal node, or the explored node
        // with maximum completeness (earlier wins ties).
        let best_id = best.unwrap_or_else(|| {
            let mut best_id = root_id.clone();
            let mut best_completeness = f64::NEG_INFINITY;
            for id in &explored {
                if let Some(node) = index.get(id) {
                    if node.completeness_score > best_completeness {
                        best_completeness = node.completeness_score;
                        best_id = id.clone();
                    }
                }
            }
            warn!(completeness = best_completeness, "no goal reached, using best explored");
            best_id
        });

        let best_node = index
            .get(&best_id)
            .cloned()
            .ok_or_else(|| Error::SearchFailed("best node missing from index".to_string()))?;

        if generation_attempted
            && !generation_succeeded
            && !any_tool_success
            && best_node.completeness_score <= 0.0
            && best_node.collected_info.is_empty()
        {
            self.metrics.search_failed();
            return Err(Error::SearchFailed(
                "thought generation unavailable and the rule-based fallback produced no evidence"
                    .to_string(),
            ));
        }

        let best_path = index.trace_path(&best_id);
        let explored_nodes: Vec<TreeNode> = explored
            .iter()
            .filter_map(|id| index.get(id).cloned())
            .collect();

        let total_time_ms = started.elapsed().as_millis() as f64;
        self.metrics.model_calls(ModelTier::Expensive, usage.expensive);
        self.metrics.model_calls(ModelTier::Cheap, usage.cheap);
        self.metrics.search_completed();

        info!(
            iterations = iteration,
            explored = explored_nodes.len(),
            path_len = best_path.len(),
            completeness = best_node.completeness_score,
            documents = best_node.collected_info.len(),
            "search complete"
        );

        Ok(ToTResult {
            best_path,
            collected_documents: best_node.collected_info.clone(),
            final_completeness: best_node.completeness_score,
            explored_nodes,
            iterations: iteration,
            tools_used,
            total_time_ms,
            model_usage: usage,
        })
    }

    /// Parse, enrich and execute a planned action. Never fails; parse
    /// rejections become failed results before any I/O.
    async fn run_tool(
        &self,
        action: &PlannedAction,
        query: &str,
        collected: &[Document],
    ) -> ToolResult {
        let params = match self.registry.parse_params(&action.tool_name, &action.tool_params) {
            Ok(params) => self.enrich_params(params, query, collected),
            Err(e) => {
                warn!(tool = %action.tool_name, error = %e, "rejected ill-typed tool invocation");
                return ToolResult::failure(e.to_string());
            }
        };

        let Some(tool) = self.registry.get(&action.tool_name) else {
            return ToolResult::failure(format!("tool {} not found", action.tool_name));
        };
        tool.execute(params).await
    }

    /// Fill in context the model routinely leaves out of its parameter
    /// maps: the search query and the already-collected documents.
    fn enrich_params(
        &self,
        params: ToolParams,
        query: &str,
        collected: &[Document],
    ) -> ToolParams {
        match params {
            ToolParams::AdaptiveRag(mut p) => {
                if p.query.is_empty() {
                    p.query = query.to_string();
                }
                ToolParams::AdaptiveRag(p)
            }
            ToolParams::Corrective(mut p) => {
                if p.query.is_empty() {
                    p.query = query.to_string();
                }
                if p.documents.is_empty() {
                    p.documents = collected.iter().map(|d| d.content.clone()).collect();
                }
                ToolParams::Corrective(p)
            }
            ToolParams::WebSearch(mut p) => {
                if p.query.is_empty() {
                    p.query = query.to_string();
                }
                ToolParams::WebSearch(p)
            }
            ToolParams::Concepts(mut p) => {
                if p.text.is_empty() {
                    let tail_start = collected.len().saturating_sub(3);
                    p.text = collected[tail_start..]
                        .iter()
                        .map(|d| d.content.as_str())
                        .collect::<Vec<_>>()
                        .join("\n\n");
                    if p.text.is_empty() {
                        p.text = query.to_string();
                    }
                }
                ToolParams::Concepts(p)
            }
            ToolParams::MemoryLookup(mut p) => {
                if p.query.is_empty() {
                    p.query = query.to_string();
                }
                ToolParams::MemoryLookup(p)
            }
            other => other,
        }
    }

    fn log_node(&self, session_id: &str, node: &TreeNode) {
        if let Some(relational) = &self.relational {
            if let Err(e) = relational.log_node(session_id, node) {
                warn!(error = %e, "failed to log node");
            }
        }
    }
}

/// Depth-indexed rule-based candidate when thought generation is
/// unavailable.
fn fallback_candidate(current: &TreeNode, query: &str) -> TreeNode {
    let (reasoning, tool_name, params) = match current.depth {
        0 => (
            "Начинаю с поиска в локальной базе знаний",
            "adaptive_rag_search",
            json!({"query": query, "strategy": "semantic", "k": 5}),
        ),
        1 => (
            "Проверяю релевантность собранных документов",
            "corrective_check",
            json!({"query": query, "min_relevance": 0.6}),
        ),
        2 => (
            "Ищу дополнительную информацию в интернете",
            "web_search",
            json!({"query": query, "num_results": 5, "scrape_content": true}),
        ),
        _ => (
            "Извлекаю ключевые концепции для углубления",
            "extract_concepts",
            json!({"method": "auto", "top_n": 10}),
        ),
    };

    let mut node = TreeNode::child_of(current)
        .with_thought(reasoning)
        .with_reasoning(reasoning)
        .with_action(PlannedAction::new(tool_name, params));
    node.promise_score = 0.7;
    node
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_candidate_by_depth() {
        let root = TreeNode::root("запрос");
        let query = "быстрая сортировка";

        let first = fallback_candidate(&root, query);
        assert_eq!(first.planned_tool(), Some("adaptive_rag_search"));
        assert_eq!(first.depth, 1);
        assert_eq!(first.promise_score, 0.7);
        let params = &first.planned_action.as_ref().unwrap().tool_params;
        assert_eq!(params["query"], json!(query));

        let mut deeper = TreeNode::child_of(&root);
        deeper.depth = 1;
        assert_eq!(fallback_candidate(&deeper, query).planned_tool(), Some("corrective_check"));

        deeper.depth = 2;
        assert_eq!(fallback_candidate(&deeper, query).planned_tool(), Some("web_search"));

        deeper.depth = 7;
        assert_eq!(
            fallback_candidate(&deeper, query).planned_tool(),
            Some("extract_concepts")
        );
    }

    #[test]
    fn test_fallback_candidate_inherits_documents() {
        let mut root = TreeNode::root("q");
        root.collected_info.push(Document::new("уже собранный документ", "rag"));
        let candidate = fallback_candidate(&root, "q");
        assert_eq!(candidate.collected_info, root.collected_info);
        assert_eq!(candidate.parent_id, Some(root.id));
    }
}
