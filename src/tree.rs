//! Reasoning tree types: nodes, evaluations, the search result and the
//! id-keyed node index used for path tracing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use uuid::Uuid;

use crate::document::Document;
use crate::llm::TierUsage;
use crate::tools::ToolResult;

/// Unique identifier of a tree node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    /// The root node id.
    pub fn root() -> Self {
        Self("root".to_string())
    }

    /// Generate a fresh short id.
    pub fn generate() -> Self {
        let hex = Uuid::new_v4().simple().to_string();
        Self(format!("node_{}", &hex[..8]))
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Not yet executed
    Pending,
    /// Action currently running
    Executing,
    /// Action finished
    Executed,
    /// Evaluated as worth expanding
    Promising,
    /// Evaluated too low; never re-expanded
    DeadEnd,
    /// Completeness reached the goal threshold
    GoalReached,
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Executing => "executing",
            Self::Executed => "executed",
            Self::Promising => "promising",
            Self::DeadEnd => "dead_end",
            Self::GoalReached => "goal_reached",
        };
        write!(f, "{s}")
    }
}

/// The tool invocation a node plans to perform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedAction {
    pub tool_name: String,
    /// Free-form parameter map as produced by the model; parsed into
    /// typed parameters at the registry boundary.
    pub tool_params: Value,
}

impl PlannedAction {
    pub fn new(tool_name: impl Into<String>, tool_params: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            tool_params,
        }
    }
}

/// A node in the reasoning tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: NodeId,
    pub parent_id: Option<NodeId>,
    pub depth: u32,

    /// The agent's thought at this step
    pub thought: String,
    /// Why this action was chosen
    pub reasoning: String,
    pub planned_action: Option<PlannedAction>,

    pub action_result: Option<ToolResult>,
    /// Accumulated evidence; a child starts from a copy of its parent's
    pub collected_info: Vec<Document>,

    pub promise_score: f64,
    pub completeness_score: f64,
    pub relevance_score: f64,
    pub quality_score: f64,

    pub status: NodeStatus,
    pub children: Vec<NodeId>,
    pub visited: bool,

    pub created_at: DateTime<Utc>,
    pub execution_time_ms: f64,
    pub model_calls: TierUsage,
}

impl TreeNode {
    /// Create the root node for a query.
    pub fn root(query: &str) -> Self {
        Self {
            id: NodeId::root(),
            parent_id: None,
            depth: 0,
            thought: format!("Начинаю анализ запроса: {query}"),
            reasoning: String::new(),
            planned_action: None,
            action_result: None,
            collected_info: Vec::new(),
            promise_score: 0.0,
            completeness_score: 0.0,
            relevance_score: 0.0,
            quality_score: 0.0,
            status: NodeStatus::Pending,
            children: Vec::new(),
            visited: false,
            created_at: Utc::now(),
            execution_time_ms: 0.0,
            model_calls: TierUsage::default(),
        }
    }

    /// Create a child node inheriting the parent's collected documents.
    pub fn child_of(parent: &TreeNode) -> Self {
        Self {
            id: NodeId::generate(),
            parent_id: Some(parent.id.clone()),
            depth: parent.depth + 1,
            thought: String::new(),
            reasoning: String::new(),
            planned_action: None,
            action_result: None,
            collected_info: parent.collected_info.clone(),
            promise_score: 0.0,
            completeness_score: 0.0,
            relevance_score: 0.0,
            quality_score: 0.0,
            status: NodeStatus::Pending,
            children: Vec::new(),
            visited: false,
            created_at: Utc::now(),
            execution_time_ms: 0.0,
            model_calls: TierUsage::default(),
        }
    }

    pub fn with_thought(mut self, thought: impl Into<String>) -> Self {
        self.thought = thought.into();
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    pub fn with_action(mut self, action: PlannedAction) -> Self {
        self.planned_action = Some(action);
        self
    }

    /// Extend the collected evidence. Duplicates are permitted at the
    /// node level; deduplication happens when results are assembled.
    pub fn extend_info(&mut self, documents: impl IntoIterator<Item = Document>) {
        self.collected_info.extend(documents);
    }

    /// Name of the planned tool, if any.
    pub fn planned_tool(&self) -> Option<&str> {
        self.planned_action.as_ref().map(|a| a.tool_name.as_str())
    }
}

/// Post-execution evaluation of a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeEvaluation {
    pub completeness: f64,
    pub relevance: f64,
    pub quality: f64,
    pub should_continue: bool,
}

/// Outcome of a tree search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToTResult {
    /// Ordered nodes root → leaf
    pub best_path: Vec<TreeNode>,
    /// Every popped node, in exploration order
    pub explored_nodes: Vec<TreeNode>,
    /// The best leaf's accumulated evidence
    pub collected_documents: Vec<Document>,
    pub final_completeness: f64,
    pub iterations: u32,
    pub tools_used: BTreeSet<String>,
    pub total_time_ms: f64,
    pub model_usage: TierUsage,
}

/// Id-keyed store of nodes created during one search.
///
/// Keeps the back-references needed to trace a root-to-leaf path in
/// O(depth); cycles are broken with a visited set.
#[derive(Debug, Default)]
pub struct NodeIndex {
    nodes: HashMap<NodeId, TreeNode>,
}

impl NodeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node: TreeNode) {
        self.nodes.insert(node.id.clone(), node);
    }

    pub fn get(&self, id: &NodeId) -> Option<&TreeNode> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: &NodeId) -> Option<&mut TreeNode> {
        self.nodes.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Trace the path from the root to `leaf`, in root-first order.
    pub fn trace_path(&self, leaf: &NodeId) -> Vec<TreeNode> {
        let mut path = Vec::new();
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut current = Some(leaf.clone());

        while let Some(id) = current {
            if !visited.insert(id.clone()) {
                tracing::warn!(node = %id, "cycle detected while tracing path");
                break;
            }
            match self.nodes.get(&id) {
                Some(node) => {
                    path.push(node.clone());
                    current = node.parent_id.clone();
                }
                None => break,
            }
        }

        path.reverse();
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_inherits_depth_and_documents() {
        let mut root = TreeNode::root("query");
        root.collected_info.push(Document::new("chunk one about sorting", "rag"));

        let child = TreeNode::child_of(&root);
        assert_eq!(child.depth, root.depth + 1);
        assert_eq!(child.parent_id, Some(root.id.clone()));
        assert_eq!(child.collected_info, root.collected_info);
    }

    #[test]
    fn test_trace_path_full_chain() {
        let mut index = NodeIndex::new();
        let root = TreeNode::root("q");
        let child = TreeNode::child_of(&root);
        let grandchild = TreeNode::child_of(&child);
        let leaf_id = grandchild.id.clone();

        index.insert(root);
        index.insert(child);
        index.insert(grandchild);

        let path = index.trace_path(&leaf_id);
        assert_eq!(path.len(), 3);
        assert_eq!(path[0].id, NodeId::root());
        assert_eq!(path[2].id, leaf_id);
        assert!(path.windows(2).all(|w| w[1].depth == w[0].depth + 1));
    }

    #[test]
    fn test_trace_path_breaks_cycles() {
        let mut index = NodeIndex::new();
        let mut root = TreeNode::root("q");
        let mut child = TreeNode::child_of(&root);
        // Corrupt the tree into a cycle.
        root.parent_id = Some(child.id.clone());
        child.parent_id = Some(NodeId::root());
        let leaf_id = child.id.clone();

        index.insert(root);
        index.insert(child);

        let path = index.trace_path(&leaf_id);
        assert_eq!(path.len(), 2);
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = NodeId::generate();
        let b = NodeId::generate();
        assert_ne!(a, b);
        assert!(a.0.starts_with("node_"));
    }
}
