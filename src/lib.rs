//! # tot-core
//!
//! A research-pipeline orchestration library for open-ended
//! educational queries. Evidence collection is modeled as a best-first
//! tree search over reasoning steps (Tree-of-Thoughts) with
//! cost-aware model routing, per-node pruning, tool fallback chains,
//! a content-filtering subpipeline and two tiers of memory.
//!
//! ## Core Components
//!
//! - **Orchestrator**: the promise-ranked DFS loop over reasoning steps
//! - **Tools**: adaptive RAG, corrective filtering, web search and
//!   scraping, concept extraction, memory lookup
//! - **Content Guard**: toxicity → policy → sanitize → quality
//! - **Memory**: per-session working trace and procedural patterns
//!
//! ## Example
//!
//! ```rust,ignore
//! use tot_core::{ResearchEngine, Settings};
//!
//! let engine = ResearchEngine::builder(Settings::default())
//!     .expensive_model(big_client)
//!     .cheap_model(small_client)
//!     .vector_store(vector)
//!     .build()?;
//!
//! let outcome = engine.generate("быстрая сортировка", "beginner", "user-1").await?;
//! println!("{}", outcome.content);
//! ```

pub mod chains;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod fallback;
pub mod guard;
pub mod llm;
pub mod memory;
pub mod metrics;
pub mod orchestrator;
pub mod prompts;
pub mod retrieval;
pub mod store;
pub mod tools;
pub mod tree;
pub mod validate;

// Re-exports for convenience
pub use chains::{EvaluationChain, ReasoningChain, ScoredOutcome, ValidationVerdict};
pub use config::{
    AdaptiveRagConfig, ContentGuardConfig, CorrectiveConfig, MemoryConfig, SearchConfig,
    Settings, ValidationConfig, WebScraperConfig, WebSearchConfig,
};
pub use document::{CleanDocument, Document};
pub use engine::{EngineBuilder, GenerationOutcome, ResearchEngine};
pub use error::{Error, Result};
pub use fallback::RetryPolicy;
pub use guard::{ContentGuard, ContentGuardReport};
pub use llm::{
    ChatClient, ChatClientConfig, CompletionRequest, CompletionResponse, ModelClient,
    ModelRouter, ModelTier, TaskKind, TierUsage,
};
pub use memory::{MemoryContext, MemoryManager, ProceduralPattern, WorkingMemoryEntry};
pub use metrics::{MetricsCollector, MetricsSnapshot};
pub use orchestrator::ToTOrchestrator;
pub use retrieval::{TfidfIndex, TfidfOptions};
pub use store::{
    Embedder, HashedNgramEmbedder, InMemoryVectorStore, MetadataFilter, RelationalLog,
    VectorStore,
};
pub use tools::{Tool, ToolContext, ToolParams, ToolRegistry, ToolResult};
pub use tree::{NodeEvaluation, NodeId, NodeIndex, NodeStatus, PlannedAction, ToTResult, TreeNode};
pub use validate::InputValidator;
