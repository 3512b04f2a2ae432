//! Model layer: tiered clients and task-aware routing.

pub mod client;
pub mod router;
pub mod types;

pub use client::{ChatClient, ChatClientConfig, ModelClient};
pub use router::ModelRouter;
pub use types::{CompletionRequest, CompletionResponse, ModelTier, TaskKind, TierUsage};
