//! Task-aware model routing between the two cost tiers.

use std::sync::Arc;
use std::time::Duration;

use super::client::ModelClient;
use super::types::{ModelTier, TaskKind};

/// Routes each named task to one of the two configured endpoints.
///
/// The partition is static: the Expensive tier serves only thought
/// generation and final synthesis, the Cheap tier everything else.
/// Callers supply prompt text and a timeout; credentials and base URLs
/// live in the clients.
pub struct ModelRouter {
    expensive: Arc<dyn ModelClient>,
    cheap: Arc<dyn ModelClient>,
    cheap_timeout: Duration,
    expensive_timeout: Duration,
}

impl ModelRouter {
    pub fn new(expensive: Arc<dyn ModelClient>, cheap: Arc<dyn ModelClient>) -> Self {
        Self {
            expensive,
            cheap,
            cheap_timeout: Duration::from_secs(5),
            expensive_timeout: Duration::from_secs(60),
        }
    }

    /// Override the default per-call timeout of the Cheap tier.
    pub fn with_cheap_timeout(mut self, timeout: Duration) -> Self {
        self.cheap_timeout = timeout;
        self
    }

    /// Override the default per-call timeout of the Expensive tier.
    pub fn with_expensive_timeout(mut self, timeout: Duration) -> Self {
        self.expensive_timeout = timeout;
        self
    }

    /// Tier serving the given task.
    pub fn tier_for(&self, task: TaskKind) -> ModelTier {
        task.tier()
    }

    /// Client serving the given task.
    pub fn model_for(&self, task: TaskKind) -> Arc<dyn ModelClient> {
        match task.tier() {
            ModelTier::Expensive => Arc::clone(&self.expensive),
            ModelTier::Cheap => Arc::clone(&self.cheap),
        }
    }

    /// Default per-call timeout for the given task.
    pub fn timeout_for(&self, task: TaskKind) -> Duration {
        match task.tier() {
            ModelTier::Expensive => self.expensive_timeout,
            ModelTier::Cheap => self.cheap_timeout,
        }
    }

    /// Direct handle to the Cheap-tier client.
    pub fn cheap(&self) -> Arc<dyn ModelClient> {
        Arc::clone(&self.cheap)
    }

    /// Direct handle to the Expensive-tier client.
    pub fn expensive(&self) -> Arc<dyn ModelClient> {
        Arc::clone(&self.expensive)
    }
}
