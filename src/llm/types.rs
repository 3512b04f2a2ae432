//! Model tiers, task kinds and the completion request/response types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cost tier of a model endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    /// High-capability, high-cost; thought generation and final synthesis only
    Expensive,
    /// Fast and cheap; every evaluation and filtering task
    Cheap,
}

impl std::fmt::Display for ModelTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Expensive => write!(f, "expensive"),
            Self::Cheap => write!(f, "cheap"),
        }
    }
}

/// Named model uses across the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    ThoughtGeneration,
    PromiseEvaluation,
    NodeEvaluation,
    RelevanceScoring,
    PolicyCheck,
    ToxicityCheck,
    InputValidation,
    FinalSynthesis,
}

impl TaskKind {
    /// Static task-to-tier partition.
    pub fn tier(&self) -> ModelTier {
        match self {
            Self::ThoughtGeneration | Self::FinalSynthesis => ModelTier::Expensive,
            _ => ModelTier::Cheap,
        }
    }
}

/// A completion request against a model endpoint.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// User prompt text
    pub prompt: String,
    /// Optional system prompt
    pub system: Option<String>,
    /// Sampling temperature override
    pub temperature: Option<f64>,
    /// Output token cap
    pub max_tokens: Option<u32>,
    /// Per-call deadline override
    pub timeout: Option<Duration>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            temperature: None,
            max_tokens: None,
            timeout: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Raw textual completion from a model endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Response text
    pub content: String,
    /// Model that produced the response
    pub model: String,
    /// Wall time of the call in milliseconds
    pub elapsed_ms: f64,
}

/// Model-call counters keyed by tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierUsage {
    pub expensive: u64,
    pub cheap: u64,
}

impl TierUsage {
    /// Record one call on a tier.
    pub fn record(&mut self, tier: ModelTier) {
        match tier {
            ModelTier::Expensive => self.expensive += 1,
            ModelTier::Cheap => self.cheap += 1,
        }
    }

    /// Add N calls on a tier.
    pub fn record_many(&mut self, tier: ModelTier, count: u64) {
        match tier {
            ModelTier::Expensive => self.expensive += count,
            ModelTier::Cheap => self.cheap += count,
        }
    }

    /// Merge another counter into this one.
    pub fn merge(&mut self, other: &TierUsage) {
        self.expensive += other.expensive;
        self.cheap += other.cheap;
    }

    /// Total calls across tiers.
    pub fn total(&self) -> u64 {
        self.expensive + self.cheap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_tier_partition() {
        assert_eq!(TaskKind::ThoughtGeneration.tier(), ModelTier::Expensive);
        assert_eq!(TaskKind::FinalSynthesis.tier(), ModelTier::Expensive);
        assert_eq!(TaskKind::PromiseEvaluation.tier(), ModelTier::Cheap);
        assert_eq!(TaskKind::NodeEvaluation.tier(), ModelTier::Cheap);
        assert_eq!(TaskKind::RelevanceScoring.tier(), ModelTier::Cheap);
        assert_eq!(TaskKind::PolicyCheck.tier(), ModelTier::Cheap);
        assert_eq!(TaskKind::ToxicityCheck.tier(), ModelTier::Cheap);
        assert_eq!(TaskKind::InputValidation.tier(), ModelTier::Cheap);
    }

    #[test]
    fn test_tier_usage_merge() {
        let mut a = TierUsage::default();
        a.record(ModelTier::Expensive);
        a.record(ModelTier::Cheap);
        a.record(ModelTier::Cheap);

        let mut b = TierUsage::default();
        b.record_many(ModelTier::Cheap, 3);
        a.merge(&b);

        assert_eq!(a.expensive, 1);
        assert_eq!(a.cheap, 5);
        assert_eq!(a.total(), 6);
    }

    #[test]
    fn test_completion_request_builder() {
        let req = CompletionRequest::new("prompt")
            .with_system("system")
            .with_temperature(0.2)
            .with_max_tokens(512)
            .with_timeout(Duration::from_secs(5));
        assert_eq!(req.system.as_deref(), Some("system"));
        assert_eq!(req.temperature, Some(0.2));
        assert_eq!(req.max_tokens, Some(512));
        assert_eq!(req.timeout, Some(Duration::from_secs(5)));
    }
}
