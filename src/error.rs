//! Error types for tot-core.

use thiserror::Error;

/// Result type alias using tot-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during a research pipeline run.
///
/// Per-tool and per-model-call failures are recovered locally through
/// fallback chains and never reach the caller; only input validation
/// failures and an unrecoverable search surface from the public API.
#[derive(Error, Debug)]
pub enum Error {
    /// User input failed validation (length, relevance, garbage input)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// User input matched a known prompt-injection pattern
    #[error("prompt injection detected: {pattern}")]
    PromptInjection { pattern: String },

    /// Model endpoint unreachable after retries (primary and fallback)
    #[error("model unavailable: {model} - {message}")]
    ModelUnavailable { model: String, message: String },

    /// Deadline elapsed
    #[error("operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Tool invocation failed; recorded on the node, never surfaced directly
    #[error("tool execution error: {tool} - {message}")]
    ToolExecution { tool: String, message: String },

    /// Content Guard removed every document from a tool result
    #[error("content guard filtered all {count} documents")]
    ContentGuardAllFiltered { count: usize },

    /// Memory operations proceeded with the in-process fallback
    #[error("memory degraded: {0}")]
    MemoryDegraded(String),

    /// The search could not produce even a best-effort solution
    #[error("search failed: {0}")]
    SearchFailed(String),

    /// Relational or vector storage error
    #[error("storage error: {0}")]
    Storage(String),

    /// HTTP transport error
    #[error("http error: {0}")]
    Http(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a model-unavailable error.
    pub fn model_unavailable(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ModelUnavailable {
            model: model.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create a tool execution error.
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create a prompt injection error for a matched pattern.
    pub fn injection(pattern: impl Into<String>) -> Self {
        Self::PromptInjection {
            pattern: pattern.into(),
        }
    }

    /// Whether a retry may succeed (transient transport/storage failures).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ModelUnavailable { .. } | Self::Http(_) | Self::Storage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::model_unavailable("cheap-tier", "connection refused");
        assert_eq!(
            err.to_string(),
            "model unavailable: cheap-tier - connection refused"
        );

        let err = Error::injection("ignore previous");
        assert_eq!(err.to_string(), "prompt injection detected: ignore previous");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Error::Http("503".into()).is_retryable());
        assert!(Error::model_unavailable("m", "x").is_retryable());
        assert!(!Error::InvalidInput("too short".into()).is_retryable());
        assert!(!Error::timeout(5000).is_retryable());
    }
}
