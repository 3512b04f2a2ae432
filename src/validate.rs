//! Input validation: length bounds, injection pattern scan and an
//! optional model-assisted check.

use std::sync::Arc;
use tracing::{info, warn};

use crate::chains::parsers::{self, ValidationVerdict};
use crate::config::ValidationConfig;
use crate::error::{Error, Result};
use crate::llm::{CompletionRequest, ModelRouter, TaskKind};
use crate::prompts;

/// Patterns that mark a prompt-injection attempt. Matched
/// case-insensitively as substrings.
const INJECTION_PATTERNS: &[&str] = &[
    "ignore previous",
    "ignore all previous",
    "disregard previous",
    "forget your instructions",
    "reveal system prompt",
    "reveal your instructions",
    "you are now",
    "act as dan",
    "jailbreak",
    "игнорируй предыдущие",
    "забудь инструкции",
    "покажи системный промпт",
];

const SQL_INJECTION_PATTERNS: &[&str] = &[
    "drop table",
    "delete from",
    "insert into",
    "update set",
    "union select",
    "'; --",
    "; --",
    "or 1=1",
    "' or '1'='1",
];

const XSS_PATTERNS: &[&str] = &[
    "<script>",
    "</script>",
    "javascript:",
    "onerror=",
    "onload=",
    "<iframe>",
];

/// Validates user input before any model sees it.
pub struct InputValidator {
    router: Arc<ModelRouter>,
    config: ValidationConfig,
}

impl InputValidator {
    pub fn new(router: Arc<ModelRouter>, config: ValidationConfig) -> Self {
        Self { router, config }
    }

    /// Validate user input.
    ///
    /// Rule-based checks run first and reject without a model call:
    /// length bounds, then the injection pattern scan. The model-
    /// assisted check runs last and fails open when the model is
    /// unreachable.
    pub async fn validate(&self, user_input: &str) -> Result<ValidationVerdict> {
        if !self.config.enabled {
            return Ok(ValidationVerdict {
                is_valid: true,
                reason: "validation disabled".to_string(),
                sanitized_input: user_input.to_string(),
                detected_issues: Vec::new(),
            });
        }

        let length = user_input.chars().count();
        if length < self.config.min_input_length {
            return Err(Error::InvalidInput("input too short".to_string()));
        }
        if length > self.config.max_input_length {
            return Err(Error::InvalidInput("input too long".to_string()));
        }

        let lowered = user_input.to_lowercase();
        for pattern in INJECTION_PATTERNS {
            if lowered.contains(pattern) {
                warn!(pattern, "injection pattern detected");
                return Err(Error::injection(*pattern));
            }
        }
        for pattern in SQL_INJECTION_PATTERNS.iter().chain(XSS_PATTERNS) {
            if lowered.contains(pattern) {
                warn!(pattern, "malicious pattern detected");
                return Err(Error::injection(*pattern));
            }
        }

        match self.validate_with_model(user_input).await {
            Ok(verdict) => {
                if !verdict.is_valid {
                    if verdict
                        .detected_issues
                        .iter()
                        .any(|issue| issue == "prompt_injection")
                    {
                        return Err(Error::injection(verdict.reason));
                    }
                    return Err(Error::InvalidInput(verdict.reason));
                }
                info!("input validated");
                Ok(verdict)
            }
            Err(e) => {
                // Rule-based checks already passed; a flaky validator
                // model must not block the request.
                warn!(error = %e, "model validation unavailable, accepting rule-checked input");
                Ok(ValidationVerdict {
                    is_valid: true,
                    reason: "model validation unavailable".to_string(),
                    sanitized_input: user_input.to_string(),
                    detected_issues: Vec::new(),
                })
            }
        }
    }

    async fn validate_with_model(&self, user_input: &str) -> Result<ValidationVerdict> {
        let model = self.router.model_for(TaskKind::InputValidation);
        let request = CompletionRequest::new(prompts::input_validation(user_input))
            .with_timeout(std::time::Duration::from_secs(self.config.timeout_s));
        let response = model.complete(request).await?;
        Ok(parsers::parse_validation(&response.content))
    }
}
