//! Policy compliance stage.

use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

use crate::config::ContentGuardConfig;
use crate::llm::{CompletionRequest, ModelRouter, TaskKind};
use crate::prompts;

/// Policy verdict for a single document.
#[derive(Debug, Clone)]
pub struct PolicyVerdict {
    pub compliant: bool,
    pub violations: Vec<String>,
    /// Zero confidence marks a fail-open verdict needing manual review
    pub confidence: f64,
}

pub struct PolicyChecker {
    router: Arc<ModelRouter>,
    config: ContentGuardConfig,
}

impl PolicyChecker {
    pub fn new(router: Arc<ModelRouter>, config: ContentGuardConfig) -> Self {
        Self { router, config }
    }

    /// Check one document.
    ///
    /// When the model is unreachable the document is assumed compliant
    /// with zero confidence — the pipeline must never silently drop
    /// everything because the policy model is down. Returns whether a
    /// model call succeeded for cost attribution.
    pub async fn check(&self, content: &str) -> (PolicyVerdict, bool) {
        if !self.config.policy_check_enabled {
            return (
                PolicyVerdict {
                    compliant: true,
                    violations: Vec::new(),
                    confidence: 1.0,
                },
                false,
            );
        }

        let snippet: String = content.chars().take(2000).collect();
        let model = self.router.model_for(TaskKind::PolicyCheck);
        let request = CompletionRequest::new(prompts::policy_check(&snippet))
            .with_timeout(std::time::Duration::from_secs(self.config.policy_timeout_s));

        match model.complete(request).await {
            Ok(response) => match crate::chains::parsers::extract_json(&response.content) {
                Some(parsed) => (
                    PolicyVerdict {
                        compliant: parsed
                            .get("compliant")
                            .and_then(Value::as_bool)
                            .unwrap_or(true),
                        violations: parsed
                            .get("violations")
                            .and_then(Value::as_array)
                            .map(|items| {
                                items
                                    .iter()
                                    .filter_map(Value::as_str)
                                    .map(str::to_string)
                                    .collect()
                            })
                            .unwrap_or_default(),
                        confidence: parsed
                            .get("confidence")
                            .and_then(Value::as_f64)
                            .unwrap_or(0.95)
                            .clamp(0.0, 1.0),
                    },
                    true,
                ),
                None => {
                    warn!("unparsable policy response, assuming compliant (review needed)");
                    (fail_open(), true)
                }
            },
            Err(e) => {
                warn!(error = %e, "policy check failed, assuming compliant (review needed)");
                (fail_open(), false)
            }
        }
    }
}

fn fail_open() -> PolicyVerdict {
    PolicyVerdict {
        compliant: true,
        violations: Vec::new(),
        confidence: 0.0,
    }
}
