//! Model client trait and the OpenAI-compatible chat implementation.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::types::{CompletionRequest, CompletionResponse};

/// A model endpoint callers can invoke with a prompt and a timeout.
///
/// Semantics: transport and 5xx failures after the client's retries
/// surface as [`Error::ModelUnavailable`]; an elapsed deadline surfaces
/// as [`Error::Timeout`]; otherwise the raw textual response is
/// returned.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Complete a prompt.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Identifier of the configured model, for logs and errors.
    fn model_id(&self) -> &str;
}

/// Configuration for the OpenAI-compatible chat client.
#[derive(Debug, Clone)]
pub struct ChatClientConfig {
    /// API key sent as a bearer token
    pub api_key: String,
    /// Endpoint base URL
    pub base_url: String,
    /// Model identifier
    pub model: String,
    /// Default sampling temperature
    pub temperature: f64,
    /// Default per-call timeout
    pub timeout: Duration,
    /// Retries on transport/5xx failures
    pub max_retries: u32,
    /// Backoff between retries
    pub retry_backoff: Duration,
}

impl ChatClientConfig {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: model.into(),
            temperature: 0.2,
            timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }
}

/// Client for model endpoints exposing an OpenAI-compatible
/// chat-completions surface.
pub struct ChatClient {
    config: ChatClientConfig,
    http: Client,
}

// Chat-completions wire types
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatError {
    error: ChatErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ChatErrorDetail {
    message: String,
}

impl ChatClient {
    pub fn new(config: ChatClientConfig) -> Self {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_default();
        Self { config, http }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    async fn send_once(
        &self,
        request: &CompletionRequest,
        timeout: Duration,
    ) -> Result<CompletionResponse> {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: request.prompt.clone(),
        });

        let api_request = ChatRequest {
            model: self.config.model.clone(),
            messages,
            temperature: Some(request.temperature.unwrap_or(self.config.temperature)),
            max_tokens: request.max_tokens,
        };

        let started = Instant::now();

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .timeout(timeout)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::timeout(timeout.as_millis() as u64)
                } else {
                    Error::Http(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<ChatError>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| body.chars().take(200).collect());
            if status.is_server_error() || status.as_u16() == 429 {
                return Err(Error::Http(format!("HTTP {status}: {detail}")));
            }
            return Err(Error::model_unavailable(
                &self.config.model,
                format!("HTTP {status}: {detail}"),
            ));
        }

        let api_response: ChatResponse = serde_json::from_str(&body)?;
        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::model_unavailable(&self.config.model, "no choices in response"))?;

        Ok(CompletionResponse {
            content: choice.message.content,
            model: api_response.model.unwrap_or_else(|| self.config.model.clone()),
            elapsed_ms: started.elapsed().as_millis() as f64,
        })
    }
}

#[async_trait]
impl ModelClient for ChatClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let timeout = request.timeout.unwrap_or(self.config.timeout);
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tokio::time::sleep(self.config.retry_backoff).await;
                debug!(model = %self.config.model, attempt, "retrying model call");
            }

            match self.send_once(&request, timeout).await {
                Ok(response) => return Ok(response),
                // Timeouts are not retried; the per-call deadline already elapsed.
                Err(err @ Error::Timeout { .. }) => return Err(err),
                Err(Error::Http(message)) => {
                    warn!(model = %self.config.model, attempt, %message, "transient model failure");
                    last_error = Some(message);
                }
                Err(other) => return Err(other),
            }
        }

        Err(Error::model_unavailable(
            &self.config.model,
            last_error.unwrap_or_else(|| "retries exhausted".to_string()),
        ))
    }

    fn model_id(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ChatClientConfig::new("key", "https://llm.internal/v1", "big-model")
            .with_temperature(0.0)
            .with_timeout(Duration::from_secs(60))
            .with_max_retries(1);
        assert_eq!(config.temperature, 0.0);
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.max_retries, 1);
    }

    #[test]
    fn test_endpoint_join() {
        let client = ChatClient::new(ChatClientConfig::new("k", "https://llm.internal/v1/", "m"));
        assert_eq!(client.endpoint(), "https://llm.internal/v1/chat/completions");
    }

    #[test]
    fn test_response_parsing_shape() {
        let body = r#"{"model":"big-model","choices":[{"message":{"role":"assistant","content":"hello"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content, "hello");
    }
}
