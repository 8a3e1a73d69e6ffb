//! Anthropic text-completions backend
//!
//! Uses the legacy text-completion framing (`\n\nHuman: ...\n\nAssistant:`)
//! rather than the messages API, matching the prompt format the rest of the
//! toolkit reconstructs for Claude-family models. Retry behavior mirrors the
//! other hosted backends: transient failures are logged and retried, and
//! exhaustion yields a single-space placeholder. Batch calls run
//! sequentially, one prompt at a time.

use crate::backend::TextGenerator;
use crate::config::{GenerationParams, RetryPolicy, BLANK_COMPLETION};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Human turn marker for the legacy completion prompt format
pub const HUMAN_PROMPT: &str = "\n\nHuman:";
/// Assistant turn marker for the legacy completion prompt format
pub const AI_PROMPT: &str = "\n\nAssistant:";

/// Expected length of an Anthropic API key
const API_KEY_LEN: usize = 108;

/// Configuration for the Anthropic backend
#[derive(Clone)]
pub struct AnthropicConfig {
    /// API key; must be exactly 108 characters
    api_key: SecretString,
    /// Model identifier (e.g. "claude-instant-1.2")
    pub model: String,
    /// Base URL without the endpoint path
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Retry behavior for transient failures
    pub retry: RetryPolicy,
    /// Sampling parameters
    pub params: GenerationParams,
}

impl AnthropicConfig {
    /// Create a configuration, validating the API key format
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.len() != API_KEY_LEN {
            return Err(Error::config("invalid Anthropic API key"));
        }
        Ok(Self {
            api_key: SecretString::from(api_key),
            model: model.into(),
            base_url: "https://api.anthropic.com".to_string(),
            timeout: Duration::from_secs(120),
            retry: RetryPolicy::single_attempt(),
            params: GenerationParams::default(),
        })
    }

    /// Create a configuration from the `ANTHROPIC_API_KEY` environment variable
    pub fn from_env(model: impl Into<String>) -> Result<Self> {
        let _ = dotenvy::dotenv();
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| Error::config("ANTHROPIC_API_KEY environment variable not set"))?;
        Self::new(api_key, model)
    }

    /// Override the base URL (for proxies or tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the sampling parameters
    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    /// Get the API key
    pub(crate) fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }
}

impl std::fmt::Debug for AnthropicConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicConfig")
            .field("api_key", &"***REDACTED***")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("params", &self.params)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct CompleteRequest<'a> {
    model: &'a str,
    prompt: String,
    max_tokens_to_sample: u32,
}

#[derive(Debug, Deserialize)]
struct CompleteResponse {
    completion: String,
}

/// Anthropic generation backend
pub struct AnthropicBackend {
    client: Client,
    config: AnthropicConfig,
}

impl AnthropicBackend {
    /// Create a backend with the given configuration
    pub fn new(config: AnthropicConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// Create a backend from environment variables
    pub fn from_env(model: impl Into<String>) -> Result<Self> {
        Self::new(AnthropicConfig::from_env(model)?)
    }

    /// Get the configuration
    pub fn config(&self) -> &AnthropicConfig {
        &self.config
    }

    async fn try_complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/v1/complete", self.config.base_url);
        let request = CompleteRequest {
            model: &self.config.model,
            prompt: format!("{HUMAN_PROMPT} {prompt}{AI_PROMPT}"),
            max_tokens_to_sample: self.config.params.max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.config.api_key())
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::provider(format!(
                "Request failed with status {status}: {error_text}"
            )));
        }

        let body = response.text().await?;
        let completion: CompleteResponse = serde_json::from_str(&body)?;
        Ok(completion.completion)
    }
}

#[async_trait]
impl TextGenerator for AnthropicBackend {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let max_attempts = self.config.retry.max_attempts;
        for attempt in 1..=max_attempts {
            match self.try_complete(prompt).await {
                Ok(text) => return Ok(text),
                Err(error) => {
                    warn!(
                        %error,
                        attempt,
                        max_attempts,
                        "Claude API call failed, retrying"
                    );
                    tokio::time::sleep(self.config.retry.backoff).await;
                }
            }
        }
        Ok(BLANK_COMPLETION.to_string())
    }

    async fn generate_batch(&self, prompts: &[String]) -> Result<Vec<String>> {
        let mut results = Vec::with_capacity(prompts.len());
        for prompt in prompts {
            results.push(self.generate(prompt).await?);
        }
        Ok(results)
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> String {
        "a".repeat(API_KEY_LEN)
    }

    fn test_config(base_url: &str) -> AnthropicConfig {
        AnthropicConfig::new(test_key(), "claude-instant-1.2")
            .unwrap()
            .with_base_url(base_url)
            .with_retry(RetryPolicy::new(1, Duration::ZERO))
    }

    #[test]
    fn test_rejects_malformed_key() {
        assert!(matches!(
            AnthropicConfig::new("too-short", "claude-instant-1.2"),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_generate_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/complete")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"completion":" Hello!","stop_reason":"stop_sequence"}"#)
            .create_async()
            .await;

        let backend = AnthropicBackend::new(test_config(&server.url())).unwrap();
        assert_eq!(backend.generate("hi").await.unwrap(), " Hello!");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_retry_exhaustion_returns_blank() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/complete")
            .with_status(529)
            .expect(1)
            .create_async()
            .await;

        let backend = AnthropicBackend::new(test_config(&server.url())).unwrap();
        assert_eq!(backend.generate("hi").await.unwrap(), " ");
    }

    #[tokio::test]
    async fn test_batch_preserves_length_and_order() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/complete")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"completion":"ok"}"#)
            .expect(2)
            .create_async()
            .await;

        let backend = AnthropicBackend::new(test_config(&server.url())).unwrap();
        let prompts = vec!["a".to_string(), "b".to_string()];
        let results = backend.generate_batch(&prompts).await.unwrap();
        assert_eq!(results, vec!["ok".to_string(), "ok".to_string()]);
    }
}
