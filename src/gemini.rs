//! Gemini generateContent backend
//!
//! Calls the `generateContent` REST endpoint with the API key passed as a
//! query parameter. Configuration is an explicitly passed object; there is
//! no process-global API setup. Retry and fail-soft behavior match the
//! other hosted backends; batch calls fan out concurrently and collect in
//! completion order.

use crate::backend::TextGenerator;
use crate::config::{GenerationParams, RetryPolicy, BLANK_COMPLETION};
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Expected length of a Gemini API key
const API_KEY_LEN: usize = 39;

/// Configuration for the Gemini backend
#[derive(Clone)]
pub struct GeminiConfig {
    /// API key; must be exactly 39 characters
    api_key: SecretString,
    /// Model identifier (e.g. "gemini-pro")
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

impl GeminiConfig {
    /// Create a configuration, validating the API key format
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.len() != API_KEY_LEN {
            return Err(Error::config("invalid Gemini API key"));
        }
        Ok(Self {
            api_key: SecretString::from(api_key),
            model: model.into(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout: Duration::from_secs(120),
            retry: RetryPolicy::single_attempt(),
            params: GenerationParams::default(),
        })
    }

    /// Create a configuration from the `GEMINI_API_KEY` environment variable
    pub fn from_env(model: impl Into<String>) -> Result<Self> {
        let _ = dotenvy::dotenv();
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| Error::config("GEMINI_API_KEY environment variable not set"))?;
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

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
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
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

/// Gemini generation backend
pub struct GeminiBackend {
    client: Client,
    config: GeminiConfig,
}

impl GeminiBackend {
    /// Create a backend with the given configuration
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// Create a backend from environment variables
    pub fn from_env(model: impl Into<String>) -> Result<Self> {
        Self::new(GeminiConfig::from_env(model)?)
    }

    /// Get the configuration
    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    async fn try_complete(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url, self.config.model
        );
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: self.config.params.max_tokens,
                temperature: self.config.params.temperature,
            },
        };

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.config.api_key())])
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
        let completion: GenerateContentResponse = serde_json::from_str(&body)?;
        completion
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content.parts.into_iter().next())
            .map(|part| part.text)
            .ok_or_else(|| Error::provider("Response contained no candidates"))
    }
}

#[async_trait]
impl TextGenerator for GeminiBackend {
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
                        "Gemini API call failed, retrying"
                    );
                    tokio::time::sleep(self.config.retry.backoff).await;
                }
            }
        }
        Ok(BLANK_COMPLETION.to_string())
    }

    async fn generate_batch(&self, prompts: &[String]) -> Result<Vec<String>> {
        let mut pending: FuturesUnordered<_> =
            prompts.iter().map(|prompt| self.generate(prompt)).collect();

        let mut results = Vec::with_capacity(prompts.len());
        while let Some(text) = pending.next().await {
            results.push(text?);
        }
        Ok(results)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}
