//! High-throughput serving-engine client with OpenAI-compatible API support
//!
//! Prompts are formatted with the model family's chat template locally and
//! submitted to the engine's raw `/v1/completions` endpoint as a batch, so
//! batching, scheduling and KV-cache management stay inside the engine. The
//! first completion per prompt is returned, in input order.
//!
//! # Quick start
//!
//! 1. Install vLLM:
//!    ```bash
//!    pip install vllm
//!    ```
//!
//! 2. Start the server with the GPU-memory fraction the engine may claim:
//!    ```bash
//!    python -m vllm.entrypoints.openai.api_server \
//!        --model meta-llama/Llama-2-7b-chat-hf \
//!        --host 0.0.0.0 \
//!        --port 8000 \
//!        --gpu-memory-utilization 0.98
//!    ```
//!
//! 3. Point the client at it:
//!    ```rust,no_run
//!    # use promptforge::{VllmBackend, VllmConfig};
//!    let config = VllmConfig::new("http://localhost:8000", "meta-llama/Llama-2-7b-chat-hf");
//!    let backend = VllmBackend::new(config)?;
//!    # Ok::<(), promptforge::Error>(())
//!    ```
//!
//! Engine failures are surfaced as provider errors rather than masked:
//! unlike the hosted backends, a broken local server needs operator
//! attention, not silent blanks.

use crate::backend::TextGenerator;
use crate::config::GenerationParams;
use crate::error::{Error, Result};
use crate::templates::{get_templates, TemplateKind};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the serving-engine client
#[derive(Debug, Clone)]
pub struct VllmConfig {
    /// Base URL of the server (e.g. "http://localhost:8000")
    pub base_url: String,
    /// Model identifier served by the engine; also selects the chat
    /// template used to format prompts
    pub model: String,
    /// Optional API key (for secured deployments)
    pub api_key: Option<String>,
    /// Request timeout
    pub timeout: Duration,
    /// Sampling parameters
    pub params: GenerationParams,
}

impl VllmConfig {
    /// Create a configuration
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: None,
            timeout: Duration::from_secs(300),
            params: GenerationParams::default(),
        }
    }

    /// Create a configuration from environment variables
    pub fn from_env(model: impl Into<String>) -> Self {
        let base_url =
            std::env::var("VLLM_BASE_URL").unwrap_or_else(|_| "http://localhost:8000".to_string());
        let api_key = std::env::var("VLLM_API_KEY").ok();
        Self {
            api_key,
            ..Self::new(base_url, model)
        }
    }

    /// Set the API key
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the sampling parameters
    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: Vec<String>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    index: usize,
    text: String,
}

/// Serving-engine generation backend
pub struct VllmBackend {
    client: Client,
    config: VllmConfig,
}

impl VllmBackend {
    /// Create a backend with the given configuration
    pub fn new(config: VllmConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// Get the configuration
    pub fn config(&self) -> &VllmConfig {
        &self.config
    }

    /// Check if the server is reachable
    pub async fn health_check(&self) -> Result<()> {
        let url = format!("{}/health", self.config.base_url);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(Error::provider(format!(
                "Health check failed: {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Format each prompt with the model family's chat template
    fn format_prompts(&self, prompts: &[String]) -> Result<Vec<String>> {
        let template = get_templates(&self.config.model, TemplateKind::Chat)?;
        Ok(prompts
            .iter()
            .map(|prompt| template.render(prompt))
            .collect())
    }

    async fn complete_batch(&self, formatted: Vec<String>) -> Result<Vec<String>> {
        let expected = formatted.len();
        let url = format!("{}/v1/completions", self.config.base_url);
        let request = CompletionRequest {
            model: &self.config.model,
            prompt: formatted,
            temperature: self.config.params.temperature,
            max_tokens: self.config.params.max_tokens,
        };

        let mut http_request = self.client.post(&url).json(&request);
        if let Some(ref api_key) = self.config.api_key {
            http_request = http_request.header("Authorization", format!("Bearer {api_key}"));
        }

        let response = http_request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::provider(format!(
                "Engine request failed with status {status}: {error_text}"
            )));
        }

        let body = response.text().await?;
        let completion: CompletionResponse = serde_json::from_str(&body)?;

        // First completion per prompt, restored to input order via the
        // choice index.
        let mut outputs = vec![None; expected];
        for choice in completion.choices {
            if let Some(slot) = outputs.get_mut(choice.index) {
                if slot.is_none() {
                    *slot = Some(choice.text);
                }
            }
        }
        outputs
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| Error::provider("Engine returned fewer completions than prompts"))
    }
}

#[async_trait]
impl TextGenerator for VllmBackend {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let formatted = self.format_prompts(&[prompt.to_string()])?;
        let mut outputs = self.complete_batch(formatted).await?;
        outputs
            .pop()
            .ok_or_else(|| Error::provider("Engine returned no completion"))
    }

    async fn generate_batch(&self, prompts: &[String]) -> Result<Vec<String>> {
        if prompts.is_empty() {
            return Ok(Vec::new());
        }
        let formatted = self.format_prompts(prompts)?;
        self.complete_batch(formatted).await
    }

    fn name(&self) -> &str {
        "vllm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = VllmConfig::new("http://localhost:9000/", "lmsys/vicuna-7b-v1.5")
            .with_timeout(Duration::from_secs(60))
            .with_api_key("token");
        assert_eq!(config.base_url, "http://localhost:9000");
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.api_key, Some("token".to_string()));
    }

    #[test]
    fn test_format_prompts_uses_chat_template() {
        let backend =
            VllmBackend::new(VllmConfig::new("http://localhost:8000", "lmsys/vicuna-7b-v1.5"))
                .unwrap();
        let formatted = backend
            .format_prompts(&["Tell me a joke".to_string()])
            .unwrap();
        assert!(formatted[0].contains("USER: Tell me a joke ASSISTANT:"));
    }

    #[test]
    fn test_unknown_model_is_config_error() {
        let backend =
            VllmBackend::new(VllmConfig::new("http://localhost:8000", "unknown-model")).unwrap();
        assert!(matches!(
            backend.format_prompts(&["hi".to_string()]),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_batch_restores_input_order() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"choices":[{"index":1,"text":"second"},{"index":0,"text":"first"}]}"#,
            )
            .create_async()
            .await;

        let backend =
            VllmBackend::new(VllmConfig::new(server.url(), "lmsys/vicuna-7b-v1.5")).unwrap();
        let prompts = vec!["a".to_string(), "b".to_string()];
        let results = backend.generate_batch(&prompts).await.unwrap();
        assert_eq!(results, vec!["first".to_string(), "second".to_string()]);
    }

    #[tokio::test]
    async fn test_engine_error_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/completions")
            .with_status(500)
            .create_async()
            .await;

        let backend =
            VllmBackend::new(VllmConfig::new(server.url(), "lmsys/vicuna-7b-v1.5")).unwrap();
        assert!(backend.generate("hi").await.is_err());
    }
}
