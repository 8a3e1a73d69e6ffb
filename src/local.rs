//! In-process inference over quantized GGUF weights
//!
//! Loads a quantized llama-architecture model and its tokenizer from
//! explicit paths and decodes greedily on the selected device. Prompts are
//! formatted with the model family's chat template before encoding, and
//! only newly generated tokens are decoded, so the input prefix never
//! appears in the output. The model sits behind a mutex and batched
//! generation takes it one sub-batch at a time, so `batch_size` bounds how
//! long a single batch can monopolize the weights.

use crate::backend::TextGenerator;
use crate::config::GenerationParams;
use crate::error::{Error, Result};
use crate::templates::{get_eos, get_templates, TemplateKind};
use async_trait::async_trait;
use candle_core::quantized::gguf_file;
use candle_core::{Device, Tensor};
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::quantized_llama::ModelWeights;
use std::path::PathBuf;
use tokenizers::Tokenizer;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Fixed seed; irrelevant under greedy decoding but required by the sampler
const SAMPLER_SEED: u64 = 299792458;

/// How many recent tokens the repetition penalty looks back over
const REPEAT_LAST_N: usize = 64;

/// Configuration for the local transformer backend
#[derive(Debug, Clone)]
pub struct LocalConfig {
    /// Model identifier used for template and EOS lookup
    /// (e.g. "meta-llama/Llama-2-7b-chat-hf")
    pub model_id: String,
    /// Path to the GGUF weights file
    pub weights_path: PathBuf,
    /// Path to the tokenizer.json file
    pub tokenizer_path: PathBuf,
    /// Sampling parameters
    pub params: GenerationParams,
    /// How many prompts a batch decodes per model-lock acquisition
    pub batch_size: usize,
}

impl LocalConfig {
    /// Create a configuration
    pub fn new(
        model_id: impl Into<String>,
        weights_path: impl Into<PathBuf>,
        tokenizer_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            weights_path: weights_path.into(),
            tokenizer_path: tokenizer_path.into(),
            params: GenerationParams::default(),
            batch_size: 16,
        }
    }

    /// Set the sampling parameters
    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    /// Set the sub-batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

/// Local transformer generation backend
pub struct LocalBackend {
    model: Mutex<ModelWeights>,
    tokenizer: Tokenizer,
    device: Device,
    eos_token_id: u32,
    config: LocalConfig,
}

impl LocalBackend {
    /// Load the model and tokenizer from the configured paths
    ///
    /// Fails with a configuration error when the model family is unknown
    /// or the tokenizer does not define the family's EOS token.
    pub fn load(config: LocalConfig) -> Result<Self> {
        // Resolve the family up front so an unknown identifier fails here,
        // not mid-generation.
        let eos = get_eos(&config.model_id)?;
        get_templates(&config.model_id, TemplateKind::Chat)?;

        let tokenizer = Tokenizer::from_file(&config.tokenizer_path)
            .map_err(|e| Error::tokenizer(format!("Failed to load tokenizer: {e}")))?;
        let eos_token_id = tokenizer.token_to_id(eos).ok_or_else(|| {
            Error::config(format!(
                "Tokenizer for {} does not define eos token {eos:?}",
                config.model_id
            ))
        })?;

        let device = Self::create_device()?;

        info!(model = %config.model_id, path = %config.weights_path.display(), "Loading GGUF model");
        let mut file = std::fs::File::open(&config.weights_path)?;
        let content = gguf_file::Content::read(&mut file)?;
        let model = ModelWeights::from_gguf(content, &mut file, &device)?;
        info!(model = %config.model_id, "Model loaded");

        Ok(Self {
            model: Mutex::new(model),
            tokenizer,
            device,
            eos_token_id,
            config,
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &LocalConfig {
        &self.config
    }

    /// Select the compute device based on enabled cargo features
    fn create_device() -> Result<Device> {
        #[cfg(feature = "cuda")]
        {
            return Ok(Device::new_cuda(0)?);
        }
        #[cfg(feature = "metal")]
        {
            return Ok(Device::new_metal(0)?);
        }
        #[allow(unreachable_code)]
        Ok(Device::Cpu)
    }

    /// Greedy-decode one formatted prompt, returning only generated text
    ///
    /// The caller holds the model lock; batched generation acquires it
    /// once per sub-batch so concurrent callers interleave at sub-batch
    /// boundaries.
    fn decode(&self, model: &mut ModelWeights, formatted: &str) -> Result<String> {
        let encoding = self
            .tokenizer
            .encode(formatted, true)
            .map_err(|e| Error::tokenizer(format!("Encoding failed: {e}")))?;
        let input_ids: Vec<u32> = encoding.get_ids().to_vec();
        debug!(input_tokens = input_ids.len(), "decoding prompt");

        let temperature = f64::from(self.config.params.temperature);
        // Near-zero temperature means argmax decoding.
        let temperature = (temperature > 1e-3).then_some(temperature);
        let mut logits_processor = LogitsProcessor::new(SAMPLER_SEED, temperature, None);

        let penalty = self.config.params.repetition_penalty;
        let mut generated: Vec<u32> = Vec::new();

        for step in 0..self.config.params.max_tokens as usize {
            let (context, index_pos) = if step == 0 {
                (input_ids.as_slice(), 0)
            } else {
                (
                    &generated[generated.len() - 1..],
                    input_ids.len() + step - 1,
                )
            };
            let input = Tensor::new(context, &self.device)?.unsqueeze(0)?;
            let logits = model.forward(&input, index_pos)?.squeeze(0)?;

            let logits = if penalty == 1.0 {
                logits
            } else {
                let start = generated.len().saturating_sub(REPEAT_LAST_N);
                candle_transformers::utils::apply_repeat_penalty(
                    &logits,
                    penalty,
                    &generated[start..],
                )?
            };

            let next_token = logits_processor.sample(&logits)?;
            if next_token == self.eos_token_id {
                break;
            }
            generated.push(next_token);
        }

        debug!(generated_tokens = generated.len(), "decode finished");
        self.tokenizer
            .decode(&generated, true)
            .map_err(|e| Error::tokenizer(format!("Decoding failed: {e}")))
    }
}

/// Render a single user turn with the family's chat template
fn render_chat(model_id: &str, prompt: &str) -> Result<String> {
    Ok(get_templates(model_id, TemplateKind::Chat)?.render(prompt))
}

#[async_trait]
impl TextGenerator for LocalBackend {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let formatted = render_chat(&self.config.model_id, prompt)?;
        let mut model = self.model.lock().await;
        self.decode(&mut model, &formatted)
    }

    async fn generate_batch(&self, prompts: &[String]) -> Result<Vec<String>> {
        let mut outputs = Vec::with_capacity(prompts.len());
        for chunk in prompts.chunks(self.config.batch_size) {
            debug!(sub_batch = chunk.len(), "decoding sub-batch");
            // Lock per sub-batch, not per batch: other callers get a turn
            // at the model every `batch_size` prompts.
            let mut model = self.model.lock().await;
            for prompt in chunk {
                let formatted = render_chat(&self.config.model_id, prompt)?;
                outputs.push(self.decode(&mut model, &formatted)?);
            }
        }
        Ok(outputs)
    }

    fn name(&self) -> &str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = LocalConfig::new(
            "meta-llama/Llama-2-7b-chat-hf",
            "/models/llama-2-7b-chat.Q4_K_M.gguf",
            "/models/tokenizer.json",
        );
        assert_eq!(config.batch_size, 16);
        assert_eq!(config.params.max_tokens, 512);
    }

    #[test]
    fn test_batch_size_floor() {
        let config = LocalConfig::new("x/Llama-2", "/w.gguf", "/t.json").with_batch_size(0);
        assert_eq!(config.batch_size, 1);
    }

    #[test]
    fn test_batch_size_sets_sub_batch_boundaries() {
        let config = LocalConfig::new("x/Llama-2", "/w.gguf", "/t.json").with_batch_size(4);
        let prompts: Vec<String> = (0..10).map(|i| i.to_string()).collect();
        let sizes: Vec<usize> = prompts.chunks(config.batch_size).map(<[String]>::len).collect();
        // One lock acquisition per sub-batch in generate_batch.
        assert_eq!(sizes, [4, 4, 2]);
    }

    #[test]
    fn test_render_chat_llama2() {
        let formatted = render_chat("meta-llama/Llama-2-7b-chat-hf", "Hello").unwrap();
        assert!(formatted.starts_with("[INST] <<SYS>>\n"));
        assert!(formatted.ends_with("Hello [/INST] "));
    }

    #[test]
    fn test_render_chat_unknown_model() {
        assert!(matches!(
            render_chat("bigscience/bloom-7b1", "Hello"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_load_missing_weights_fails() {
        let config = LocalConfig::new(
            "meta-llama/Llama-2-7b-chat-hf",
            "/nonexistent/weights.gguf",
            "/nonexistent/tokenizer.json",
        );
        assert!(LocalBackend::load(config).is_err());
    }
}
