//! # promptforge
//!
//! A thin adapter layer unifying several LLM backends behind one common
//! interface, plus a registry of per-model chat templates and special
//! tokens used to reconstruct each model family's prompt format for
//! adversarial-prompt research.
//!
//! ## Backends
//!
//! - [`LocalBackend`]: in-process inference over quantized GGUF weights
//! - [`VllmBackend`]: client for a vLLM-style high-throughput server
//! - [`OpenAiBackend`], [`AnthropicBackend`], [`GeminiBackend`]: hosted
//!   provider APIs with bounded-retry, fail-soft semantics
//!
//! All of them implement [`TextGenerator`], so callers pick a variant by
//! configuration and use one interface.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use promptforge::{OpenAiBackend, OpenAiConfig, TextGenerator};
//!
//! #[tokio::main]
//! async fn main() -> promptforge::Result<()> {
//!     let config = OpenAiConfig::from_env("gpt-4o-mini")?;
//!     let backend = OpenAiBackend::new(config)?;
//!     let reply = backend.generate("Say hello.").await?;
//!     println!("{reply}");
//!     Ok(())
//! }
//! ```
//!
//! ## Templates
//!
//! ```rust
//! use promptforge::templates::{get_eos, get_templates, TemplateKind};
//!
//! let template = get_templates("meta-llama/Llama-2-7b-chat-hf", TemplateKind::Chat)?;
//! let prompt = template.render("Write a limerick about borrowing.");
//! assert_eq!(get_eos("meta-llama/Llama-2-7b-chat-hf")?, "</s>");
//! # Ok::<(), promptforge::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod anthropic;
pub mod backend;
pub mod config;
pub mod error;
pub mod gemini;
pub mod local;
pub mod openai;
pub mod templates;
pub mod vllm;

// Re-exports for convenience
pub use anthropic::{AnthropicBackend, AnthropicConfig};
pub use backend::TextGenerator;
pub use config::{GenerationParams, RetryPolicy};
pub use error::{Error, Result};
pub use gemini::{GeminiBackend, GeminiConfig};
pub use local::{LocalBackend, LocalConfig};
pub use openai::{OpenAiBackend, OpenAiConfig};
pub use templates::{ChatTemplate, ModelFamily, TemplateKind};
pub use vllm::{VllmBackend, VllmConfig};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::backend::TextGenerator;
    pub use crate::config::{GenerationParams, RetryPolicy};
    pub use crate::error::{Error, Result};
    pub use crate::templates::{get_end_tokens, get_eos, get_templates, TemplateKind};
}
