//! Unified generation trait implemented by every backend variant

use crate::error::Result;
use async_trait::async_trait;

/// Unified trait for text-generation backends (local and hosted)
///
/// Implementations differ in failure behavior: local variants propagate
/// errors, while hosted variants mask retry exhaustion as single-space
/// placeholder output (see the per-module docs).
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for a single prompt
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate completions for a batch of prompts
    ///
    /// The result length always equals the input length times the
    /// configured completions-per-prompt `n` (1 for every backend except
    /// the OpenAI-compatible one). Hosted variants fan prompts out
    /// concurrently and collect results in completion order, not
    /// submission order.
    async fn generate_batch(&self, prompts: &[String]) -> Result<Vec<String>>;

    /// Backend name for logging
    fn name(&self) -> &str;
}
