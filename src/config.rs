//! Shared configuration types for generation backends

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sampling parameters shared by all generation backends
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Temperature for sampling; all backends default to deterministic
    /// (near-zero) decoding
    pub temperature: f32,
    /// Maximum new tokens per completion
    pub max_tokens: u32,
    /// Repetition penalty (1.0 disables it)
    pub repetition_penalty: f32,
    /// Number of completions per prompt (honored by the OpenAI-compatible
    /// backend; others always produce one)
    pub n: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: 512,
            repetition_penalty: 1.0,
            n: 1,
        }
    }
}

impl GenerationParams {
    /// Set the temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the maximum new tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the repetition penalty
    pub fn with_repetition_penalty(mut self, repetition_penalty: f32) -> Self {
        self.repetition_penalty = repetition_penalty;
        self
    }

    /// Set the number of completions per prompt
    pub fn with_n(mut self, n: u32) -> Self {
        self.n = n;
        self
    }
}

/// Bounded retry loop settings for hosted providers
///
/// A failed network call is logged at warn level, the loop sleeps for
/// `backoff`, and the call is retried until `max_attempts` is exhausted.
/// Exhaustion yields a single-space placeholder per requested completion
/// instead of an error (fail-soft).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum attempts per prompt, including the first
    pub max_attempts: u32,
    /// Fixed sleep between attempts
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Create a retry policy
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Default policy for the OpenAI-compatible backend
    pub fn openai() -> Self {
        Self::new(10, Duration::from_secs(5))
    }

    /// Default policy for the Anthropic and Gemini backends
    pub fn single_attempt() -> Self {
        Self::new(1, Duration::from_secs(1))
    }
}

/// The placeholder returned per completion after retry exhaustion
pub(crate) const BLANK_COMPLETION: &str = " ";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_params_defaults() {
        let params = GenerationParams::default();
        assert_eq!(params.temperature, 0.0);
        assert_eq!(params.max_tokens, 512);
        assert_eq!(params.repetition_penalty, 1.0);
        assert_eq!(params.n, 1);
    }

    #[test]
    fn test_generation_params_builder() {
        let params = GenerationParams::default()
            .with_temperature(0.7)
            .with_max_tokens(128)
            .with_n(3);
        assert_eq!(params.temperature, 0.7);
        assert_eq!(params.max_tokens, 128);
        assert_eq!(params.n, 3);
    }

    #[test]
    fn test_retry_policy_defaults() {
        assert_eq!(RetryPolicy::openai().max_attempts, 10);
        assert_eq!(RetryPolicy::openai().backoff, Duration::from_secs(5));
        assert_eq!(RetryPolicy::single_attempt().max_attempts, 1);
    }
}
