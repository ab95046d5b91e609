//! Model adapter capability.
//!
//! The assessor and the PAC verifier both consult a generative model through
//! this seam. Retries, auth and model tiering are the adapter's problem;
//! callers only ever see a bounded string-in/string-out call.

use async_trait::async_trait;

/// Errors surfaced by a [`ModelAdapter`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// The underlying transport failed.
    #[error("model transport error: {0}")]
    Transport(String),
    /// The call was cancelled by the caller.
    #[error("model call cancelled")]
    Cancelled,
    /// The model produced no usable text.
    #[error("model returned empty response")]
    Empty,
}

/// Result type for model calls.
pub type ModelResult<T> = Result<T, ModelError>;

/// Capability for one-shot text generation.
///
/// Implementations must be cancel-safe: callers wrap every invocation in a
/// timeout and drop the future on expiry.
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> ModelResult<String>;
}
