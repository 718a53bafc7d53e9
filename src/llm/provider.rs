//! Pluggable LLM provider trait.
//!
//! Implementations translate the provider-agnostic [`ChatRequest`] /
//! [`ChatResponse`] pair into provider-specific SDK calls, keeping the
//! answerer decoupled from any particular LLM vendor.

use async_trait::async_trait;

use super::message::{ChatRequest, ChatResponse};
use crate::error::AnswerError;

/// Trait for LLM provider backends.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g., `"openai"`).
    fn name(&self) -> &'static str;

    /// Executes a single non-streaming chat completion.
    ///
    /// # Errors
    ///
    /// Returns [`AnswerError`] on API failures or timeouts.
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, AnswerError>;
}
