//! LLM transport: provider trait, message types, and the OpenAI backend.

pub mod message;
mod openai;
mod provider;

pub use message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage, system_message, user_message};
pub use openai::OpenAiProvider;
pub use provider::LlmProvider;

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::ConfigError;

/// Creates the configured [`LlmProvider`].
///
/// Reads the API key lazily — callers invoke this at first use, not at
/// startup, so a missing secret surfaces as a typed error on the first
/// query rather than a boot failure.
///
/// # Errors
///
/// Returns [`ConfigError::MissingSecret`] when no LLM API key is set.
pub fn create_provider(config: &EngineConfig) -> Result<Arc<dyn LlmProvider>, ConfigError> {
    let api_key = config.llm_api_key()?;
    Ok(Arc::new(OpenAiProvider::new(
        api_key,
        config.llm_base_url(),
        config.llm_timeout,
    )))
}
