//! LLM integration.
//!
//! The question oracle talks to any OpenAI-compatible chat completions
//! endpoint (Groq by default) through the `LlmProvider` trait.

pub mod openai_compat;
pub mod provider;

pub use openai_compat::OpenAiCompatProvider;
pub use provider::*;

use std::sync::Arc;

use crate::config::OracleConfig;
use crate::error::LlmError;

/// Create an LLM provider from configuration.
pub fn create_provider(config: &OracleConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    if config.base_url.trim().is_empty() {
        return Err(LlmError::RequestFailed {
            provider: "openai-compat".to_string(),
            reason: "base URL is empty".to_string(),
        });
    }

    let provider = OpenAiCompatProvider::new(
        config.base_url.clone(),
        config.api_key.clone(),
        config.model.clone(),
    );
    tracing::info!("Using {} (model: {})", config.base_url, config.model);
    Ok(Arc::new(provider))
}
